// convstream — capture, filter and show frames until stopped.
//
// Exit status: 0 on a graceful stop (window closed, Ctrl-C, frame budget,
// source exhausted), 1 on any initialization, capture or fatal frame error,
// 2 on invalid arguments (clap's usage-error status).

use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;

use convstream::config::Cli;
use convstream::{build_backend, CancelToken, Pipeline, RunSummary};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        e.exit();
    }

    match run(cli) {
        Ok(summary) => {
            println!(
                "Processed {} frames ({} skipped), avg {:.3} ms/frame.",
                summary.frames,
                summary.skipped,
                summary.average.as_secs_f64() * 1e3
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<RunSummary> {
    log::info!("convstream v{}", env!("CARGO_PKG_VERSION"));

    let mut source = cli
        .open_source()
        .with_context(|| format!("opening source {}", cli.source))?;
    let size = source.frame_size();
    log::info!("source {}: {size}", cli.source);

    let mut backend = build_backend(&cli.backend_options(), size).context("initializing backend")?;
    let mut sink = cli.sink();

    let cancel = CancelToken::new();
    spawn_signal_listener(cancel.clone())?;

    let mut pipeline = Pipeline::with_cancel(cli.pipeline_config(), cancel);
    let summary = pipeline.run(&mut source, &mut backend, &mut sink)?;
    Ok(summary)
}

/// Ctrl-C sets the cancel token; the loop notices between frames and the
/// backend's Drop releases the device. A second Ctrl-C exits immediately.
fn spawn_signal_listener(cancel: CancelToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            rt.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    log::warn!("Ctrl-C handler unavailable");
                    return;
                }
                log::info!("interrupt received, stopping after the current frame");
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("second interrupt, exiting");
                    std::process::exit(130);
                }
            })
        })
        .context("spawning signal thread")?;
    Ok(())
}
