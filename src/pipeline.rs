// pipeline.rs — The frame loop.
//
// Per iteration:
//
//   1. check the cancel token, the sink and the frame budget
//   2. pull a frame from the FrameSource (None = source exhausted)
//   3. hand it to the ComputeBackend
//   4. show "before" and "after" on the FrameSink
//   5. record the iteration time in ExecStats and log current/average
//
// The loop owns nothing long-lived: the caller passes the source, backend
// and sink by `&mut`, so their Drop impls (device release, camera stop,
// window close) run in the caller's scope on every exit path, including
// the early returns below.
//
// Frame failures go through `ErrorPolicy`. Capture failures always end the
// run: without a frame there is nothing to skip to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::ComputeBackend;
use crate::error::{CaptureError, PipelineError};
use crate::frame::{Frame, FrameSize};
use crate::stats::ExecStats;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Produces single-channel frames.
pub trait FrameSource {
    /// Size of every frame this source yields.
    fn frame_size(&self) -> FrameSize;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_size(&self) -> FrameSize {
        (**self).frame_size()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).next_frame()
    }
}

/// Shows named frames ("before", "after").
pub trait FrameSink {
    fn display(&mut self, name: &str, frame: &Frame);

    /// True once the user has closed the display. Ends the loop.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<K: FrameSink + ?Sized> FrameSink for Box<K> {
    fn display(&mut self, name: &str, frame: &Frame) {
        (**self).display(name, frame)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// Shared stop flag. Clones observe the same flag, so a signal handler on
/// another thread can stop the loop between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to do when the backend fails on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ErrorPolicy {
    /// Stop the run and return the error.
    #[default]
    Abort,
    /// Log, drop the frame and continue with the next one.
    SkipFrame,
}

/// Point whose 3×3 patch is logged before and after filtering.
pub const DEFAULT_PROBE: (usize, usize) = (300, 120);

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Stop after this many frames have been acquired.
    pub frame_limit: Option<u64>,
    pub error_policy: ErrorPolicy,
    /// Top-left corner of the sampled patch, clamped into the frame.
    pub probe: (usize, usize),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            frame_limit: None,
            error_policy: ErrorPolicy::Abort,
            probe: DEFAULT_PROBE,
        }
    }
}

/// Why the loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SinkClosed,
    SourceExhausted,
    FrameLimit,
}

/// Returned by a successful [`Pipeline::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames filtered and displayed.
    pub frames: u64,
    /// Frames dropped under `ErrorPolicy::SkipFrame`.
    pub skipped: u64,
    /// Mean iteration time over the processed frames.
    pub average: Duration,
    pub stop: StopReason,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancelToken,
    stats: ExecStats,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_cancel(config, CancelToken::new())
    }

    pub fn with_cancel(config: PipelineConfig, cancel: CancelToken) -> Self {
        Pipeline {
            config,
            cancel,
            stats: ExecStats::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run until cancelled, the sink closes, the source runs dry or the
    /// frame limit is reached.
    ///
    /// # Errors
    /// A capture failure, or a backend failure under `ErrorPolicy::Abort`.
    pub fn run<S, B, K>(
        &mut self,
        source: &mut S,
        backend: &mut B,
        sink: &mut K,
    ) -> Result<RunSummary, PipelineError>
    where
        S: FrameSource + ?Sized,
        B: ComputeBackend + ?Sized,
        K: FrameSink + ?Sized,
    {
        log::info!(
            "running {} on {} frames ({:?} on error)",
            backend.name(),
            source.frame_size(),
            self.config.error_policy
        );

        let mut acquired = 0u64;
        let mut processed = 0u64;
        let mut skipped = 0u64;

        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if sink.is_closed() {
                self.cancel.cancel();
                break StopReason::SinkClosed;
            }
            if self.config.frame_limit.is_some_and(|limit| acquired >= limit) {
                break StopReason::FrameLimit;
            }

            let t0 = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::SourceExhausted,
                Err(e) => {
                    log::error!("capture failed after {acquired} frames: {e}");
                    return Err(e.into());
                }
            };
            acquired += 1;
            self.log_probe("before", acquired, &frame);

            let output = match backend.run(&frame) {
                Ok(output) => output,
                Err(e) => match self.config.error_policy {
                    ErrorPolicy::Abort => {
                        log::error!("frame {acquired}: {} failed: {e}", backend.name());
                        return Err(PipelineError::Exec { frame: acquired, source: e });
                    }
                    ErrorPolicy::SkipFrame => {
                        log::warn!("frame {acquired}: skipped, {} failed: {e}", backend.name());
                        skipped += 1;
                        sink.display("before", &frame);
                        continue;
                    }
                },
            };
            self.log_probe("after", acquired, &output);

            sink.display("before", &frame);
            sink.display("after", &output);

            self.stats.record(t0.elapsed());
            processed += 1;
            log::info!("frame {acquired}: {}", self.stats);
        };

        let summary = RunSummary {
            frames: processed,
            skipped,
            average: self.stats.average(),
            stop,
        };
        log::info!(
            "stopped ({stop:?}): {} frames, {} skipped, avg {:.3} ms",
            summary.frames,
            summary.skipped,
            summary.average.as_secs_f64() * 1e3
        );
        Ok(summary)
    }

    fn log_probe(&self, stage: &str, index: u64, frame: &Frame) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let (x, y) = probe_point(self.config.probe, frame.size());
        if let Some(patch) = frame.patch3(x, y) {
            log::debug!("frame {index} {stage} @({x},{y}): {patch:?}");
        }
    }
}

/// Clamp the probe so its 3×3 patch fits inside `size`.
pub fn probe_point(probe: (usize, usize), size: FrameSize) -> (usize, usize) {
    (
        probe.0.min(size.width.saturating_sub(3)),
        probe.1.min(size.height.saturating_sub(3)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_probe_point_clamps() {
        assert_eq!(probe_point(DEFAULT_PROBE, FrameSize::VGA), (300, 120));
        assert_eq!(probe_point(DEFAULT_PROBE, FrameSize::new(160, 120)), (157, 117));
        assert_eq!(probe_point(DEFAULT_PROBE, FrameSize::new(2, 2)), (0, 0));
    }

    #[test]
    fn test_default_config() {
        let c = PipelineConfig::default();
        assert_eq!(c.frame_limit, None);
        assert_eq!(c.error_policy, ErrorPolicy::Abort);
        assert_eq!(c.probe, (300, 120));
    }
}
