// error.rs — Error types for every stage of the pipeline.
//
//   InitError     — device context construction. Always fatal.
//   ExecError     — one frame on one backend. The orchestrator's
//                   ErrorPolicy decides between abort and skip.
//   CaptureError  — frame sources (camera, image sequence).
//   PipelineError — what `Pipeline::run` hands back to the binary.
//
// Every variant names the failing stage in its message, so a single
// `log::error!("{e}")` at the top is enough to locate the fault.

use std::path::PathBuf;

use thiserror::Error;

use crate::frame::FrameSize;
use crate::gpu::DevicePreference;

/// Device context initialization failures.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("no {preference} compute device found (adapters seen: {})", format_adapters(.seen))]
    DeviceNotFound {
        preference: DevicePreference,
        seen: Vec<String>,
    },

    #[error("failed to create device context: {0}")]
    ContextCreation(#[from] wgpu::RequestDeviceError),

    #[error("failed to load kernel source {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build kernel program:\n{log}")]
    BuildFailure { log: String },

    #[error("entry point `{entry_point}` not found in kernel program: {log}")]
    EntryPointMissing { entry_point: String, log: String },

    #[error("failed to allocate {what} device buffer ({bytes} bytes): {reason}")]
    BufferAllocation {
        what: &'static str,
        bytes: u64,
        reason: String,
    },

    #[error("invalid frame size {0} for device buffers")]
    InvalidFrameSize(FrameSize),
}

fn format_adapters(seen: &[String]) -> String {
    if seen.is_empty() {
        "none".to_string()
    } else {
        seen.join(", ")
    }
}

/// Per-frame execution failures.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("frame size {actual} does not match device buffers sized for {expected}")]
    FrameSizeMismatch {
        expected: FrameSize,
        actual: FrameSize,
    },

    #[error("failed to write frame to device input buffer: {0}")]
    WriteFailure(String),

    #[error("failed to dispatch kernel: {0}")]
    DispatchFailure(String),

    #[error("failed to read device output buffer: {0}")]
    ReadbackFailure(String),
}

/// Frame source failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture device: {0}")]
    Open(String),

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{} is {actual}, expected {expected}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: FrameSize,
        actual: FrameSize,
    },

    #[error("no frames found in {}", .0.display())]
    Empty(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors returned by the orchestrator loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture: {0}")]
    Capture(#[from] CaptureError),

    #[error("frame {frame}: {source}")]
    Exec {
        frame: u64,
        #[source]
        source: ExecError,
    },
}
