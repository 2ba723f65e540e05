// convstream: real-time 3×3 convolution of a grayscale video stream
//
// Each captured frame runs through a compute backend, either the WGSL
// kernel on a wgpu device or the host reference filter, and is shown
// before/after with per-frame latency statistics.

pub mod frame;
pub mod filter;
pub mod convolution;
pub mod error;
pub mod stats;
pub mod backend;
pub mod pipeline;
pub mod capture;
pub mod display;
pub mod config;
pub mod gpu;

pub use backend::{build_backend, BackendKind, BackendOptions, ComputeBackend, ReferenceBackend, VerifyingBackend};
pub use error::{CaptureError, ExecError, InitError, PipelineError};
pub use filter::{ConvKernel, FilterSpec};
pub use frame::{Frame, FrameSize};
pub use pipeline::{CancelToken, ErrorPolicy, FrameSink, FrameSource, Pipeline, PipelineConfig, RunSummary, StopReason};
pub use stats::ExecStats;
