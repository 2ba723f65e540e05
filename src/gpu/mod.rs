// gpu/mod.rs — Device compute path.
//
// The device side mirrors the reference filter in convolution.rs. The host
// implementation stays authoritative: the kernel is validated against it
// pixel-for-pixel, and `FilterSpec` feeds both.
//
//   device.rs   — DeviceContext: adapter selection, device/queue, kernel
//                 build, fixed-size input/output buffers, release on Drop.
//   executor.rs — DeviceContext::run: upload → bind → dispatch → wait →
//                 readback, and the GpuBackend wrapper.
//   source.rs   — KernelSource: embedded or on-disk WGSL program text.
//
// One frame in flight at a time: `run` takes `&mut self`, so the borrow
// checker rules out two frames sharing the device buffers.

pub mod device;
pub mod executor;
pub mod source;

pub use device::{AdapterInfo, DeviceContext, DevicePreference};
pub use executor::{DispatchInfo, GpuBackend};
pub use source::{KernelSource, DEFAULT_ENTRY_POINT};
