// capture/mod.rs — Frame sources.
//
//   synthetic.rs — a moving test scene; needs no hardware or files.
//   sequence.rs  — a directory of still images, played in name order.
//   camera.rs    — live capture through GStreamer (`camera` feature).
//
// Every source hands out grayscale frames of one fixed size, reported by
// `FrameSource::frame_size` before the first frame so the device buffers
// can be allocated up front.

pub mod sequence;
pub mod synthetic;

#[cfg(feature = "camera")]
pub mod camera;

pub use sequence::ImageSequence;
pub use synthetic::SyntheticSource;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
