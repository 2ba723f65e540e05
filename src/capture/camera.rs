// capture/camera.rs — Live capture through GStreamer.
//
// Pipeline:
//
//   v4l2src device=<dev> ! videoconvert ! videoscale
//     ! video/x-raw,format=GRAY8,width=W,height=H
//     ! appsink name=sink max-buffers=1 drop=true sync=false
//
// `videoconvert` does the colour → grayscale conversion, `videoscale`
// forces the size the device buffers were allocated for. The appsink keeps
// only the newest buffer: a slow backend drops frames instead of building
// latency.
//
// GRAY8 rows are padded to 4 bytes by GStreamer, so frames are compacted
// with `Frame::from_strided` using the stride from the negotiated caps.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use crate::error::CaptureError;
use crate::frame::{Frame, FrameSize};
use crate::pipeline::FrameSource;

/// Default V4L2 device node.
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// How long `next_frame` waits for the camera before giving up.
const PULL_TIMEOUT_SECS: u64 = 5;

fn initialize_gstreamer() -> Result<(), CaptureError> {
    static INIT: std::sync::OnceLock<Result<(), String>> = std::sync::OnceLock::new();
    INIT.get_or_init(|| {
        gst::init().map_err(|e| e.to_string())?;
        log::info!("GStreamer initialized");
        Ok(())
    })
    .clone()
    .map_err(CaptureError::Open)
}

pub struct CameraSource {
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
    size: FrameSize,
    device: String,
}

impl CameraSource {
    /// Open `device` and start streaming `size` grayscale frames.
    ///
    /// # Errors
    /// `CaptureError::Open` if GStreamer, the pipeline or the device fail
    /// to come up.
    pub fn open(device: &str, size: FrameSize) -> Result<Self, CaptureError> {
        initialize_gstreamer()?;

        let description = format!(
            "v4l2src device={device} ! videoconvert ! videoscale \
             ! video/x-raw,format=GRAY8,width={},height={} \
             ! appsink name=sink max-buffers=1 drop=true sync=false",
            size.width, size.height
        );
        log::debug!("GStreamer pipeline: {description}");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| CaptureError::Open(format!("{device}: {e}")))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| CaptureError::Open("pipeline is not a gst::Pipeline".into()))?;

        let sink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Open("appsink missing from pipeline".into()))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| CaptureError::Open("sink is not an AppSink".into()))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::Open(format!("{device}: {e}")))?;
        // Live sources report NoPreroll; a missing device fails here.
        let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS));
        if let Err(e) = result {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CaptureError::Open(format!("{device}: {e}")));
        }

        log::info!("camera {device} streaming {size} GRAY8");
        Ok(CameraSource {
            pipeline,
            sink,
            size,
            device: device.to_string(),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl FrameSource for CameraSource {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let sample = match self
            .sink
            .try_pull_sample(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
        {
            Some(sample) => sample,
            None if self.sink.is_eos() => return Ok(None),
            None => {
                return Err(CaptureError::Read(format!(
                    "{}: no frame within {PULL_TIMEOUT_SECS} s",
                    self.device
                )))
            }
        };

        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::Read("sample without caps".into()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| CaptureError::Read(format!("bad caps: {e}")))?;
        let actual = FrameSize::new(info.width() as usize, info.height() as usize);
        if actual != self.size {
            return Err(CaptureError::Read(format!(
                "camera delivered {actual}, expected {}",
                self.size
            )));
        }
        let stride = usize::try_from(info.stride()[0])
            .map_err(|_| CaptureError::Read("negative row stride".into()))?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::Read("sample without buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| CaptureError::Read(format!("cannot map buffer: {e}")))?;
        let data = map.as_slice();
        let needed = stride * self.size.height.saturating_sub(1) + self.size.width;
        if stride < self.size.width || data.len() < needed {
            return Err(CaptureError::Read(format!(
                "buffer holds {} bytes at stride {stride}, need {needed}",
                data.len()
            )));
        }
        Ok(Some(Frame::from_strided(self.size.width, self.size.height, stride, data)))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            log::warn!("failed to stop camera pipeline: {e}");
        }
        log::info!("camera {} closed", self.device);
    }
}
