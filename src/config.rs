// config.rs — Command-line configuration.
//
// `Cli` is the clap surface; everything below it takes the plain structs
// (`BackendOptions`, `PipelineConfig`), so the library never depends on
// how options were spelled. Each flag can also come from a
// `CONVSTREAM_*` environment variable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::backend::{BackendKind, BackendOptions};
use crate::capture::{ImageSequence, SyntheticSource};
use crate::display::LogSink;
use crate::error::CaptureError;
use crate::filter::{ConvKernel, FilterSpec, DEFAULT_MARGIN};
use crate::frame::FrameSize;
use crate::gpu::{DevicePreference, KernelSource, DEFAULT_ENTRY_POINT};
use crate::pipeline::{ErrorPolicy, FrameSink, FrameSource, PipelineConfig, DEFAULT_PROBE};

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Generated moving scene.
    Synthetic,
    /// Directory of still images.
    Images(PathBuf),
    /// V4L2 device through GStreamer; `None` uses the default node.
    Camera(Option<String>),
}

impl FromStr for SourceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "synthetic" => Ok(SourceSpec::Synthetic),
            None if s == "camera" => Ok(SourceSpec::Camera(None)),
            Some(("images", dir)) if !dir.is_empty() => Ok(SourceSpec::Images(PathBuf::from(dir))),
            Some(("camera", dev)) if !dev.is_empty() => Ok(SourceSpec::Camera(Some(dev.to_string()))),
            _ => Err(format!(
                "unknown source `{s}` (expected synthetic, images:<dir>, camera or camera:<device>)"
            )),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Synthetic => write!(f, "synthetic"),
            SourceSpec::Images(dir) => write!(f, "images:{}", dir.display()),
            SourceSpec::Camera(None) => write!(f, "camera"),
            SourceSpec::Camera(Some(dev)) => write!(f, "camera:{dev}"),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "convstream")]
#[command(about = "Real-time 3×3 convolution of a grayscale video stream", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Backend that filters each frame
    #[arg(short, long, value_enum, default_value_t = BackendKind::Auto, env = "CONVSTREAM_BACKEND")]
    pub backend: BackendKind,

    /// Kind of compute device to select
    #[arg(short, long, value_enum, default_value_t = DevicePreference::Gpu, env = "CONVSTREAM_DEVICE")]
    pub device: DevicePreference,

    /// WGSL kernel file (the bundled kernel when omitted)
    #[arg(short, long, env = "CONVSTREAM_KERNEL")]
    pub kernel: Option<PathBuf>,

    /// Kernel entry point
    #[arg(long, default_value = DEFAULT_ENTRY_POINT, env = "CONVSTREAM_ENTRY_POINT")]
    pub entry_point: String,

    /// Frame width for synthetic and camera sources
    #[arg(long, default_value_t = FrameSize::VGA.width)]
    pub width: usize,

    /// Frame height for synthetic and camera sources
    #[arg(long, default_value_t = FrameSize::VGA.height)]
    pub height: usize,

    /// Border width copied through unfiltered
    #[arg(short, long, default_value_t = DEFAULT_MARGIN)]
    pub margin: usize,

    /// synthetic, images:<dir>, camera or camera:<device>
    #[arg(short, long, default_value = "synthetic", env = "CONVSTREAM_SOURCE")]
    pub source: SourceSpec,

    /// Replay an image directory forever
    #[arg(long = "loop")]
    pub loop_images: bool,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    pub frames: Option<u64>,

    /// What to do when a frame fails
    #[arg(long, value_enum, default_value_t = ErrorPolicy::Abort)]
    pub on_error: ErrorPolicy,

    /// Compare every frame against the reference filter
    #[arg(long)]
    pub verify: bool,

    /// Do not open windows
    #[arg(long)]
    pub headless: bool,
}

impl Default for Cli {
    fn default() -> Self {
        Cli {
            backend: BackendKind::Auto,
            device: DevicePreference::Gpu,
            kernel: None,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            width: FrameSize::VGA.width,
            height: FrameSize::VGA.height,
            margin: DEFAULT_MARGIN,
            source: SourceSpec::Synthetic,
            loop_images: false,
            frames: None,
            on_error: ErrorPolicy::Abort,
            verify: false,
            headless: false,
        }
    }
}

impl Cli {
    /// Checks clap cannot express per flag.
    ///
    /// # Errors
    /// A `ValueValidation` clap error when `--width * --height` overflows
    /// or does not fit the 32-bit work-item count of a dispatch.
    pub fn validate(&self) -> Result<(), clap::Error> {
        let size = self.frame_size();
        let fits = size
            .checked_pixel_count()
            .is_some_and(|n| u32::try_from(n).is_ok());
        if fits {
            Ok(())
        } else {
            Err(Cli::command().error(
                ErrorKind::ValueValidation,
                format!("frame size {size} has too many pixels (limit {})", u32::MAX),
            ))
        }
    }

    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec::new(ConvKernel::SOBEL_X, self.margin)
    }

    pub fn kernel_source(&self) -> KernelSource {
        self.kernel
            .clone()
            .map_or(KernelSource::Embedded, KernelSource::File)
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            kind: self.backend,
            preference: self.device,
            source: self.kernel_source(),
            entry_point: self.entry_point.clone(),
            spec: self.filter_spec(),
            verify: self.verify,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            frame_limit: self.frames,
            error_policy: self.on_error,
            probe: DEFAULT_PROBE,
        }
    }

    /// Open the configured frame source.
    ///
    /// # Errors
    /// Whatever the source reports while opening; a camera request in a
    /// build without the `camera` feature is `CaptureError::Open`.
    pub fn open_source(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        match &self.source {
            SourceSpec::Synthetic => Ok(Box::new(SyntheticSource::new(self.frame_size()))),
            SourceSpec::Images(dir) => {
                Ok(Box::new(ImageSequence::open(dir)?.looping(self.loop_images)))
            }
            SourceSpec::Camera(device) => self.open_camera(device.as_deref()),
        }
    }

    #[cfg(feature = "camera")]
    fn open_camera(&self, device: Option<&str>) -> Result<Box<dyn FrameSource>, CaptureError> {
        use crate::capture::camera::{CameraSource, DEFAULT_DEVICE};
        let device = device.unwrap_or(DEFAULT_DEVICE);
        Ok(Box::new(CameraSource::open(device, self.frame_size())?))
    }

    #[cfg(not(feature = "camera"))]
    fn open_camera(&self, _device: Option<&str>) -> Result<Box<dyn FrameSource>, CaptureError> {
        Err(CaptureError::Open(
            "camera capture needs a build with the `camera` feature".into(),
        ))
    }

    /// Windows unless headless, else logging.
    #[cfg(feature = "display")]
    pub fn sink(&self) -> Box<dyn FrameSink> {
        if self.headless {
            Box::new(LogSink)
        } else {
            Box::new(crate::display::WindowSink::new())
        }
    }

    #[cfg(not(feature = "display"))]
    pub fn sink(&self) -> Box<dyn FrameSink> {
        if !self.headless {
            log::info!("built without the `display` feature; frames are not shown");
        }
        Box::new(LogSink)
    }
}
