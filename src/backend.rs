// backend.rs — The execution backend seam.
//
// The orchestrator only knows `ComputeBackend`: hand it a frame, get back a
// frame of the same size or an `ExecError`. Three implementations:
//
//   GpuBackend        — gpu/executor.rs, the device path.
//   ReferenceBackend  — the host filter in convolution.rs.
//   VerifyingBackend  — runs any backend AND the reference on every frame,
//                       returns the primary output and counts disagreements.
//
// Backends are owned by value (or boxed) by whoever runs the loop, so their
// Drop impls (the device context's release in particular) run when the
// loop's owner goes out of scope, whichever way it exits.

use crate::convolution;
use crate::error::{ExecError, InitError};
use crate::filter::FilterSpec;
use crate::frame::{Frame, FrameSize};
use crate::gpu::{DeviceContext, DevicePreference, GpuBackend, KernelSource, DEFAULT_ENTRY_POINT};

/// A frame-in, frame-out filter implementation.
pub trait ComputeBackend {
    /// Short human-readable name for logs.
    fn name(&self) -> &str;

    /// Filter one frame. The output always has the input's size.
    fn run(&mut self, input: &Frame) -> Result<Frame, ExecError>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&mut self, input: &Frame) -> Result<Frame, ExecError> {
        (**self).run(input)
    }
}

/// Which backend the pipeline should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendKind {
    /// The device kernel; fails if no matching device exists.
    Gpu,
    /// The host reference filter.
    Reference,
    /// Device kernel, or the reference filter when no device matches.
    #[default]
    Auto,
}

/// Host reference filter as a backend.
#[derive(Debug, Clone)]
pub struct ReferenceBackend {
    spec: FilterSpec,
}

impl ReferenceBackend {
    pub fn new(spec: FilterSpec) -> Self {
        ReferenceBackend { spec }
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }
}

impl ComputeBackend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn run(&mut self, input: &Frame) -> Result<Frame, ExecError> {
        Ok(convolution::apply(input, &self.spec))
    }
}

/// Running totals kept by [`VerifyingBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub frames_checked: u64,
    pub frames_mismatched: u64,
    pub pixels_mismatched: u64,
}

/// Cross-checks a backend against the reference filter on every frame.
pub struct VerifyingBackend<B> {
    primary: B,
    reference: ReferenceBackend,
    name: String,
    report: VerifyReport,
}

impl<B: ComputeBackend> VerifyingBackend<B> {
    pub fn new(primary: B, spec: FilterSpec) -> Self {
        let name = format!("{} (verified)", primary.name());
        VerifyingBackend {
            primary,
            reference: ReferenceBackend::new(spec),
            name,
            report: VerifyReport::default(),
        }
    }

    pub fn report(&self) -> VerifyReport {
        self.report
    }

    pub fn into_inner(self) -> B {
        self.primary
    }
}

impl<B: ComputeBackend> ComputeBackend for VerifyingBackend<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, input: &Frame) -> Result<Frame, ExecError> {
        let out = self.primary.run(input)?;
        let expected = self.reference.run(input)?;
        let diff = out.count_mismatches(&expected);
        self.report.frames_checked += 1;
        if diff > 0 {
            self.report.frames_mismatched += 1;
            self.report.pixels_mismatched += diff as u64;
            log::warn!(
                "{}: {diff} of {} pixels differ from the reference filter",
                self.primary.name(),
                input.size().pixel_count()
            );
        }
        Ok(out)
    }
}

/// Everything needed to construct a backend at startup.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub kind: BackendKind,
    pub preference: DevicePreference,
    pub source: KernelSource,
    pub entry_point: String,
    pub spec: FilterSpec,
    pub verify: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        BackendOptions {
            kind: BackendKind::default(),
            preference: DevicePreference::Gpu,
            source: KernelSource::Embedded,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            spec: FilterSpec::default(),
            verify: false,
        }
    }
}

/// Build the backend described by `opts` for frames of `size`.
///
/// `Auto` degrades to the reference filter only on
/// [`InitError::DeviceNotFound`]; every other init failure is returned.
pub fn build_backend(
    opts: &BackendOptions,
    size: FrameSize,
) -> Result<Box<dyn ComputeBackend>, InitError> {
    let backend: Box<dyn ComputeBackend> = match opts.kind {
        BackendKind::Reference => Box::new(ReferenceBackend::new(opts.spec)),
        BackendKind::Gpu => Box::new(gpu_backend(opts, size)?),
        BackendKind::Auto => match gpu_backend(opts, size) {
            Ok(b) => Box::new(b),
            Err(e @ InitError::DeviceNotFound { .. }) => {
                log::warn!("{e}; falling back to the reference filter");
                Box::new(ReferenceBackend::new(opts.spec))
            }
            Err(e) => return Err(e),
        },
    };

    if opts.verify {
        log::info!("verifying {} against the reference filter", backend.name());
        Ok(Box::new(VerifyingBackend::new(backend, opts.spec)))
    } else {
        Ok(backend)
    }
}

fn gpu_backend(opts: &BackendOptions, size: FrameSize) -> Result<GpuBackend, InitError> {
    let ctx = DeviceContext::initialize(
        opts.preference,
        &opts.source,
        &opts.entry_point,
        opts.spec,
        size,
    )?;
    Ok(GpuBackend::new(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ConvKernel;

    /// Returns its input untouched.
    struct Passthrough;

    impl ComputeBackend for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }
        fn run(&mut self, input: &Frame) -> Result<Frame, ExecError> {
            Ok(input.clone())
        }
    }

    #[test]
    fn test_reference_backend_matches_apply() {
        let spec = FilterSpec::new(ConvKernel::SOBEL_X, 1);
        let data: Vec<u8> = (0..49).map(|v| (v * 5) as u8).collect();
        let img = Frame::from_vec(7, 7, data);
        let mut b = ReferenceBackend::new(spec);
        assert_eq!(b.run(&img).unwrap(), convolution::apply(&img, &spec));
        assert_eq!(b.name(), "reference");
    }

    #[test]
    fn test_verifying_reference_has_no_mismatch() {
        let spec = FilterSpec::new(ConvKernel::SOBEL_X, 1);
        let mut v = VerifyingBackend::new(ReferenceBackend::new(spec), spec);
        let img = Frame::from_vec(5, 5, (0..25).map(|v| (v * 9) as u8).collect());
        v.run(&img).unwrap();
        v.run(&img).unwrap();
        assert_eq!(
            v.report(),
            VerifyReport { frames_checked: 2, frames_mismatched: 0, pixels_mismatched: 0 }
        );
    }

    #[test]
    fn test_verifying_counts_disagreements() {
        // Passthrough vs Sobel-X on a ramp: every interior pixel differs.
        let spec = FilterSpec::new(ConvKernel::SOBEL_X, 1);
        let mut img = Frame::new(6, 6);
        for y in 0..6 {
            for x in 0..6 {
                img.set(x, y, (x * 40) as u8);
            }
        }
        let mut v = VerifyingBackend::new(Passthrough, spec);
        let out = v.run(&img).unwrap();
        // Primary output is returned, not the reference's.
        assert_eq!(out, img);
        let r = v.report();
        assert_eq!(r.frames_checked, 1);
        assert_eq!(r.frames_mismatched, 1);
        // Interior of a 6×6 frame at margin 1 is 3×3 = 9 pixels; the ramp's
        // gradient is 4 * 80 = 320 → narrowed 64, never equal to x * 40.
        assert_eq!(r.pixels_mismatched, 9);
        assert_eq!(v.name(), "passthrough (verified)");
    }

    #[test]
    fn test_build_reference_backend() {
        let opts = BackendOptions { kind: BackendKind::Reference, ..Default::default() };
        let b = build_backend(&opts, FrameSize::VGA).unwrap();
        assert_eq!(b.name(), "reference");

        let opts = BackendOptions { verify: true, ..opts };
        let b = build_backend(&opts, FrameSize::VGA).unwrap();
        assert_eq!(b.name(), "reference (verified)");
    }

    #[test]
    fn test_boxed_backend_dispatches() {
        let mut b: Box<dyn ComputeBackend> = Box::new(Passthrough);
        let img = Frame::filled(2, 2, 7);
        assert_eq!(b.run(&img).unwrap(), img);
        assert_eq!(b.name(), "passthrough");
    }
}
