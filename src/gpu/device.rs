// gpu/device.rs — Device context: everything created once per process.
//
// Responsibilities:
//   - Enumerate adapters and pick one matching a `DevicePreference`.
//   - Create the device and its queue (wgpu queues are in-order).
//   - Build the kernel program and look up its entry point, turning the
//     compiler's messages into `InitError::BuildFailure` verbatim.
//   - Allocate the fixed-size input/output buffers for one frame size.
//   - Release all of it on Drop, on every exit path.
//
// ADAPTER SELECTION:
// `DevicePreference::Gpu` walks the adapters in tiers:
//   DiscreteGpu > IntegratedGpu > VirtualGpu > Other
// and never falls back to a software rasterizer. `DevicePreference::Cpu`
// asks for exactly that software device (llvmpipe/lavapipe, WARP). Either
// way, no match is `InitError::DeviceNotFound`; the caller decides whether
// to fall back to the reference filter.
//
// ERROR SCOPES:
// wgpu reports shader and pipeline problems asynchronously through the
// device's error sink. Every creation step that can fail is wrapped in a
// Validation + OutOfMemory error scope and the popped error becomes the
// matching `InitError` variant, instead of reaching the uncaptured handler.
//
// BUFFER LAYOUT:
// WGSL has no u8 storage type, so frames travel as u32 words (four pixels
// per word). Each buffer is the pixel count rounded up to a whole word.
// The kernel reads `input` and only writes `output`; the direction is fixed
// for the lifetime of the context.
//
// FIELD DROP ORDER:
// Rust drops fields top to bottom. Buffers and the pipeline are declared
// before `device`/`queue`, and `_instance` comes last, so no device-level
// object outlives its instance.

use std::collections::HashMap;
use std::fmt;

use wgpu::util::DeviceExt;

use crate::error::InitError;
use crate::filter::FilterSpec;
use crate::frame::FrameSize;
use crate::gpu::source::KernelSource;

/// Workgroup size used when the device allows it. Any power of two up to
/// the device limit is valid; 64 keeps most vendors' SIMD widths busy.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// Label of the compute pipeline. Fixed, so it never matches anything in
/// a user's kernel when error messages are classified.
const PIPELINE_LABEL: &str = "convstream pipeline";

/// Which kind of device to run the kernel on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DevicePreference {
    /// A hardware GPU (discrete, integrated, virtual).
    Gpu,
    /// A software implementation running on the host CPU.
    Cpu,
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePreference::Gpu => write!(f, "GPU"),
            DevicePreference::Cpu => write!(f, "CPU"),
        }
    }
}

impl DevicePreference {
    /// Selection rank of a device type: lower is better, `None` rejects it.
    fn rank(&self, device_type: wgpu::DeviceType) -> Option<u8> {
        use wgpu::DeviceType::*;
        match (self, device_type) {
            (DevicePreference::Gpu, DiscreteGpu) => Some(0),
            (DevicePreference::Gpu, IntegratedGpu) => Some(1),
            (DevicePreference::Gpu, VirtualGpu) => Some(2),
            (DevicePreference::Gpu, Other) => Some(3),
            (DevicePreference::Gpu, Cpu) => None,
            (DevicePreference::Cpu, Cpu) => Some(0),
            (DevicePreference::Cpu, _) => None,
        }
    }
}

/// Pick the best adapter for `preference`; ties keep enumeration order.
pub fn select_adapter(preference: DevicePreference, types: &[wgpu::DeviceType]) -> Option<usize> {
    types
        .iter()
        .enumerate()
        .filter_map(|(idx, &ty)| preference.rank(ty).map(|rank| (rank, idx)))
        .min()
        .map(|(_, idx)| idx)
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(raw: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: raw.name,
            vendor: raw.vendor,
            device: raw.device,
            device_type: raw.device_type,
            backend: raw.backend,
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Device, queue, compiled kernel and the frame buffer pair.
///
/// Build with [`DeviceContext::initialize`]; run frames with
/// [`DeviceContext::run`]. Dropping the context destroys the buffers and
/// releases the device.
pub struct DeviceContext {
    pub(crate) pipeline: wgpu::ComputePipeline,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) input: wgpu::Buffer,
    pub(crate) output: wgpu::Buffer,
    pub(crate) readback: wgpu::Buffer,
    pub(crate) params: wgpu::Buffer,
    /// Bytes per device buffer (pixel count rounded up to whole words).
    pub(crate) buffer_bytes: u64,
    pub frame_size: FrameSize,
    pub spec: FilterSpec,
    pub entry_point: String,
    pub workgroup_size: u32,
    pub adapter_info: AdapterInfo,
    /// Whether the adapter can run f64 shader arithmetic. Informational;
    /// the kernel is integer-only.
    pub supports_f64: bool,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    _instance: wgpu::Instance,
}

impl DeviceContext {
    /// Select a device, build the kernel and allocate buffers for `size`.
    ///
    /// # Errors
    /// Any failure is a distinct [`InitError`]; nothing is retried.
    pub fn initialize(
        preference: DevicePreference,
        source: &KernelSource,
        entry_point: &str,
        spec: FilterSpec,
        size: FrameSize,
    ) -> Result<Self, InitError> {
        pollster::block_on(Self::init_async(preference, source, entry_point, spec, size))
    }

    async fn init_async(
        preference: DevicePreference,
        source: &KernelSource,
        entry_point: &str,
        spec: FilterSpec,
        size: FrameSize,
    ) -> Result<Self, InitError> {
        let fits_u32 = size
            .checked_pixel_count()
            .is_some_and(|n| u32::try_from(n).is_ok());
        if size.is_empty() || !fits_u32 {
            return Err(InitError::InvalidFrameSize(size));
        }

        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        for a in &adapters {
            let info = a.get_info();
            log::info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }
        let types: Vec<wgpu::DeviceType> =
            adapters.iter().map(|a| a.get_info().device_type).collect();
        let adapter = match select_adapter(preference, &types) {
            Some(idx) => adapters.into_iter().nth(idx).ok_or_else(|| InitError::DeviceNotFound {
                preference,
                seen: Vec::new(),
            })?,
            None => {
                return Err(InitError::DeviceNotFound {
                    preference,
                    seen: adapters.iter().map(|a| a.get_info().name).collect(),
                })
            }
        };

        let adapter_info = AdapterInfo::from(adapter.get_info());
        log::info!("selected {preference} device: {adapter_info}");

        let supports_f64 = adapter.features().contains(wgpu::Features::SHADER_F64);
        log::info!(
            "double precision: {}",
            if supports_f64 { "supported" } else { "not supported" }
        );

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("convstream"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            log::error!("uncaptured device error: {e}");
        }));

        let limits = device.limits();
        let workgroup_size = DEFAULT_WORKGROUP_SIZE
            .min(limits.max_compute_invocations_per_workgroup)
            .min(limits.max_compute_workgroup_size_x);
        log::info!(
            "workgroup size {workgroup_size} (device max {} invocations)",
            limits.max_compute_invocations_per_workgroup
        );

        // --- Kernel program ---
        let text = source.load()?;
        let label = source.label();
        let module = build_module(&device, &label, text).await?;
        let bind_group_layout = create_bind_group_layout(&device);
        let pipeline = create_pipeline(
            &device,
            &module,
            &bind_group_layout,
            entry_point,
            workgroup_size,
        )
        .await?;
        log::info!("kernel `{entry_point}` built from {label}");

        // --- Buffers ---
        let buffer_bytes = buffer_bytes_for(size);
        let max_binding = limits.max_storage_buffer_binding_size as u64;
        if buffer_bytes > max_binding || buffer_bytes > limits.max_buffer_size {
            return Err(InitError::BufferAllocation {
                what: "input",
                bytes: buffer_bytes,
                reason: format!("exceeds device storage binding limit of {max_binding} bytes"),
            });
        }

        let input = allocate(
            &device,
            "input",
            buffer_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        )
        .await?;
        let output = allocate(
            &device,
            "output",
            buffer_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        )
        .await?;
        let readback = allocate(
            &device,
            "readback",
            buffer_bytes,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )
        .await?;

        let gpu_params = spec.gpu_params(size);
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("convstream params"),
            contents: bytemuck::bytes_of(&gpu_params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        log::info!(
            "allocated device buffers for {size} frames ({buffer_bytes} bytes each)"
        );

        Ok(DeviceContext {
            pipeline,
            bind_group_layout,
            input,
            output,
            readback,
            params,
            buffer_bytes,
            frame_size: size,
            spec,
            entry_point: entry_point.to_string(),
            workgroup_size,
            adapter_info,
            supports_f64,
            device,
            queue,
            _instance: instance,
        })
    }

    /// Workgroup grid covering every pixel of the context's frame size.
    pub fn dispatch_size(&self) -> (u32, u32) {
        dispatch_grid(
            self.frame_size.pixel_count() as u32,
            self.workgroup_size,
            self.device.limits().max_compute_workgroups_per_dimension,
        )
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.input.destroy();
        self.output.destroy();
        self.readback.destroy();
        self.params.destroy();
        log::info!("released device context on {}", self.adapter_info.name);
    }
}

impl fmt::Display for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceContext {{ adapter: {}, frame: {}, workgroup: {}, kernel: {} }}",
            self.adapter_info, self.frame_size, self.workgroup_size, self.entry_point
        )
    }
}

// ============================================================
// Helpers
// ============================================================

/// Device buffer size for a frame: pixel count rounded up to whole u32 words.
pub(crate) fn buffer_bytes_for(size: FrameSize) -> u64 {
    align_to(size.pixel_count() as u64, wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Round `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Number of workgroups needed for `pixels` work items, folded into a 2D
/// grid when a single dimension would exceed `max_per_dim`.
///
/// The kernel rebuilds the flat index as `gid.y * grid_x * wg + gid.x` and
/// discards anything past the pixel count, so over-coverage is harmless.
pub fn dispatch_grid(pixels: u32, workgroup_size: u32, max_per_dim: u32) -> (u32, u32) {
    let groups = pixels.div_ceil(workgroup_size).max(1);
    if groups <= max_per_dim {
        return (groups, 1);
    }
    let y = groups.div_ceil(max_per_dim);
    let x = groups.div_ceil(y);
    (x, y)
}

/// Run `f` inside Validation and OutOfMemory error scopes and return the
/// first captured error, if any.
pub(crate) async fn scoped<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = f();
    let oom = device.pop_error_scope().await;
    let validation = device.pop_error_scope().await;
    (value, oom.or(validation))
}

async fn build_module(
    device: &wgpu::Device,
    label: &str,
    text: std::borrow::Cow<'_, str>,
) -> Result<wgpu::ShaderModule, InitError> {
    let (module, error) = scoped(device, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(text),
        })
    })
    .await;

    let info = module.get_compilation_info().await;
    let has_errors = info
        .messages
        .iter()
        .any(|m| m.message_type == wgpu::CompilationMessageType::Error);

    if has_errors || error.is_some() {
        let mut log = format_compilation_log(&info.messages);
        if log.is_empty() {
            if let Some(e) = error {
                log = e.to_string();
            }
        }
        return Err(InitError::BuildFailure { log });
    }

    for m in &info.messages {
        log::warn!("kernel compiler: {}", format_message(m));
    }
    Ok(module)
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("convstream BGL"),
        entries: &[
            // 0 — input pixels (read-only)
            storage(0, true),
            // 1 — output pixels (atomic writes)
            storage(1, false),
            // 2 — FilterParams uniform
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

async fn create_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    bind_group_layout: &wgpu::BindGroupLayout,
    entry_point: &str,
    workgroup_size: u32,
) -> Result<wgpu::ComputePipeline, InitError> {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("convstream pipeline layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });
    let constants = HashMap::from([("WORKGROUP_SIZE".to_string(), workgroup_size as f64)]);

    let (pipeline, error) = scoped(device, || {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(PIPELINE_LABEL),
            layout: Some(&layout),
            module,
            entry_point,
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
            cache: None,
        })
    })
    .await;

    match error {
        None => Ok(pipeline),
        Some(e) => {
            let log = error_chain(&e);
            if is_missing_entry_point(&log) {
                Err(InitError::EntryPointMissing {
                    entry_point: entry_point.to_string(),
                    log,
                })
            } else {
                Err(InitError::BuildFailure { log })
            }
        }
    }
}

/// The error and every `source()` below it, one per line.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(inner) = cur {
        let text = inner.to_string();
        if !out.contains(&text) {
            out.push('\n');
            out.push_str(&text);
        }
        cur = inner.source();
    }
    out
}

/// Whether a pipeline error is wgpu's "entry point not in module" report.
/// Other stage errors (binding mismatches, missing overrides) mention the
/// pipeline but are build failures.
fn is_missing_entry_point(log: &str) -> bool {
    let lower = log.to_ascii_lowercase();
    lower.contains("unable to find entry point")
        || (lower.contains("entry point") && lower.contains("not found"))
}

async fn allocate(
    device: &wgpu::Device,
    what: &'static str,
    bytes: u64,
    usage: wgpu::BufferUsages,
) -> Result<wgpu::Buffer, InitError> {
    let (buffer, error) = scoped(device, || {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(what),
            size: bytes,
            usage,
            mapped_at_creation: false,
        })
    })
    .await;
    match error {
        None => Ok(buffer),
        Some(e) => Err(InitError::BufferAllocation {
            what,
            bytes,
            reason: e.to_string(),
        }),
    }
}

fn format_message(m: &wgpu::CompilationMessage) -> String {
    match &m.location {
        Some(loc) => format!(
            "{:?} at {}:{}: {}",
            m.message_type, loc.line_number, loc.line_position, m.message
        ),
        None => format!("{:?}: {}", m.message_type, m.message),
    }
}

fn format_compilation_log(messages: &[wgpu::CompilationMessage]) -> String {
    messages.iter().map(format_message).collect::<Vec<_>>().join("\n")
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ConvKernel;

    // Tests that need an adapter are #[ignore]d and run in a child process
    // (see run_gpu_test_in_subprocess); the rest are pure.

    #[test]
    fn test_select_gpu_prefers_discrete() {
        use wgpu::DeviceType::*;
        let types = [Cpu, IntegratedGpu, DiscreteGpu, Other];
        assert_eq!(select_adapter(DevicePreference::Gpu, &types), Some(2));
    }

    #[test]
    fn test_select_gpu_rejects_software() {
        use wgpu::DeviceType::*;
        assert_eq!(select_adapter(DevicePreference::Gpu, &[Cpu, Cpu]), None);
        assert_eq!(select_adapter(DevicePreference::Gpu, &[]), None);
    }

    #[test]
    fn test_select_gpu_falls_to_other() {
        use wgpu::DeviceType::*;
        assert_eq!(select_adapter(DevicePreference::Gpu, &[Cpu, Other, VirtualGpu]), Some(2));
        assert_eq!(select_adapter(DevicePreference::Gpu, &[Cpu, Other]), Some(1));
    }

    #[test]
    fn test_select_cpu_only_software() {
        use wgpu::DeviceType::*;
        assert_eq!(select_adapter(DevicePreference::Cpu, &[DiscreteGpu, Cpu]), Some(1));
        assert_eq!(select_adapter(DevicePreference::Cpu, &[DiscreteGpu]), None);
    }

    #[test]
    fn test_select_ties_keep_order() {
        use wgpu::DeviceType::*;
        assert_eq!(select_adapter(DevicePreference::Gpu, &[IntegratedGpu, IntegratedGpu]), Some(0));
    }

    #[test]
    fn test_buffer_bytes_rounds_to_words() {
        assert_eq!(buffer_bytes_for(FrameSize::VGA), 307_200);
        assert_eq!(buffer_bytes_for(FrameSize::new(7, 7)), 52);
        assert_eq!(buffer_bytes_for(FrameSize::new(5, 5)), 28);
        assert_eq!(buffer_bytes_for(FrameSize::new(2, 2)), 4);
    }

    #[test]
    fn test_dispatch_grid_single_row() {
        // VGA at 64 per group: 4800 groups, fits in one dimension.
        assert_eq!(dispatch_grid(307_200, 64, 65_535), (4800, 1));
        // Partial last group.
        assert_eq!(dispatch_grid(49, 64, 65_535), (1, 1));
        assert_eq!(dispatch_grid(65, 64, 65_535), (2, 1));
    }

    #[test]
    fn test_dispatch_grid_folds_large_frames() {
        // 8K-ish frame at workgroup 1 exceeds 65535 groups per dimension.
        let pixels = 7680 * 4320;
        let (x, y) = dispatch_grid(pixels, 1, 65_535);
        assert!(x <= 65_535 && y <= 65_535);
        assert!(x as u64 * y as u64 >= pixels as u64);
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 4), 0);
        assert_eq!(align_to(1, 4), 4);
        assert_eq!(align_to(4, 4), 4);
        assert_eq!(align_to(49, 4), 52);
    }

    #[test]
    fn test_missing_entry_point_classification() {
        assert!(is_missing_entry_point(
            "In Device::create_compute_pipeline, label = 'convstream pipeline'\n\
             Error matching shader requirements against the pipeline\n\
             Unable to find entry point 'no_such_kernel'"
        ));
        assert!(is_missing_entry_point("Entry point no_such_kernel not found"));
        // A binding mismatch names the pipeline and the kernel, but the entry
        // point exists: that is a build failure.
        assert!(!is_missing_entry_point(
            "In Device::create_compute_pipeline, label = 'my_filter'\n\
             Error matching ShaderStages(COMPUTE) shader requirements against the pipeline\n\
             Shader global ResourceBinding { group: 0, binding: 3 } is not available in the pipeline layout"
        ));
        assert!(!is_missing_entry_point(
            "Pipeline constant 'WORKGROUP_SIZE' is not defined in my_filter"
        ));
    }

    #[test]
    fn test_error_chain_includes_sources() {
        #[derive(Debug)]
        struct Leaf;
        impl fmt::Display for Leaf {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("Unable to find entry point 'k'")
            }
        }
        impl std::error::Error for Leaf {}

        #[derive(Debug)]
        struct Outer(Leaf);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("Validation Error")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let log = error_chain(&Outer(Leaf));
        assert_eq!(log, "Validation Error\nUnable to find entry point 'k'");
        assert!(is_missing_entry_point(&log));
    }

    #[test]
    fn test_preference_display() {
        assert_eq!(DevicePreference::Gpu.to_string(), "GPU");
        assert_eq!(DevicePreference::Cpu.to_string(), "CPU");
    }

    // ---- Device integration tests (subprocess isolation) ----------------
    //
    // Some Vulkan layers crash during process exit once a device has been
    // created. Each inner test runs in its own `cargo test` child, prints
    // GPU_TEST_OK when its assertions pass, and the outer wrapper checks for
    // that token instead of the exit status.

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_initialize_default_kernel() {
        let ctx = DeviceContext::initialize(
            DevicePreference::Gpu,
            &KernelSource::Embedded,
            crate::gpu::DEFAULT_ENTRY_POINT,
            FilterSpec::default(),
            FrameSize::VGA,
        )
        .expect("should initialise a device context");
        println!("{ctx}");
        assert_eq!(ctx.frame_size, FrameSize::VGA);
        assert_eq!(ctx.buffer_bytes, 307_200);
        assert!(ctx.workgroup_size >= 1);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_build_failure_carries_log() {
        let src = KernelSource::Inline("fn my_filter( { this is not wgsl".to_string());
        let err = DeviceContext::initialize(
            DevicePreference::Gpu,
            &src,
            "my_filter",
            FilterSpec::default(),
            FrameSize::new(64, 64),
        )
        .err()
        .expect("broken source must not build");
        eprintln!("[test] {err}");
        match err {
            InitError::BuildFailure { log } => assert!(!log.is_empty()),
            other => panic!("expected BuildFailure, got {other:?}"),
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_entry_point_missing() {
        let err = DeviceContext::initialize(
            DevicePreference::Gpu,
            &KernelSource::Embedded,
            "no_such_kernel",
            FilterSpec::new(ConvKernel::SOBEL_X, 1),
            FrameSize::new(64, 64),
        )
        .err()
        .expect("unknown entry point must fail");
        assert!(
            matches!(err, InitError::EntryPointMissing { ref entry_point, .. } if entry_point == "no_such_kernel"),
            "got {err:?}"
        );
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_initialize_default_kernel() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_initialize_default_kernel");
        assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_build_failure_carries_log() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_build_failure_carries_log");
        assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_entry_point_missing() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_entry_point_missing");
        assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
    }

    #[test]
    fn test_zero_frame_size_rejected_before_device() {
        let err = DeviceContext::initialize(
            DevicePreference::Gpu,
            &KernelSource::Embedded,
            "my_filter",
            FilterSpec::default(),
            FrameSize::new(0, 480),
        )
        .err()
        .expect("empty frame must be rejected");
        assert!(matches!(err, InitError::InvalidFrameSize(_)));
    }

    #[test]
    fn test_overflowing_frame_size_rejected_before_device() {
        let err = DeviceContext::initialize(
            DevicePreference::Gpu,
            &KernelSource::Embedded,
            "my_filter",
            FilterSpec::default(),
            FrameSize::new(usize::MAX, 2),
        )
        .err()
        .expect("overflowing frame must be rejected");
        assert!(matches!(err, InitError::InvalidFrameSize(_)));
    }
}
