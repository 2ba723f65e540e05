// benches/filter_benchmarks.rs — Reference filter vs device kernel.
//
//   cargo bench --bench filter_benchmarks
//
// The GPU group is skipped (with a note on stderr) when no adapter is
// available, so the CPU numbers are always produced.
//
// The device figure is wall time per frame: upload, dispatch, poll and
// readback. That is what the frame loop pays, so it is the number to
// compare against the reference filter.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use convstream::capture::synthetic::make_scene;
use convstream::convolution;
use convstream::gpu::{DeviceContext, DevicePreference, KernelSource, DEFAULT_ENTRY_POINT};
use convstream::{ConvKernel, FilterSpec, FrameSize};

const SIZES: [(usize, usize); 3] = [(320, 240), (640, 480), (1280, 720)];

// ============================================================
// Reference filter
// ============================================================

fn bench_reference(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference");
    group.warm_up_time(Duration::from_secs(1));

    for &(w, h) in &SIZES {
        let size = FrameSize::new(w, h);
        let img = make_scene(size, 0, 0);
        group.bench_with_input(BenchmarkId::new("sobel_x_m20", size), &img, |b, img| {
            b.iter(|| convolution::apply(img, &FilterSpec::default()))
        });
    }

    // Margin 0 exercises the bounds-checked border path on every edge pixel.
    let img = make_scene(FrameSize::VGA, 0, 0);
    let spec = FilterSpec::new(ConvKernel::SOBEL_X, 0);
    group.bench_function("sobel_x_m0_640x480", |b| {
        b.iter(|| convolution::apply(&img, &spec))
    });

    group.finish();
}

// ============================================================
// Device kernel
// ============================================================

fn bench_gpu(c: &mut Criterion) {
    let mut group = c.benchmark_group("gpu");
    // First dispatches pay pipeline compilation on some drivers.
    group.warm_up_time(Duration::from_secs(2));

    for &(w, h) in &SIZES {
        let size = FrameSize::new(w, h);
        let mut ctx = match DeviceContext::initialize(
            DevicePreference::Gpu,
            &KernelSource::Embedded,
            DEFAULT_ENTRY_POINT,
            FilterSpec::default(),
            size,
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("skipping gpu benchmarks: {e}");
                break;
            }
        };
        let img = make_scene(size, 0, 0);
        group.bench_with_input(BenchmarkId::new("sobel_x_m20", size), &img, |b, img| {
            b.iter(|| ctx.run(img).expect("dispatch failed"))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reference, bench_gpu);
criterion_main!(benches);
