// benches/gpu_benchmarks.rs — Correlation kernel vs host reference.
//
//   cargo bench --bench gpu_benchmarks
//
// Each GPU benchmark sits in the same group as its host counterpart.
//
// CRITERION + GPU CAVEATS
// ────────────────────────
// Criterion measures wall time: parameter write, search upload, submit,
// poll and readback are all included. That is the cost the frame loop
// pays, since it blocks on the surface before the next frame.
//
// The first iterations pay pipeline compilation on some drivers, so the
// warmup time is set explicitly.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use fbtrack::backend::ComputeBackend;
use fbtrack::config::KernelConfig;
use fbtrack::gpu::{GpuCorrelator, GpuDevice};
use fbtrack::template::Template;
use fbtrack::{Rect, ReferenceBackend, RgbImage};

fn make_scene(w: usize, h: usize) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
        [(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8]
    })
}

fn bench_dispatch(c: &mut Criterion) {
    let gpu = GpuDevice::new().expect("no compute adapter");
    let mut correlator =
        GpuCorrelator::new(gpu, &KernelConfig::default()).expect("kernel build failed");
    let mut reference = ReferenceBackend::new();

    let mut group = c.benchmark_group("dispatch");
    group.warm_up_time(Duration::from_secs(2));

    for window in [100usize, 200, 400] {
        let scene = make_scene(window, window);
        let patch = scene.crop(Rect::new(20, 20, 32, 32));

        let gpu_template = Template::new(correlator.upload_template(&patch).unwrap(), 32, 32);
        group.bench_with_input(BenchmarkId::new("gpu_t32", window), &scene, |b, s| {
            b.iter(|| correlator.dispatch(&gpu_template, s).unwrap())
        });
        correlator.release_template(gpu_template.into_handle());

        let host_template = Template::new(reference.upload_template(&patch).unwrap(), 32, 32);
        group.bench_with_input(BenchmarkId::new("cpu_t32", window), &scene, |b, s| {
            b.iter(|| reference.dispatch(&host_template, s).unwrap())
        });
        reference.release_template(host_template.into_handle());
    }
    group.finish();
}

fn bench_upload(c: &mut Criterion) {
    let gpu = GpuDevice::new().expect("no compute adapter");
    let mut correlator =
        GpuCorrelator::new(gpu, &KernelConfig::default()).expect("kernel build failed");
    let patch = make_scene(80, 80);

    let mut group = c.benchmark_group("upload");
    group.bench_function("template_80x80", |b| {
        b.iter(|| {
            let buffer = correlator.upload_template(&patch).unwrap();
            correlator.release_template(buffer);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_upload);
criterion_main!(benches);
