// benches/benchmarks.rs -- Host-side per-stage benchmarks.
//
//   cargo bench --bench benchmarks
//
// Sizes follow the runtime defaults: 1920×1080 capture, 32×32 template,
// 200×200 search window.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use fbtrack::config::TrackerConfig;
use fbtrack::convert;
use fbtrack::io::framebuffer::{write_frame, FbGeometry};
use fbtrack::ncc::ncc_surface;
use fbtrack::{FrameCommands, Point, Rect, ReferenceBackend, RgbImage, TrackingEngine};

// ============================================================
// Helpers
// ============================================================

/// Deterministic textured scene, shifted by (dx, dy).
fn make_scene(w: usize, h: usize, dx: usize, dy: usize) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let (sx, sy) = (x + dx, y + dy);
        let v = sx.wrapping_mul(2_654_435_761) ^ sy.wrapping_mul(40_503);
        [(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8]
    })
}

fn make_yuyv(w: usize, h: usize) -> Vec<u8> {
    (0..w * h * 2).map(|i| (i * 7 % 251) as u8).collect()
}

// ============================================================
// Per-stage benchmarks
// ============================================================

fn bench_convert(c: &mut Criterion) {
    let yuyv = make_yuyv(1920, 1080);
    let rgb = make_scene(1920, 1080, 0, 0);
    let mut packed = Vec::new();

    let mut group = c.benchmark_group("convert");
    group.bench_function("yuyv_to_rgb_1920x1080", |b| {
        b.iter(|| convert::yuyv_to_rgb(&yuyv, 1920, 1080))
    });
    group.bench_function("rgb_to_0rgb_1920x1080", |b| {
        b.iter(|| convert::rgb_to_0rgb(&rgb, &mut packed))
    });
    group.finish();
}

fn bench_ncc(c: &mut Criterion) {
    let scene = make_scene(200, 200, 0, 0);

    let mut group = c.benchmark_group("ncc");
    for side in [20usize, 32, 80] {
        let template = scene.crop(Rect::new(60, 60, side as i32, side as i32));
        group.bench_with_input(BenchmarkId::new("surface_200x200", side), &template, |b, t| {
            b.iter(|| ncc_surface(t, &scene))
        });
    }
    let template = scene.crop(Rect::new(60, 60, 32, 32));
    let surface = ncc_surface(&template, &scene).unwrap();
    group.bench_function("peak_168x168", |b| b.iter(|| surface.peak()));
    group.finish();
}

fn bench_display(c: &mut Criterion) {
    let frame = make_scene(1920, 1080, 0, 0);
    let mut group = c.benchmark_group("display");
    for bpp in [16u32, 32] {
        let geom = FbGeometry {
            width: 1920,
            height: 1080,
            bits_per_pixel: bpp,
            stride: 1920 * bpp as usize / 8,
        };
        let mut dst = vec![0u8; geom.len()];
        group.bench_function(BenchmarkId::new("write_frame_1920x1080", bpp), |b| {
            b.iter(|| write_frame(&mut dst, &geom, &frame))
        });
    }
    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let frames: Vec<RgbImage> = (0..10).map(|i| make_scene(640, 480, i * 3, i * 2)).collect();
    let select = FrameCommands { select: true, reset: false, pointer: Some(Point::new(320, 240)) };

    let mut group = c.benchmark_group("engine");
    group.sample_size(20);
    group.bench_function("track_640x480_10frames", |b| {
        b.iter(|| {
            let mut engine = TrackingEngine::new(ReferenceBackend::new(), TrackerConfig::default());
            engine.process(&frames[0], select);
            for frame in &frames[1..] {
                engine.process(frame, FrameCommands::default());
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_convert, bench_ncc, bench_display, bench_engine);
criterion_main!(benches);
