// tests/test_tracking.rs — End-to-end tracking through the public API.
//
// These run with `cargo test --test test_tracking`. Everything here uses
// the host `ReferenceBackend`, so no GPU is needed.

use std::collections::VecDeque;
use std::time::Duration;

use fbtrack::config::{PipelineConfig, TrackerConfig};
use fbtrack::error::{CaptureError, DisplayError};
use fbtrack::pipeline::{FramePipeline, FrameSink, FrameSource, Step};
use fbtrack::signals::ControlSignals;
use fbtrack::{
    FrameCommands, Phase, Point, Rect, ReferenceBackend, RgbImage, Selection, TrackingEngine,
};

// ===== Scene helpers =====

struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

fn noise(w: usize, h: usize, seed: u32) -> RgbImage {
    let mut rng = XorShift(seed);
    RgbImage::from_fn(w, h, |_, _| {
        let v = rng.next();
        [v as u8, (v >> 8) as u8, (v >> 16) as u8]
    })
}

/// Fixed background with a textured patch whose top-left is at `at`.
fn scene(background: &RgbImage, patch: &RgbImage, at: Point) -> RgbImage {
    let mut frame = background.clone();
    frame.blit(patch, at.x, at.y);
    frame
}

fn config(select_size: i32) -> TrackerConfig {
    TrackerConfig { select_size, ..TrackerConfig::default() }
}

fn select_at(p: Point) -> FrameCommands {
    FrameCommands { select: true, reset: false, pointer: Some(p) }
}

fn reset() -> FrameCommands {
    FrameCommands { select: false, reset: true, pointer: None }
}

fn idle() -> FrameCommands {
    FrameCommands::default()
}

// ===== Tracking a moving patch =====

#[test]
fn moving_patch_is_followed_to_its_final_position() {
    let background = noise(640, 480, 0x1234_5678);
    let patch = noise(40, 40, 0x9e37_79b9);
    let path = [(80, 80), (135, 110), (190, 140), (245, 170), (300, 200)];

    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    let first = scene(&background, &patch, Point::new(80, 80));
    let report = engine.process(&first, select_at(Point::new(100, 100)));
    assert_eq!(report.selection, Selection::Accepted(Rect::new(80, 80, 40, 40)));

    for &(x, y) in &path[1..] {
        let frame = scene(&background, &patch, Point::new(x, y));
        let report = engine.process(&frame, idle());
        assert_eq!(report.state.phase, Phase::Tracking, "lost at step to ({x}, {y})");
        assert!(report.state.confidence > 0.99);
        assert_eq!(report.state.point, Some(Point::new(x + 20, y + 20)));
    }

    let last = engine.state().point.unwrap();
    assert!(last.max_abs_diff(Point::new(320, 220)) <= 20);
}

#[test]
fn search_window_follows_the_target() {
    let background = noise(640, 480, 7);
    let patch = noise(40, 40, 99);
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    let first = scene(&background, &patch, Point::new(280, 200));
    engine.process(&first, select_at(Point::new(300, 220)));

    let report = engine.process(&scene(&background, &patch, Point::new(330, 230)), idle());
    assert_eq!(report.window, Some(Rect::new(200, 120, 200, 200)));
    let report = engine.process(&scene(&background, &patch, Point::new(330, 230)), idle());
    assert_eq!(report.window, Some(Rect::new(250, 150, 200, 200)));
}

// ===== Losing and reacquiring =====

#[test]
fn lost_target_keeps_last_point() {
    let background = noise(640, 480, 1);
    let patch = noise(40, 40, 2);
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    let first = scene(&background, &patch, Point::new(300, 220));
    engine.process(&first, select_at(Point::new(320, 240)));
    engine.process(&scene(&background, &patch, Point::new(300, 220)), idle());
    assert_eq!(engine.phase(), Phase::Tracking);

    // Patch gone: only unrelated texture left.
    let report = engine.process(&noise(640, 480, 3), idle());
    assert_eq!(report.state.phase, Phase::Lost);
    assert_eq!(report.state.point, Some(Point::new(320, 240)));
    assert!(report.outcome.is_some_and(|o| !o.success && o.confidence < 0.6));

    // Still lost on the next frame, same point.
    let report = engine.process(&noise(640, 480, 4), idle());
    assert_eq!(report.state.phase, Phase::Lost);
    assert_eq!(report.state.point, Some(Point::new(320, 240)));
}

#[test]
fn lost_target_is_reacquired_inside_the_window() {
    let background = noise(640, 480, 11);
    let patch = noise(40, 40, 12);
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    let first = scene(&background, &patch, Point::new(300, 220));
    engine.process(&first, select_at(Point::new(320, 240)));
    engine.process(&background, idle());
    assert_eq!(engine.phase(), Phase::Lost);

    let report = engine.process(&scene(&background, &patch, Point::new(340, 250)), idle());
    assert_eq!(report.state.phase, Phase::Tracking);
    assert_eq!(report.state.point, Some(Point::new(360, 270)));
}

#[test]
fn select_while_lost_rearms() {
    let background = noise(640, 480, 21);
    let patch = noise(40, 40, 22);
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    let first = scene(&background, &patch, Point::new(300, 220));
    engine.process(&first, select_at(Point::new(320, 240)));
    engine.process(&background, idle());
    assert_eq!(engine.phase(), Phase::Lost);

    let frame = scene(&background, &patch, Point::new(100, 100));
    let report = engine.process(&frame, select_at(Point::new(120, 120)));
    assert_eq!(report.selection, Selection::Accepted(Rect::new(100, 100, 40, 40)));
    assert_eq!(report.state.phase, Phase::Tracking);
    assert_eq!(engine.backend().live_templates(), 1);
}

// ===== Reset =====

#[test]
fn reset_from_every_phase_returns_to_idle() {
    let background = noise(320, 240, 31);
    let patch = noise(40, 40, 32);
    let frame = scene(&background, &patch, Point::new(140, 100));
    let pointer = Point::new(160, 120);

    // Armed: select and reset in the same frame, select handled first.
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    let both = FrameCommands { select: true, reset: true, pointer: Some(pointer) };
    let report = engine.process(&frame, both);
    assert!(matches!(report.selection, Selection::Accepted(_)));
    assert_eq!(report.state.phase, Phase::Idle);

    // Tracking.
    engine.process(&frame, select_at(pointer));
    assert_eq!(engine.phase(), Phase::Tracking);
    engine.process(&frame, reset());
    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(engine.state().point, None);
    assert!(!engine.is_template_ready());

    // Lost.
    engine.process(&frame, select_at(pointer));
    engine.process(&background, idle());
    assert_eq!(engine.phase(), Phase::Lost);
    let report = engine.process(&frame, reset());
    assert!(report.reset);
    assert_eq!(report.state.phase, Phase::Idle);
    assert_eq!(report.outcome, None);
    assert!(engine.template_preview().is_none());
    assert_eq!(engine.backend().live_templates(), 0);

    // Idle: nothing to do, still fine.
    engine.process(&frame, reset());
    assert_eq!(engine.phase(), Phase::Idle);
}

// ===== Selection geometry =====

#[test]
fn corner_selection_is_clipped_and_rejected() {
    let frame = noise(320, 240, 41);
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), TrackerConfig::default());

    let report = engine.process(&frame, select_at(Point::new(0, 0)));
    assert_eq!(report.selection, Selection::Rejected(Rect::new(0, 0, 16, 16)));
    assert_eq!(report.state.phase, Phase::Idle);
    assert_eq!(engine.backend().uploads(), 0);

    // Partially clipped but still larger than the minimum.
    let report = engine.process(&frame, select_at(Point::new(10, 10)));
    assert_eq!(report.selection, Selection::Accepted(Rect::new(0, 0, 26, 26)));
    assert_eq!(report.state.point, Some(Point::new(13, 13)));
}

#[test]
fn oversized_selection_is_resampled() {
    let frame = noise(640, 480, 51);
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(120));
    let report = engine.process(&frame, select_at(Point::new(320, 240)));
    assert_eq!(report.selection, Selection::Accepted(Rect::new(260, 180, 120, 120)));
    let preview = engine.template_preview().unwrap();
    assert_eq!((preview.width(), preview.height()), (80, 80));
}

#[test]
fn select_ignored_while_tracking_keeps_template() {
    let background = noise(320, 240, 61);
    let patch = noise(40, 40, 62);
    let frame = scene(&background, &patch, Point::new(140, 100));
    let mut engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    engine.process(&frame, select_at(Point::new(160, 120)));
    assert_eq!(engine.phase(), Phase::Tracking);

    let report = engine.process(&frame, select_at(Point::new(40, 40)));
    assert_eq!(report.selection, Selection::IgnoredWhileTracking);
    assert_eq!(report.state.template_region, Some(Rect::new(140, 100, 40, 40)));
    assert_eq!(engine.backend().uploads(), 1);
}

// ===== Through the pipeline and the signal mailboxes =====

struct Frames(VecDeque<RgbImage>);

impl FrameSource for Frames {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        Ok(self.0.pop_front())
    }
}

#[derive(Default)]
struct Count(usize);

impl FrameSink for Count {
    fn present(&mut self, _: &RgbImage) -> Result<(), DisplayError> {
        self.0 += 1;
        Ok(())
    }
}

#[test]
fn pointer_click_selects_and_pipeline_tracks() {
    let background = noise(320, 240, 71);
    let patch = noise(40, 40, 72);
    let frames: VecDeque<RgbImage> = [(100, 80), (120, 90), (140, 100)]
        .iter()
        .map(|&(x, y)| scene(&background, &patch, Point::new(x, y)))
        .collect();

    let signals = ControlSignals::new(Point::new(0, 0));
    signals.pointer.set_available(true);
    signals.pointer.set_position(Point::new(120, 100));
    signals.pointer.request_select();

    let pipeline_config = PipelineConfig {
        empty_frame_retry: Duration::ZERO,
        frame_yield: Duration::ZERO,
        command_poll: Duration::ZERO,
    };
    let engine = TrackingEngine::new(ReferenceBackend::new(), config(40));
    let mut pipeline = FramePipeline::new(
        engine,
        Frames(frames),
        Count::default(),
        signals.reader,
        pipeline_config,
    );

    let mut last = None;
    for _ in 0..3 {
        match pipeline.step() {
            Step::Frame(report) => last = Some(report),
            other => panic!("unexpected step {other:?}"),
        }
    }
    let report = last.unwrap();
    assert_eq!(report.state.phase, Phase::Tracking);
    assert_eq!(report.state.point, Some(Point::new(160, 120)));
    assert_eq!(pipeline.sink().0, 3);

    // Source exhausted: empty frames, nothing presented.
    assert_eq!(pipeline.step(), Step::Empty);
    assert_eq!(pipeline.sink().0, 3);
}
