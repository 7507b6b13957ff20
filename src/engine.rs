// engine.rs — Tracking state machine.
//
// This is the per-frame core that the pipeline calls once a frame has been
// captured and the control signals snapshotted:
//
//   1. select  → crop around the pointer, (re)arm the template store
//   2. reset   → back to Idle, template released
//   3. search  → NCC over a clipped window around the tracked point
//
// Transitions:
//
//   Idle      ── select ok ──► Armed
//   Armed     ── search ok ──► Tracking      ── miss ──► Lost
//   Tracking  ── search ok ──► Tracking      ── miss ──► Lost
//   Lost      ── search ok ──► Tracking      ── miss ──► Lost
//   any       ── reset ─────► Idle
//
// Select while Tracking is ignored (and consumed); from Armed or Lost it
// re-arms with a fresh crop. A lost target stays Lost with its last known
// point until the user reselects or resets.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::backend::ComputeBackend;
use crate::config::TrackerConfig;
use crate::image::{Point, Rect, RgbImage};
use crate::search::{search_window, CorrelationSearch, SearchOutcome};
use crate::signals::SignalSnapshot;
use crate::template::TemplateStore;

/// Where the tracker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No template.
    #[default]
    Idle,
    /// Template captured, no search run yet.
    Armed,
    /// Last search succeeded.
    Tracking,
    /// Last search failed; the point is the last known position.
    Lost,
}

impl Phase {
    /// Phases in which a search runs each frame.
    pub fn searches(self) -> bool {
        matches!(self, Phase::Armed | Phase::Tracking | Phase::Lost)
    }
}

/// Mutable tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackState {
    pub phase: Phase,
    /// Tracked point in frame coordinates. `None` only while Idle.
    pub point: Option<Point>,
    pub confidence: f32,
    /// Frame rectangle the current template was cropped from.
    pub template_region: Option<Rect>,
}

/// The per-frame inputs the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCommands {
    pub select: bool,
    pub reset: bool,
    /// Pointer position, `None` when no pointer device is available.
    pub pointer: Option<Point>,
}

impl From<&SignalSnapshot> for FrameCommands {
    fn from(s: &SignalSnapshot) -> Self {
        FrameCommands { select: s.select, reset: s.reset, pointer: s.pointer }
    }
}

/// What happened to a select request this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    /// Template captured from this frame rectangle.
    Accepted(Rect),
    /// Clipped crop too small for a template.
    Rejected(Rect),
    /// A target is being tracked; reset first.
    IgnoredWhileTracking,
    /// The backend could not take the template.
    Failed,
}

/// Per-frame summary for the overlay and the log.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub state: TrackState,
    pub selection: Selection,
    pub reset: bool,
    /// Search window in frame coordinates, when a search was attempted.
    pub window: Option<Rect>,
    /// Raw search result, when a search ran.
    pub outcome: Option<SearchOutcome>,
    pub search_time: Option<Duration>,
}

/// Owns the backend, the template store and the tracking state.
///
/// # Field drop order
/// `Drop` releases the template first; `backend` is declared last so it
/// outlives everything that refers to it.
pub struct TrackingEngine<B: ComputeBackend> {
    config: TrackerConfig,
    search: CorrelationSearch,
    state: TrackState,
    store: TemplateStore<B>,
    backend: B,
}

impl<B: ComputeBackend> TrackingEngine<B> {
    pub fn new(backend: B, config: TrackerConfig) -> Self {
        TrackingEngine {
            search: CorrelationSearch::new(config.confidence_threshold),
            store: TemplateStore::new(&config),
            state: TrackState::default(),
            config,
            backend,
        }
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_template_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// Host copy of the stored template (after resampling).
    pub fn template_preview(&self) -> Option<&RgbImage> {
        self.store.preview()
    }

    /// Run one frame: select, then reset, then search.
    pub fn process(&mut self, frame: &RgbImage, commands: FrameCommands) -> FrameReport {
        let selection = if commands.select {
            self.select(frame, commands.pointer)
        } else {
            Selection::None
        };
        if commands.reset {
            self.reset();
        }

        let mut report = FrameReport {
            selection,
            reset: commands.reset,
            ..FrameReport::default()
        };
        if self.state.phase.searches() {
            self.track_frame(frame, &mut report);
        }
        report.state = self.state;
        report
    }

    /// Capture a template around `pointer` (frame centre when `None`).
    pub fn select(&mut self, frame: &RgbImage, pointer: Option<Point>) -> Selection {
        if self.state.phase == Phase::Tracking {
            info!("select ignored while tracking; reset first");
            return Selection::IgnoredWhileTracking;
        }

        let bounds = frame.bounds();
        let center = pointer.unwrap_or_else(|| bounds.center());
        let side = self.config.select_size;
        let crop = Rect::centered(center, side, side).intersect(&bounds);
        let min = self.config.min_template_side;
        if crop.width <= min || crop.height <= min {
            info!("selection {crop} at {center} too small (need > {min} px)");
            return Selection::Rejected(crop);
        }

        let patch = frame.crop(crop);
        match self.store.set_template(&mut self.backend, &patch) {
            Ok(_) => {
                self.state = TrackState {
                    phase: Phase::Armed,
                    point: Some(crop.center()),
                    confidence: 0.0,
                    template_region: Some(crop),
                };
                info!("template selected at {crop}, tracking from {}", crop.center());
                Selection::Accepted(crop)
            }
            Err(e) => {
                // The store released the old template before failing.
                warn!("template upload failed: {e}");
                self.state = TrackState::default();
                Selection::Failed
            }
        }
    }

    /// Drop the template and return to Idle. Valid from every phase.
    pub fn reset(&mut self) {
        self.store.clear(&mut self.backend);
        if self.state.phase != Phase::Idle {
            info!("tracking reset");
        }
        self.state = TrackState::default();
    }

    /// One search around the tracked point, updating the phase.
    fn track_frame(&mut self, frame: &RgbImage, report: &mut FrameReport) {
        let Some(point) = self.state.point else {
            return;
        };
        let window = search_window(point, self.config.search_margin, frame.bounds());
        report.window = Some(window);
        let min = self.config.min_search_side;
        if window.width <= min || window.height <= min {
            debug!("search window {window} too small, frame skipped");
            return;
        }

        let region = frame.crop(window);
        let started = Instant::now();
        let result = self.search.locate(&mut self.backend, &self.store, &region);
        report.search_time = Some(started.elapsed());

        match result {
            Ok(outcome) if outcome.success => {
                let p = outcome.point.offset(window.x, window.y);
                if self.state.phase != Phase::Tracking {
                    info!("target acquired at {p} ({:.3})", outcome.confidence);
                }
                self.state.point = Some(p);
                self.state.confidence = outcome.confidence;
                self.state.phase = Phase::Tracking;
                report.outcome = Some(outcome);
            }
            Ok(outcome) => {
                if self.state.phase != Phase::Lost {
                    info!("target lost near {point} ({:.3})", outcome.confidence);
                }
                self.state.phase = Phase::Lost;
                report.outcome = Some(outcome);
            }
            Err(e) => {
                warn!("search failed: {e}");
                self.state.phase = Phase::Lost;
            }
        }
    }
}

impl<B: ComputeBackend> Drop for TrackingEngine<B> {
    fn drop(&mut self) {
        self.store.clear(&mut self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ncc::ReferenceBackend;

    fn noise(w: usize, h: usize, seed: u32) -> RgbImage {
        let mut rng = seed;
        RgbImage::from_fn(w, h, |_, _| {
            rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
            [(rng >> 24) as u8, (rng >> 16) as u8, (rng >> 8) as u8]
        })
    }

    fn engine() -> TrackingEngine<ReferenceBackend> {
        TrackingEngine::new(ReferenceBackend::new(), TrackerConfig::default())
    }

    fn select_at(p: Point) -> FrameCommands {
        FrameCommands { select: true, reset: false, pointer: Some(p) }
    }

    #[test]
    fn test_select_arms_and_first_search_tracks() {
        let frame = noise(320, 240, 1);
        let mut e = engine();
        let report = e.process(&frame, select_at(Point::new(150, 120)));
        assert_eq!(report.selection, Selection::Accepted(Rect::new(134, 104, 32, 32)));
        // Search runs in the same frame; an unchanged frame matches exactly.
        assert_eq!(report.state.phase, Phase::Tracking);
        assert_eq!(report.state.point, Some(Point::new(150, 120)));
        assert!(report.state.confidence > 0.99);
    }

    #[test]
    fn test_select_without_pointer_uses_frame_centre() {
        let frame = noise(200, 100, 2);
        let mut e = engine();
        let sel = e.select(&frame, None);
        assert_eq!(sel, Selection::Accepted(Rect::new(84, 34, 32, 32)));
        assert_eq!(e.phase(), Phase::Armed);
        assert_eq!(e.state().point, Some(Point::new(100, 50)));
        assert_eq!(e.state().confidence, 0.0);
    }

    #[test]
    fn test_select_ignored_while_tracking() {
        let frame = noise(320, 240, 3);
        let mut e = engine();
        e.process(&frame, select_at(Point::new(100, 100)));
        assert_eq!(e.phase(), Phase::Tracking);
        let r = e.process(&frame, select_at(Point::new(200, 150)));
        assert_eq!(r.selection, Selection::IgnoredWhileTracking);
        assert_eq!(r.state.template_region, Some(Rect::new(84, 84, 32, 32)));
        assert_eq!(e.backend().uploads(), 1);
    }

    #[test]
    fn test_select_then_reset_same_frame_ends_idle() {
        let frame = noise(320, 240, 4);
        let mut e = engine();
        let r = e.process(
            &frame,
            FrameCommands { select: true, reset: true, pointer: Some(Point::new(100, 100)) },
        );
        assert!(matches!(r.selection, Selection::Accepted(_)));
        assert_eq!(r.state.phase, Phase::Idle);
        assert!(r.window.is_none());
        assert!(!e.is_template_ready());
        assert_eq!(e.backend().live_templates(), 0);
    }

    #[test]
    fn test_small_window_skips_frame() {
        // 60×60 clipped window is above the 50 px minimum: searched.
        let frame = noise(60, 60, 5);
        let mut e = engine();
        e.select(&frame, Some(Point::new(30, 30)));
        let r = e.process(&frame, FrameCommands::default());
        assert!(r.search_time.is_some());

        // 50×50 is not: skipped, phase unchanged.
        let tiny = noise(50, 50, 5);
        let mut e = engine();
        e.select(&tiny, Some(Point::new(25, 25)));
        let r = e.process(&tiny, FrameCommands::default());
        assert_eq!(r.window, Some(Rect::new(0, 0, 50, 50)));
        assert!(r.search_time.is_none());
        assert_eq!(r.state.phase, Phase::Armed);
    }

    #[test]
    fn test_drop_releases_template() {
        let frame = noise(100, 100, 6);
        let mut e = engine();
        e.select(&frame, Some(Point::new(50, 50)));
        assert_eq!(e.backend().live_templates(), 1);
        e.reset();
        e.reset();
        assert_eq!(e.backend().live_templates(), 0);
        assert_eq!(e.backend().releases(), 1);
    }
}
