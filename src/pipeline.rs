// pipeline.rs — Per-frame orchestration.
//
//   1. acquire   FrameSource::next_frame; empty → sleep, try again later
//   2. snapshot  SignalReader::snapshot; quit → stop
//   3. engine    TrackingEngine::process
//   4. overlay   annotations drawn into the frame
//   5. present   FrameSink::present
//   6. yield     short sleep so the input threads get scheduled
//
// Capture and display errors inside the loop are logged and skipped; only
// construction of the source and sink is fatal, and that happens in main.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::backend::ComputeBackend;
use crate::config::PipelineConfig;
use crate::engine::{FrameCommands, FrameReport, TrackingEngine};
use crate::error::{CaptureError, DisplayError};
use crate::image::RgbImage;
use crate::overlay::Overlay;
use crate::signals::SignalReader;

/// Produces frames. `Ok(None)` is a transient empty frame.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError>;
}

/// Consumes annotated frames.
pub trait FrameSink {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        (**self).present(frame)
    }
}

/// Outcome of one `FramePipeline::step`.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Frame(FrameReport),
    Empty,
    Quit,
}

/// Frames per second over one-second windows.
#[derive(Debug)]
struct FpsCounter {
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    fn new() -> Self {
        FpsCounter { window_start: Instant::now(), frames: 0 }
    }

    /// Count a frame; returns the rate when a window closes.
    fn tick(&mut self) -> Option<f64> {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        *self = FpsCounter::new();
        Some(fps)
    }
}

pub struct FramePipeline<B: ComputeBackend, S: FrameSource, D: FrameSink> {
    engine: TrackingEngine<B>,
    source: S,
    sink: D,
    signals: SignalReader,
    overlay: Overlay,
    config: PipelineConfig,
    fps: FpsCounter,
}

impl<B: ComputeBackend, S: FrameSource, D: FrameSink> FramePipeline<B, S, D> {
    pub fn new(
        engine: TrackingEngine<B>,
        source: S,
        sink: D,
        signals: SignalReader,
        config: PipelineConfig,
    ) -> Self {
        FramePipeline {
            overlay: Overlay::new(engine.config().confidence_threshold),
            engine,
            source,
            sink,
            signals,
            config,
            fps: FpsCounter::new(),
        }
    }

    pub fn engine(&self) -> &TrackingEngine<B> {
        &self.engine
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    /// Process one frame.
    pub fn step(&mut self) -> Step {
        let started = Instant::now();
        let mut frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("empty frame");
                thread::sleep(self.config.empty_frame_retry);
                return Step::Empty;
            }
            Err(e) => {
                warn!("frame capture failed: {e}");
                thread::sleep(self.config.empty_frame_retry);
                return Step::Empty;
            }
        };

        let snapshot = self.signals.snapshot();
        if snapshot.quit {
            return Step::Quit;
        }

        let report = self.engine.process(&frame, FrameCommands::from(&snapshot));
        self.overlay.draw(&mut frame, &report, snapshot.pointer, self.engine.template_preview());

        if let Err(e) = self.sink.present(&frame) {
            warn!("present failed: {e}");
        }

        debug!(
            "frame {:?} at {:?} conf {:.3} search {:?} total {:?}",
            report.state.phase,
            report.state.point,
            report.state.confidence,
            report.search_time,
            started.elapsed()
        );
        if let Some(fps) = self.fps.tick() {
            info!("{fps:.1} fps, {:?} at {:?}", report.state.phase, report.state.point);
        }

        thread::sleep(self.config.frame_yield);
        Step::Frame(report)
    }

    /// Loop until quit. Returns the number of frames presented.
    pub fn run(&mut self) -> usize {
        let mut frames = 0;
        while !self.signals.quit_requested() {
            match self.step() {
                Step::Frame(_) => frames += 1,
                Step::Empty => {}
                Step::Quit => break,
            }
        }
        info!("frame loop stopped after {frames} frames");
        frames
    }
}
