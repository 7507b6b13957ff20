// main.rs — fbtrack entry point.
//
// Startup, in order; any failure exits with status 1:
//   1. control signals + Ctrl-C handler
//   2. compute device and kernel (no engine without them)
//   3. camera, then display
//   4. pointer thread (short wait for discovery), command thread
// Then the frame loop runs on this thread until quit.
//
// Shutdown: quit → loop exits → input threads joined → pipeline dropped
// (engine and GPU first, then camera and display).

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use argh::FromArgs;
use log::{error, info, warn};

use fbtrack::config::{
    AppConfig, CameraConfig, CameraFormat, DisplayTarget, KernelConfig, PointerConfig,
    TrackerConfig, DEFAULT_ENTRY_POINT,
};
use fbtrack::engine::TrackingEngine;
use fbtrack::error::{AppError, DisplayError};
use fbtrack::gpu::{DeviceProfile, GpuCorrelator, GpuDevice};
use fbtrack::input;
use fbtrack::io::{Framebuffer, V4lCamera};
use fbtrack::pipeline::{FramePipeline, FrameSink};
use fbtrack::signals::{self, ControlSignals, PointerView, QuitFlag};

#[derive(FromArgs, Debug)]
/// Track a selected patch of a camera feed, shown on the framebuffer.
/// Left click or `s` selects, right click or `r` resets, `q` quits.
struct Args {
    /// camera device path
    #[argh(option, default = "String::from(\"/dev/video11\")")]
    camera: String,
    /// capture width
    #[argh(option, default = "1920")]
    width: usize,
    /// capture height
    #[argh(option, default = "1080")]
    height: usize,
    /// capture frame rate
    #[argh(option, short = 'f', default = "30")]
    fps: u32,
    /// camera pixel format: YUYV or RGB3
    #[argh(option, default = "CameraFormat::Yuyv")]
    format: CameraFormat,
    /// framebuffer device
    #[argh(option, default = "PathBuf::from(\"/dev/fb0\")")]
    framebuffer: PathBuf,
    /// present in a desktop window (needs the `window` feature)
    #[argh(switch)]
    window: bool,
    /// WGSL kernel source
    #[argh(option, default = "PathBuf::from(\"shaders/ncc.wgsl\")")]
    kernel: PathBuf,
    /// kernel entry point
    #[argh(option, default = "String::from(DEFAULT_ENTRY_POINT)")]
    entry_point: String,
    /// also try the legacy entry point names
    #[argh(switch)]
    legacy_entry_points: bool,
    /// device profile: native or embedded
    #[argh(option, default = "DeviceProfile::Native")]
    profile: DeviceProfile,
    /// pointer device to use instead of probing the default list
    #[argh(option)]
    pointer: Option<PathBuf>,
    /// minimum NCC score counted as a match
    #[argh(option, default = "0.6")]
    threshold: f32,
    /// side of the square selected around the pointer
    #[argh(option, default = "32")]
    select_size: i32,
    /// half-size of the search window
    #[argh(option, default = "100")]
    search_margin: i32,
}

impl Args {
    fn into_config(self) -> AppConfig {
        let display = if self.window {
            window_target(&self.framebuffer)
        } else {
            DisplayTarget::Framebuffer(self.framebuffer.clone())
        };
        AppConfig {
            tracker: TrackerConfig {
                select_size: self.select_size,
                search_margin: self.search_margin,
                confidence_threshold: self.threshold,
                ..TrackerConfig::default()
            },
            kernel: KernelConfig {
                source_path: self.kernel,
                entry_point: self.entry_point,
                try_legacy_names: self.legacy_entry_points,
            },
            camera: CameraConfig {
                device_path: self.camera,
                width: self.width,
                height: self.height,
                fps: self.fps,
                format: self.format,
                ..CameraConfig::default()
            },
            display,
            pointer: PointerConfig {
                candidates: self
                    .pointer
                    .map_or_else(PointerConfig::default_candidates, |p| vec![p]),
                display_width: self.width as i32,
                display_height: self.height as i32,
                ..PointerConfig::default()
            },
            profile: self.profile,
            ..AppConfig::default()
        }
    }
}

#[cfg(feature = "window")]
fn window_target(_: &std::path::Path) -> DisplayTarget {
    DisplayTarget::Window
}

#[cfg(not(feature = "window"))]
fn window_target(framebuffer: &std::path::Path) -> DisplayTarget {
    warn!("built without the `window` feature, using {}", framebuffer.display());
    DisplayTarget::Framebuffer(framebuffer.to_path_buf())
}

#[cfg_attr(not(feature = "window"), allow(unused_variables))]
fn open_sink(config: &AppConfig, quit: &QuitFlag) -> Result<Box<dyn FrameSink>, DisplayError> {
    match &config.display {
        DisplayTarget::Framebuffer(path) => Ok(Box::new(Framebuffer::open(path)?)),
        #[cfg(feature = "window")]
        DisplayTarget::Window => Ok(Box::new(fbtrack::io::WindowSink::open(
            "fbtrack",
            config.camera.width,
            config.camera.height,
            quit.clone(),
        )?)),
    }
}

/// Give pointer discovery a moment so the first frames already have it.
fn wait_for_pointer(view: &PointerView, handle: &JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !view.is_available() && !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if !view.is_available() {
        info!("no pointer yet; keyboard commands available");
    }
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("{name} thread panicked");
    }
}

/// Input threads sharing the quit flag. `stop` raises quit and joins them
/// in spawn order.
struct Workers {
    quit: QuitFlag,
    threads: Vec<(String, JoinHandle<()>)>,
}

impl Workers {
    fn new(quit: QuitFlag) -> Self {
        Workers { quit, threads: Vec::new() }
    }

    fn spawn<F>(&mut self, name: &str, body: F) -> Result<&JoinHandle<()>, AppError>
    where
        F: FnOnce() + Send + 'static,
    {
        let spawned = thread::Builder::new().name(name.into()).spawn(body);
        self.adopt(name, spawned)
    }

    /// Keep a freshly spawned thread. A failed spawn stops the threads
    /// already running before the error is returned.
    fn adopt(
        &mut self,
        name: &str,
        spawned: io::Result<JoinHandle<()>>,
    ) -> Result<&JoinHandle<()>, AppError> {
        match spawned {
            Ok(handle) => {
                self.threads.push((name.to_string(), handle));
                let (_, handle) = &self.threads[self.threads.len() - 1];
                Ok(handle)
            }
            Err(e) => {
                error!("could not start {name} thread: {e}");
                self.stop();
                Err(AppError::Thread(e))
            }
        }
    }

    fn stop(&mut self) {
        self.quit.raise();
        for (name, handle) in self.threads.drain(..) {
            join(&name, handle);
        }
    }
}

fn run(config: AppConfig) -> Result<(), AppError> {
    let ControlSignals { pointer, command, reader, quit } = signals::channel(config.pointer.start);
    ctrlc::set_handler({
        let quit = quit.clone();
        move || {
            info!("interrupt received, stopping");
            quit.raise();
        }
    })?;

    let gpu = GpuDevice::new_with_profile(config.profile)?;
    let correlator = GpuCorrelator::new(gpu, &config.kernel)?;
    let engine = TrackingEngine::new(correlator, config.tracker.clone());

    let camera = V4lCamera::open(&config.camera)?;
    let sink = open_sink(&config, &quit)?;

    let view = pointer.view();
    let mut workers = Workers::new(quit.clone());
    let pointer_thread = workers.spawn("pointer", {
        let config = config.pointer.clone();
        let quit = quit.clone();
        move || input::pointer::run(config, pointer, quit)
    })?;
    wait_for_pointer(&view, pointer_thread, config.pointer.discovery_wait);

    workers.spawn("command", {
        let view = view.clone();
        let poll = config.pipeline.command_poll;
        move || input::command::run(io::stdin(), command, view, poll)
    })?;

    let mut pipeline = FramePipeline::new(engine, camera, sink, reader, config.pipeline.clone());
    pipeline.run();

    workers.stop();
    drop(pipeline);
    info!("shutdown complete");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = argh::from_env();

    match run(args.into_config()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn until_quit(quit: &QuitFlag) -> impl FnOnce() + Send + 'static {
        let quit = quit.clone();
        move || {
            while !quit.is_raised() {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn test_failed_spawn_stops_running_threads() {
        let quit = QuitFlag::new();
        let mut workers = Workers::new(quit.clone());
        workers.spawn("pointer", until_quit(&quit)).unwrap();
        assert!(!quit.is_raised());

        let failed = workers.adopt("command", Err(io::Error::other("no threads left")));
        assert!(matches!(failed, Err(AppError::Thread(_))));
        assert!(quit.is_raised());
        assert!(workers.threads.is_empty());
    }

    #[test]
    fn test_stop_joins_every_thread() {
        let quit = QuitFlag::new();
        let mut workers = Workers::new(quit.clone());
        workers.spawn("pointer", until_quit(&quit)).unwrap();
        workers.spawn("command", until_quit(&quit)).unwrap();
        workers.stop();
        assert!(quit.is_raised());
        assert!(workers.threads.is_empty());
    }
}
