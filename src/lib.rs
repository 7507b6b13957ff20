// fbtrack: GPU-accelerated NCC template tracking on a camera feed,
// presented on a raw Linux framebuffer and driven by raw input devices.
//
// Core (device-free, tested with the host reference backend):
//   image, ncc, template, search, engine, signals
//
// Around it:
//   gpu       wgpu device and the NCC kernel
//   input     evdev pointer and stdin command producers
//   io        V4L2 camera, fbdev and window sinks
//   pipeline  per-frame orchestration, overlay drawing

pub mod backend;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod image;
pub mod input;
pub mod io;
pub mod ncc;
pub mod overlay;
pub mod pipeline;
pub mod search;
pub mod signals;
pub mod template;

pub use backend::ComputeBackend;
pub use engine::{FrameCommands, FrameReport, Phase, Selection, TrackState, TrackingEngine};
pub use image::{Point, Rect, RgbImage};
pub use ncc::{CorrelationSurface, ReferenceBackend};
