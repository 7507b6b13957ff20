// io/mod.rs — Frame sources and sinks backed by real devices.

pub mod camera;
pub mod framebuffer;
#[cfg(feature = "window")]
pub mod window;

pub use camera::V4lCamera;
pub use framebuffer::{FbGeometry, Framebuffer};
#[cfg(feature = "window")]
pub use window::WindowSink;
