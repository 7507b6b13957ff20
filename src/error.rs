// error.rs — Error types, one enum per concern.
//
// Startup failures (no adapter, kernel does not build, camera missing) are
// fatal and bubble up to `main` through `AppError`. Everything that can go
// wrong inside the frame loop is either a recoverable condition that the
// loop logs and skips, or a normal search outcome that never becomes an
// error at all.

use std::path::PathBuf;

/// Errors from the compute backend: device discovery, kernel build,
/// entry-point resolution and per-frame dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// No adapter was found for the enabled backends, not even a CPU one.
    #[error("no compute adapter found (tried GPU adapters, then CPU adapters)")]
    NoSuitableAdapter,

    /// The adapter refused the device request (driver issue, limits).
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Requested workgroup size exceeds the profile's invocation limit.
    #[error("workgroup size {total} exceeds profile limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },

    /// The kernel source file could not be read.
    #[error("failed to read kernel source {path}: {source}")]
    KernelSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The kernel source did not compile. `log` is the backend's
    /// diagnostic output, verbatim.
    #[error("kernel program build failed for {path}:\n{log}")]
    ProgramBuild { path: PathBuf, log: String },

    /// None of the requested entry points exist in the built program.
    #[error("no correlation kernel found; tried: {}", candidates.join(", "))]
    KernelNotFound { candidates: Vec<String> },

    /// The device rejected a dispatch or a buffer operation.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Mapping the score surface back to host memory failed.
    #[error("readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    /// The backend produced or was asked for an invalid surface.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// A correlation surface must have strictly positive dimensions and one
/// score per cell.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("correlation surface dimensions must be positive, got {width}×{height}")]
    NonPositive { width: i64, height: i64 },

    #[error("correlation surface {width}×{height} expects {expected} scores, got {actual}")]
    LengthMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
}

/// Errors from the camera collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("camera negotiated unsupported pixel format {0}")]
    UnsupportedFormat(String),
}

/// Errors from the display collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("framebuffer I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("framebuffer geometry unreadable: {0}")]
    Geometry(String),

    #[error("unsupported framebuffer depth: {0} bpp")]
    UnsupportedDepth(u32),

    #[cfg(feature = "window")]
    #[error("window error: {0}")]
    Window(#[from] minifb::Error),
}

/// Errors from pointer device discovery.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("no pointer device with relative motion and a primary button among {tried} candidates")]
    NoPointerDevice { tried: usize },

    #[error("input I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level startup error, mapped to a nonzero exit code by `main`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("compute backend initialization failed: {0}")]
    Compute(#[from] ComputeError),

    #[error("frame source initialization failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("display initialization failed: {0}")]
    Display(#[from] DisplayError),

    #[error("signal handler installation failed: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("failed to spawn thread: {0}")]
    Thread(#[source] std::io::Error),
}
