// config.rs — Tunables for the tracker and the application around it.
//
// `TrackerConfig` holds everything the engine itself consults; it has no
// I/O in it and is what tests construct. `AppConfig` adds the collaborator
// knobs (device paths, resolution) that only `main` cares about. Both carry
// defaults matching the values the tracker was tuned with on the board.

use std::path::PathBuf;
use std::time::Duration;

use crate::image::Point;

/// Entry point the shipped kernel exposes.
pub const DEFAULT_ENTRY_POINT: &str = "direct_ncc_tracker";

/// Entry points tried, in order, when legacy names are enabled.
/// Older kernel files exported one of these names.
pub const LEGACY_ENTRY_POINTS: [&str; 5] = [
    "direct_ncc_tracker",
    "grayscale_ncc_tracker",
    "feature_extraction",
    "correlation_layer",
    "detection_head",
];

/// Engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Side of the square crop taken around the pointer on select.
    pub select_size: i32,
    /// A clipped crop must be strictly wider and taller than this.
    pub min_template_side: i32,
    /// Templates larger than this in either dimension are resampled.
    pub template_max_side: usize,
    /// Side of the resampled template.
    pub template_downsample_side: usize,
    /// Half-size of the search window around the tracked point.
    pub search_margin: i32,
    /// A clipped window must be strictly wider and taller than this,
    /// otherwise the frame is skipped.
    pub min_search_side: i32,
    /// A best score strictly above this is a successful match.
    pub confidence_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            select_size: 32,
            min_template_side: 20,
            template_max_side: 100,
            template_downsample_side: 80,
            search_margin: 100,
            min_search_side: 50,
            confidence_threshold: 0.6,
        }
    }
}

/// Which kernel file to build and which entry point to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    pub source_path: PathBuf,
    pub entry_point: String,
    /// Also try `LEGACY_ENTRY_POINTS` if `entry_point` is missing.
    pub try_legacy_names: bool,
}

impl KernelConfig {
    /// Names to resolve, in order, without duplicates.
    pub fn candidates(&self) -> Vec<String> {
        let mut names = vec![self.entry_point.clone()];
        if self.try_legacy_names {
            for name in LEGACY_ENTRY_POINTS {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            source_path: PathBuf::from("shaders/ncc.wgsl"),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            try_legacy_names: false,
        }
    }
}

/// Pixel format requested from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFormat {
    Yuyv,
    Rgb24,
}

impl std::str::FromStr for CameraFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YUYV" => Ok(CameraFormat::Yuyv),
            "RGB3" | "RGB24" => Ok(CameraFormat::Rgb24),
            other => Err(format!("unsupported camera format '{other}' (expected YUYV or RGB3)")),
        }
    }
}

/// Camera request.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub device_path: String,
    pub width: usize,
    pub height: usize,
    pub fps: u32,
    pub format: CameraFormat,
    /// Longest a dequeue may block before the frame counts as empty.
    pub timeout: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            device_path: "/dev/video11".to_string(),
            width: 1920,
            height: 1080,
            fps: 30,
            format: CameraFormat::Yuyv,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Where annotated frames go.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayTarget {
    Framebuffer(PathBuf),
    #[cfg(feature = "window")]
    Window,
}

/// Pointer aggregator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerConfig {
    /// Device nodes tried in order; the first mouse-like device wins.
    pub candidates: Vec<PathBuf>,
    /// Pointer position is clamped to `[0, width) × [0, height)`.
    pub display_width: i32,
    pub display_height: i32,
    /// Starting position before any motion arrives.
    pub start: Point,
    /// Sleep between reads when no event is pending.
    pub idle_backoff: Duration,
    /// How long startup waits for discovery before going command-only.
    pub discovery_wait: Duration,
}

impl PointerConfig {
    /// Default search order: the nodes mice usually land on for the board
    /// first, then the remaining event nodes, then the legacy mouse nodes.
    pub fn default_candidates() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("/dev/input/event10"),
            PathBuf::from("/dev/input/event11"),
        ];
        paths.extend((0..10).map(|i| PathBuf::from(format!("/dev/input/event{i}"))));
        paths.push(PathBuf::from("/dev/input/mouse0"));
        paths.push(PathBuf::from("/dev/input/mice"));
        paths
    }
}

impl Default for PointerConfig {
    fn default() -> Self {
        PointerConfig {
            candidates: Self::default_candidates(),
            display_width: 1920,
            display_height: 1080,
            start: Point::new(320, 240),
            idle_backoff: Duration::from_millis(10),
            discovery_wait: Duration::from_millis(500),
        }
    }
}

/// Frame loop pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Sleep after an empty frame before trying again.
    pub empty_frame_retry: Duration,
    /// Yield at the end of every frame.
    pub frame_yield: Duration,
    /// Poll interval for the command aggregator's quit check.
    pub command_poll: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            empty_frame_retry: Duration::from_millis(100),
            frame_yield: Duration::from_millis(1),
            command_poll: Duration::from_millis(50),
        }
    }
}

/// Everything `main` needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub kernel: KernelConfig,
    pub camera: CameraConfig,
    pub display: DisplayTarget,
    pub pointer: PointerConfig,
    pub pipeline: PipelineConfig,
    pub profile: crate::gpu::device::DeviceProfile,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            tracker: TrackerConfig::default(),
            kernel: KernelConfig::default(),
            camera: CameraConfig::default(),
            display: DisplayTarget::Framebuffer(PathBuf::from("/dev/fb0")),
            pointer: PointerConfig::default(),
            pipeline: PipelineConfig::default(),
            profile: crate::gpu::device::DeviceProfile::Native,
        }
    }
}
