// gpu/device.rs — wgpu adapter discovery and device setup.
//
// Responsibilities:
//   - Enumerate adapters and pick one in two tiers: real GPUs first, CPU
//     (software) adapters only when nothing else exists.
//   - Expose a `DeviceProfile` that caps device limits to what embedded
//     GPUs (Mali, VideoCore) report, so oversized dispatches fail on the
//     development machine rather than on the board.
//   - Provide `WorkgroupSize`, injected into kernels as WGSL `override`
//     constants at pipeline creation.
//
// BACKENDS:
// Vulkan by default. `WGPU_BACKEND=gl` (or any value wgpu understands)
// overrides it, which is how boards whose only compute path is GLES are
// driven.
//
// ADAPTER TIERS:
//   1. DiscreteGpu / IntegratedGpu / VirtualGpu / Other
//   2. Cpu (llvmpipe, lavapipe): logged with a warning
// Nothing at all → `ComputeError::NoSuitableAdapter`.

use std::collections::HashMap;
use std::fmt;

use log::{debug, info, warn};

use crate::error::ComputeError;

/// Hardware profile controlling device limits and default workgroup sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceProfile {
    /// The adapter's default limits.
    #[default]
    Native,
    /// Mali / VideoCore class limits: 256 invocations per workgroup,
    /// 128 MiB storage bindings.
    Embedded,
}

impl DeviceProfile {
    /// Adapter-name fragments that switch `Native` to `Embedded`.
    const EMBEDDED_ADAPTERS: [&'static str; 3] = ["mali", "v3d", "videocore"];

    /// `Embedded` when `adapter_name` looks like an embedded GPU, else `self`.
    pub fn detect(self, adapter_name: &str) -> Self {
        let name = adapter_name.to_ascii_lowercase();
        match self {
            DeviceProfile::Native
                if Self::EMBEDDED_ADAPTERS.iter().any(|frag| name.contains(frag)) =>
            {
                DeviceProfile::Embedded
            }
            other => other,
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::Embedded => write!(f, "Embedded (capped limits)"),
        }
    }
}

impl std::str::FromStr for DeviceProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(DeviceProfile::Native),
            "embedded" => Ok(DeviceProfile::Embedded),
            other => Err(format!("unknown device profile '{other}' (expected native|embedded)")),
        }
    }
}

/// A workgroup size for 2D compute dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Constants map for `PipelineCompilationOptions::constants`:
    ///
    /// ```wgsl
    /// override WORKGROUP_X: u32 = 16u;
    /// override WORKGROUP_Y: u32 = 8u;
    /// ```
    pub fn as_constants(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("WORKGROUP_X".to_string(), self.x as f64),
            ("WORKGROUP_Y".to_string(), self.y as f64),
        ])
    }

    /// 16×8 on desktop GPUs (whole warps / wavefronts), 8×8 on embedded.
    fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::Embedded => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Adapter identity, kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl AdapterInfo {
    pub fn is_software(&self) -> bool {
        self.device_type == wgpu::DeviceType::Cpu
    }
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(raw: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: raw.name,
            vendor: raw.vendor,
            device: raw.device,
            device_type: raw.device_type,
            backend: raw.backend,
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device, queue and active profile.
///
/// Hold one for the lifetime of the process.
///
/// # Field drop order
/// Fields drop top to bottom. `_instance` is last so the instance outlives
/// the device and queue; some Vulkan layers crash if the instance goes
/// first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Pick an adapter with `DeviceProfile::Native` limits (auto-switched
    /// to `Embedded` on Mali/VideoCore).
    pub fn new() -> Result<Self, ComputeError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, ComputeError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, ComputeError> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::VULKAN);
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(backends);
        for a in &adapters {
            debug!("adapter: {}", AdapterInfo::from(a.get_info()));
        }

        let adapter = select_adapter(adapters).ok_or(ComputeError::NoSuitableAdapter)?;
        let adapter_info = AdapterInfo::from(adapter.get_info());
        if adapter_info.is_software() {
            warn!("no GPU adapter found, falling back to software adapter {adapter_info}");
        }

        let detected = profile.detect(&adapter_info.name);
        if detected != profile {
            info!("{} adapter detected, using {detected} profile", adapter_info.name);
        }
        let profile = detected;

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("fbtrack"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let workgroup_size = WorkgroupSize::for_profile(profile);
        info!("using adapter {adapter_info}, workgroup {workgroup_size}");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            _instance: instance,
        })
    }

    /// Override the default workgroup size, validated against the profile.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), ComputeError> {
        let total = x * y;
        let max = max_invocations_for_profile(self.profile);
        if total > max {
            return Err(ComputeError::WorkgroupTooLarge { total, max });
        }
        self.workgroup_size = WorkgroupSize { x, y };
        Ok(())
    }

    /// Workgroup counts covering a `w × h` index space (ceiling division).
    /// Kernels must guard `gid >= size`.
    pub fn dispatch_size(&self, w: u32, h: u32) -> (u32, u32) {
        dispatch_size_for(self.workgroup_size, w, h)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

// ============================================================
// Helpers
// ============================================================

/// First hardware adapter, else the first software one.
fn select_adapter(adapters: Vec<wgpu::Adapter>) -> Option<wgpu::Adapter> {
    let (hardware, software): (Vec<_>, Vec<_>) = adapters
        .into_iter()
        .partition(|a| a.get_info().device_type != wgpu::DeviceType::Cpu);
    hardware.into_iter().chain(software).next()
}

fn dispatch_size_for(ws: WorkgroupSize, w: u32, h: u32) -> (u32, u32) {
    (w.div_ceil(ws.x), h.div_ceil(ws.y))
}

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::Embedded => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn max_invocations_for_profile(profile: DeviceProfile) -> u32 {
    limits_for_profile(profile).max_compute_invocations_per_workgroup
}

// ============================================================
// Tests
// ============================================================
