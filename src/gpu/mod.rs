// gpu/mod.rs — wgpu compute backend.
//
//   device      adapter tiers, device profile, workgroup sizing
//   correlator  NCC kernel build, template buffers, per-frame dispatch
//
// `ncc::ReferenceBackend` is the authoritative host implementation; the
// kernel is validated against it cell by cell.

pub mod correlator;
pub mod device;

pub use correlator::{GpuCorrelator, GpuTemplate};
pub use device::{DeviceProfile, GpuDevice, WorkgroupSize};
