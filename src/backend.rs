// backend.rs — The seam between the tracking core and whatever computes
// correlation surfaces.
//
// The engine never touches device, queue or pipeline handles. It holds a
// `ComputeBackend` and talks to it through three calls:
//
//   upload_template   once per selection (synchronous)
//   release_template  before the next upload, on reset, on teardown
//   dispatch          once per tracking frame
//
// `gpu::GpuCorrelator` is the production implementation. `ncc::ReferenceBackend`
// computes the same surface on the host; it exists to validate the kernel
// and to drive tests and benchmarks, and is never picked as a runtime
// fallback.

use crate::error::ComputeError;
use crate::image::RgbImage;
use crate::ncc::CorrelationSurface;
use crate::template::Template;

/// A device that can hold a template and score it against search regions.
pub trait ComputeBackend {
    /// Backend-resident template storage.
    type Buffer;

    /// Copy `template` to the backend. The data must be visible to every
    /// `dispatch` issued after this returns.
    fn upload_template(&mut self, template: &RgbImage) -> Result<Self::Buffer, ComputeError>;

    /// Free a buffer returned by `upload_template`.
    fn release_template(&mut self, buffer: Self::Buffer);

    /// Score `template` at every offset of `search`.
    ///
    /// The surface is `(search.w - template.w) × (search.h - template.h)`;
    /// callers guarantee both are positive.
    fn dispatch(
        &mut self,
        template: &Template<Self::Buffer>,
        search: &RgbImage,
    ) -> Result<CorrelationSurface, ComputeError>;
}
