// template.rs — The single live reference patch.
//
// Lifecycle:
//
//   select ─► prepare (resample if oversized) ─► release old ─► upload new
//   reset / teardown ─► release
//
// At most one backend buffer exists at any time. The old buffer is handed
// back to the backend *before* the new one is allocated, so a failed
// upload leaves the store empty rather than holding a stale template.

use std::borrow::Cow;

use log::{debug, info};

use crate::backend::ComputeBackend;
use crate::config::TrackerConfig;
use crate::error::ComputeError;
use crate::image::RgbImage;

/// A backend-resident template and its dimensions.
#[derive(Debug)]
pub struct Template<H> {
    handle: H,
    width: usize,
    height: usize,
}

impl<H> Template<H> {
    pub fn new(handle: H, width: usize, height: usize) -> Self {
        Template { handle, width, height }
    }

    #[inline]
    pub fn handle(&self) -> &H {
        &self.handle
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn into_handle(self) -> H {
        self.handle
    }
}

/// Resample `patch` to `side × side` if either dimension exceeds
/// `max_side`; otherwise borrow it unchanged.
pub fn prepare_patch(patch: &RgbImage, max_side: usize, side: usize) -> Cow<'_, RgbImage> {
    if patch.width() > max_side || patch.height() > max_side {
        Cow::Owned(patch.resize_bilinear(side, side))
    } else {
        Cow::Borrowed(patch)
    }
}

/// Owner of the live template and its host copy.
pub struct TemplateStore<B: ComputeBackend> {
    current: Option<Template<B::Buffer>>,
    /// The image that was uploaded, after resampling.
    preview: Option<RgbImage>,
    max_side: usize,
    downsample_side: usize,
}

impl<B: ComputeBackend> TemplateStore<B> {
    pub fn new(config: &TrackerConfig) -> Self {
        TemplateStore {
            current: None,
            preview: None,
            max_side: config.template_max_side,
            downsample_side: config.template_downsample_side,
        }
    }

    /// Replace the live template with `patch`.
    ///
    /// Returns the stored dimensions, which differ from the patch's when it
    /// was resampled. The upload has completed when this returns.
    pub fn set_template(
        &mut self,
        backend: &mut B,
        patch: &RgbImage,
    ) -> Result<(usize, usize), ComputeError> {
        let prepared = prepare_patch(patch, self.max_side, self.downsample_side);
        if let Cow::Owned(ref resized) = prepared {
            debug!(
                "template {}×{} exceeds {}, resampled to {}×{}",
                patch.width(),
                patch.height(),
                self.max_side,
                resized.width(),
                resized.height()
            );
        }

        self.clear(backend);

        let handle = backend.upload_template(&prepared)?;
        let dims = (prepared.width(), prepared.height());
        self.current = Some(Template::new(handle, dims.0, dims.1));
        self.preview = Some(prepared.into_owned());
        info!("template set with size {}×{}", dims.0, dims.1);
        Ok(dims)
    }

    /// Release the live template, if any. Safe to call repeatedly.
    pub fn clear(&mut self, backend: &mut B) {
        self.preview = None;
        if let Some(old) = self.current.take() {
            backend.release_template(old.into_handle());
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }

    pub fn template(&self) -> Option<&Template<B::Buffer>> {
        self.current.as_ref()
    }

    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.current.as_ref().map(|t| (t.width, t.height))
    }

    pub fn preview(&self) -> Option<&RgbImage> {
        self.preview.as_ref()
    }
}
