// ncc.rs — Correlation surfaces and the host reference for the NCC kernel.
//
// SCORE DEFINITION
// ─────────────────
// Zero-mean normalized cross-correlation over all three channels at once.
// For template T and the equally sized search patch S at offset (ox, oy),
// with n = tw * th * 3 samples:
//
//                 Σ (T_i - mean T) (S_i - mean S)
//   ncc = ───────────────────────────────────────────────
//          sqrt( Σ (T_i - mean T)²  ·  Σ (S_i - mean S)² )
//
// and 0 when either patch is flat (the denominator vanishes). The result
// lies in [-1, 1]; 1 means S is an affine brightness/contrast copy of T.
//
// The kernel in shaders/ncc.wgsl evaluates this with two f32 passes per
// offset. The reference below precomputes the template deviations once and
// uses f64 single-pass sums per offset, which is exact for 8-bit input at
// these patch sizes and fast enough to drive the integration tests.
//
// SURFACE SIZE
// ─────────────
// (search_w - tw) × (search_h - th). The last row/column of offsets where
// the template would still fit is deliberately excluded; the kernel's
// index space and the arg-max both follow that size.

use crate::backend::ComputeBackend;
use crate::error::{ComputeError, SurfaceError};
use crate::image::RgbImage;
use crate::template::Template;

/// Below this the denominator is treated as zero (flat patch).
const FLAT_EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// CorrelationSurface
// ---------------------------------------------------------------------------

/// Row-major grid of NCC scores, one per template offset.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationSurface {
    width: usize,
    height: usize,
    scores: Vec<f32>,
}

/// Best cell of a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

impl CorrelationSurface {
    /// Surface dimensions for a search region and template, or an error if
    /// either is non-positive.
    pub fn dimensions_for(
        search_width: usize,
        search_height: usize,
        template_width: usize,
        template_height: usize,
    ) -> Result<(usize, usize), SurfaceError> {
        let w = search_width as i64 - template_width as i64;
        let h = search_height as i64 - template_height as i64;
        if w <= 0 || h <= 0 {
            return Err(SurfaceError::NonPositive { width: w, height: h });
        }
        Ok((w as usize, h as usize))
    }

    pub fn from_scores(
        width: usize,
        height: usize,
        scores: Vec<f32>,
    ) -> Result<Self, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::NonPositive {
                width: width as i64,
                height: height as i64,
            });
        }
        if scores.len() != width * height {
            return Err(SurfaceError::LengthMismatch {
                width,
                height,
                expected: width * height,
                actual: scores.len(),
            });
        }
        Ok(CorrelationSurface { width, height, scores })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.scores[y * self.width + x]
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Arg-max in row-major order (y, then x). The running best starts at
    /// -1.0 at (0, 0) and only a strictly greater score replaces it, so the
    /// first of several equal maxima wins and NaN cells are skipped.
    pub fn peak(&self) -> Peak {
        let mut best = Peak { x: 0, y: 0, score: -1.0 };
        for (y, row) in self.scores.chunks_exact(self.width).enumerate() {
            for (x, &score) in row.iter().enumerate() {
                if score > best.score {
                    best = Peak { x, y, score };
                }
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Host reference
// ---------------------------------------------------------------------------

/// Template statistics reused across every offset.
struct TemplateStats {
    deviations: Vec<f64>,
    variance: f64,
}

impl TemplateStats {
    fn new(template: &RgbImage) -> Self {
        let bytes = template.as_bytes();
        let n = bytes.len() as f64;
        let mean = bytes.iter().map(|&b| b as f64).sum::<f64>() / n;
        let deviations: Vec<f64> = bytes.iter().map(|&b| b as f64 - mean).collect();
        let variance = deviations.iter().map(|d| d * d).sum();
        TemplateStats { deviations, variance }
    }
}

fn score_at(
    stats: &TemplateStats,
    template: &RgbImage,
    search: &RgbImage,
    ox: usize,
    oy: usize,
) -> f32 {
    let row_len = template.width() * 3;
    let n = stats.deviations.len() as f64;
    let (mut sum_s, mut sum_s2, mut cross) = (0.0f64, 0.0f64, 0.0f64);

    for ty in 0..template.height() {
        let s_row = &search.row(oy + ty)[ox * 3..ox * 3 + row_len];
        let d_row = &stats.deviations[ty * row_len..(ty + 1) * row_len];
        for (&s, &d) in s_row.iter().zip(d_row) {
            let s = s as f64;
            sum_s += s;
            sum_s2 += s * s;
            // Σ d·(s - mean S) = Σ d·s because Σ d = 0.
            cross += d * s;
        }
    }

    let var_s = sum_s2 - sum_s * sum_s / n;
    let denom = stats.variance * var_s;
    if denom <= FLAT_EPSILON {
        return 0.0;
    }
    (cross / denom.sqrt()) as f32
}

/// NCC score of `template` placed at (ox, oy) in `search`.
///
/// # Panics
/// Panics if the template does not fit at that offset.
pub fn ncc_at(template: &RgbImage, search: &RgbImage, ox: usize, oy: usize) -> f32 {
    assert!(
        ox + template.width() <= search.width() && oy + template.height() <= search.height(),
        "template {}×{} does not fit at ({ox},{oy}) in {}×{}",
        template.width(),
        template.height(),
        search.width(),
        search.height(),
    );
    score_at(&TemplateStats::new(template), template, search, ox, oy)
}

/// Full correlation surface of `template` over `search`.
pub fn ncc_surface(
    template: &RgbImage,
    search: &RgbImage,
) -> Result<CorrelationSurface, SurfaceError> {
    let (w, h) = CorrelationSurface::dimensions_for(
        search.width(),
        search.height(),
        template.width(),
        template.height(),
    )?;
    let stats = TemplateStats::new(template);
    let mut scores = Vec::with_capacity(w * h);
    for oy in 0..h {
        for ox in 0..w {
            scores.push(score_at(&stats, template, search, ox, oy));
        }
    }
    CorrelationSurface::from_scores(w, h, scores)
}

/// Host implementation of `ComputeBackend`.
///
/// Keeps counters so tests can check the template lifecycle (one live
/// buffer at most, released before the next upload).
#[derive(Debug, Default)]
pub struct ReferenceBackend {
    uploads: usize,
    releases: usize,
    dispatches: usize,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn releases(&self) -> usize {
        self.releases
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches
    }

    /// Templates uploaded and not yet released.
    pub fn live_templates(&self) -> usize {
        self.uploads - self.releases
    }
}

impl ComputeBackend for ReferenceBackend {
    type Buffer = RgbImage;

    fn upload_template(&mut self, template: &RgbImage) -> Result<RgbImage, ComputeError> {
        self.uploads += 1;
        Ok(template.clone())
    }

    fn release_template(&mut self, buffer: RgbImage) {
        self.releases += 1;
        drop(buffer);
    }

    fn dispatch(
        &mut self,
        template: &Template<RgbImage>,
        search: &RgbImage,
    ) -> Result<CorrelationSurface, ComputeError> {
        self.dispatches += 1;
        Ok(ncc_surface(template.handle(), search)?)
    }
}
