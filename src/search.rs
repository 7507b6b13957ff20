// search.rs — One NCC search per tracking frame.
//
//   1. no template          → failure, confidence 0
//   2. region ≤ template    → failure, confidence 0, region centre
//   3. dispatch             → CorrelationSurface
//   4. row-major arg-max    → best offset (first maximum wins)
//   5. offset + half size   → template centre in region coordinates
//   6. score > threshold    → success
//
// A weak peak is not an error: the point and score are still reported and
// the state machine decides what to do with them.

use log::{debug, trace};

use crate::backend::ComputeBackend;
use crate::error::ComputeError;
use crate::image::{Point, Rect, RgbImage};
use crate::ncc::CorrelationSurface;
use crate::template::TemplateStore;

/// Result of `CorrelationSearch::locate`, in search-region coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome {
    pub point: Point,
    pub confidence: f32,
    pub success: bool,
}

impl SearchOutcome {
    fn failed_at(point: Point) -> Self {
        SearchOutcome { point, confidence: 0.0, success: false }
    }
}

/// Square window of half-size `margin` around `center`, clipped to `frame`.
pub fn search_window(center: Point, margin: i32, frame: Rect) -> Rect {
    Rect::around(center, margin).intersect(&frame)
}

/// Arg-max plus confidence gate.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationSearch {
    threshold: f32,
}

impl CorrelationSearch {
    pub fn new(threshold: f32) -> Self {
        CorrelationSearch { threshold }
    }

    /// Find the template inside `region`.
    ///
    /// `Err` only when the backend itself fails; every search outcome,
    /// good or bad, is `Ok`.
    pub fn locate<B: ComputeBackend>(
        &self,
        backend: &mut B,
        store: &TemplateStore<B>,
        region: &RgbImage,
    ) -> Result<SearchOutcome, ComputeError> {
        let Some(template) = store.template() else {
            debug!("search skipped: no template");
            return Ok(SearchOutcome::failed_at(Point::default()));
        };

        if CorrelationSurface::dimensions_for(
            region.width(),
            region.height(),
            template.width(),
            template.height(),
        )
        .is_err()
        {
            debug!(
                "search region {}×{} too small for template {}×{}",
                region.width(),
                region.height(),
                template.width(),
                template.height()
            );
            return Ok(SearchOutcome::failed_at(region.bounds().center()));
        }

        let surface = backend.dispatch(template, region)?;
        Ok(self.evaluate(&surface, template.width(), template.height()))
    }

    /// Steps 4–6 on an already computed surface.
    pub fn evaluate(
        &self,
        surface: &CorrelationSurface,
        template_width: usize,
        template_height: usize,
    ) -> SearchOutcome {
        let peak = surface.peak();
        let point = Point::new(
            (peak.x + template_width / 2) as i32,
            (peak.y + template_height / 2) as i32,
        );
        let success = peak.score > self.threshold;
        trace!(
            "surface {}×{} peak {:.4} at ({}, {})",
            surface.width(),
            surface.height(),
            peak.score,
            peak.x,
            peak.y
        );
        if !success {
            debug!("low confidence match: {:.4}", peak.score);
        }
        SearchOutcome { point, confidence: peak.score, success }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_clipping() {
        let frame = Rect::new(0, 0, 640, 480);
        assert_eq!(search_window(Point::new(100, 100), 100, frame), Rect::new(0, 0, 200, 200));
        assert_eq!(search_window(Point::new(320, 240), 100, frame), Rect::new(220, 140, 200, 200));
        assert_eq!(search_window(Point::new(50, 20), 100, frame), Rect::new(0, 0, 150, 120));
        assert_eq!(search_window(Point::new(639, 479), 100, frame), Rect::new(539, 379, 101, 101));
    }

    #[test]
    fn test_evaluate_offsets_by_half_template() {
        let mut scores = vec![0.0; 20 * 10];
        scores[4 * 20 + 7] = 0.95;
        let s = CorrelationSurface::from_scores(20, 10, scores).unwrap();
        let out = CorrelationSearch::new(0.6).evaluate(&s, 33, 21);
        assert_eq!(out.point, Point::new(7 + 16, 4 + 10));
        assert!(out.success);
        assert_eq!(out.confidence, 0.95);
    }

    #[test]
    fn test_evaluate_weak_peak_still_reports_point() {
        let mut scores = vec![0.1; 5 * 5];
        scores[2 * 5 + 3] = 0.45;
        let s = CorrelationSurface::from_scores(5, 5, scores).unwrap();
        let out = CorrelationSearch::new(0.6).evaluate(&s, 10, 10);
        assert!(!out.success);
        assert_eq!(out.point, Point::new(8, 7));
        assert_eq!(out.confidence, 0.45);
    }
}
