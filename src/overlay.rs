// overlay.rs — Geometric annotations drawn into the frame before display.
//
// All primitives clip at the image edges, so callers pass raw frame
// coordinates (the search window and pointer can sit partly off-frame).
//
// Layer order, back to front:
//   template preview (top-left, when not tracking)
//   search window, template region
//   tracked point (green while tracking, red cross when lost)
//   pointer crosshair, or a centre marker when there is no pointer
//   confidence bar (bottom-left)

use crate::engine::{FrameReport, Phase};
use crate::image::{Point, Rect, RgbImage};

pub type Color = [u8; 3];

pub const GREEN: Color = [0, 255, 0];
pub const RED: Color = [255, 0, 0];
pub const YELLOW: Color = [255, 255, 0];
pub const CYAN: Color = [0, 255, 255];
pub const WHITE: Color = [255, 255, 255];
pub const GRAY: Color = [64, 64, 64];

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Bresenham line.
pub fn draw_line(img: &mut RgbImage, p0: Point, p1: Point, color: Color) {
    let (mut x, mut y) = (p0.x, p0.y);
    let dx = (p1.x - p0.x).abs();
    let dy = -(p1.y - p0.y).abs();
    let sx = if p0.x < p1.x { 1 } else { -1 };
    let sy = if p0.y < p1.y { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        img.put(x, y, color);
        if x == p1.x && y == p1.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// One-pixel outline of `rect`.
pub fn draw_rect(img: &mut RgbImage, rect: Rect, color: Color) {
    if rect.is_empty() {
        return;
    }
    let (x0, y0) = (rect.x, rect.y);
    let (x1, y1) = (rect.right() - 1, rect.bottom() - 1);
    for x in x0..=x1 {
        img.put(x, y0, color);
        img.put(x, y1, color);
    }
    for y in y0..=y1 {
        img.put(x0, y, color);
        img.put(x1, y, color);
    }
}

pub fn fill_rect(img: &mut RgbImage, rect: Rect, color: Color) {
    let clipped = rect.intersect(&img.bounds());
    for y in clipped.y..clipped.bottom() {
        for x in clipped.x..clipped.right() {
            img.put(x, y, color);
        }
    }
}

/// Filled disc.
pub fn draw_circle(img: &mut RgbImage, center: Point, r: i32, color: Color) {
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                img.put(center.x + dx, center.y + dy, color);
            }
        }
    }
}

/// Plus-shaped crosshair with arms of length `arm`.
pub fn draw_crosshair(img: &mut RgbImage, p: Point, arm: i32, color: Color) {
    draw_line(img, p.offset(-arm, 0), p.offset(arm, 0), color);
    draw_line(img, p.offset(0, -arm), p.offset(0, arm), color);
}

/// Diagonal cross.
pub fn draw_cross(img: &mut RgbImage, p: Point, arm: i32, color: Color) {
    draw_line(img, p.offset(-arm, -arm), p.offset(arm, arm), color);
    draw_line(img, p.offset(-arm, arm), p.offset(arm, -arm), color);
}

/// Horizontal bar inside `area`, filled to `value` in [0, 1].
pub fn draw_bar(img: &mut RgbImage, area: Rect, value: f32, color: Color) {
    fill_rect(img, area, GRAY);
    let filled = (value.clamp(0.0, 1.0) * area.width as f32).round() as i32;
    fill_rect(img, Rect::new(area.x, area.y, filled, area.height), color);
    draw_rect(img, area, WHITE);
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// Draws a `FrameReport` onto the frame it was computed from.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub threshold: f32,
    pub crosshair_arm: i32,
    pub bar_size: (i32, i32),
    pub margin: i32,
}

impl Overlay {
    pub fn new(threshold: f32) -> Self {
        Overlay { threshold, crosshair_arm: 12, bar_size: (200, 12), margin: 10 }
    }

    pub fn draw(
        &self,
        frame: &mut RgbImage,
        report: &FrameReport,
        pointer: Option<Point>,
        preview: Option<&RgbImage>,
    ) {
        let state = &report.state;

        if state.phase != Phase::Tracking {
            if let Some(t) = preview {
                frame.blit(t, self.margin, self.margin);
                let border = Rect::new(
                    self.margin - 1,
                    self.margin - 1,
                    t.width() as i32 + 2,
                    t.height() as i32 + 2,
                );
                draw_rect(frame, border, WHITE);
            }
        }

        if let Some(window) = report.window {
            draw_rect(frame, window, YELLOW);
        }
        if let Some(region) = state.template_region {
            draw_rect(frame, region, CYAN);
        }

        if let Some(p) = state.point {
            match state.phase {
                Phase::Tracking => draw_circle(frame, p, 4, GREEN),
                Phase::Lost => draw_cross(frame, p, 8, RED),
                _ => draw_circle(frame, p, 3, YELLOW),
            }
        }

        match pointer {
            Some(p) => draw_crosshair(frame, p, self.crosshair_arm, WHITE),
            None => draw_crosshair(frame, frame.bounds().center(), self.crosshair_arm / 2, GRAY),
        }

        if state.phase.searches() {
            let (w, h) = self.bar_size;
            let bar = Rect::new(self.margin, frame.height() as i32 - self.margin - h, w, h);
            let color = if state.confidence > self.threshold { GREEN } else { RED };
            draw_bar(frame, bar, state.confidence, color);
            if state.phase == Phase::Lost {
                // Lost indicator: red frame border.
                draw_rect(frame, frame.bounds(), RED);
            }
        }
    }
}
