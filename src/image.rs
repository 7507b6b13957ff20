// image.rs — Interleaved RGB8 frames plus the integer geometry used to
// address them (Point, Rect).
//
// Every buffer that crosses the host/GPU boundary in this crate is an
// `RgbImage`: camera frames, search regions, templates and the annotated
// frame handed to the display. Pixels are packed `R G B R G B ...` with no
// row padding, which is exactly the layout the NCC kernel indexes:
//
//   byte index of channel c at (x, y) = (y * width + x) * 3 + c
//
// Geometry is signed (`i32`). Windows and crops are built around points
// that may sit on or past the frame edge, and the clipping is easier to
// reason about when a rectangle is allowed to start at a negative offset
// before it is intersected with the frame bounds.

use std::fmt;

/// Number of interleaved channels in every frame.
pub const CHANNELS: usize = 3;

// ---------------------------------------------------------------------------
// Point / Rect
// ---------------------------------------------------------------------------

/// Integer pixel coordinate. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    /// Translate by `(dx, dy)`.
    #[inline]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance, handy for "within N pixels" checks.
    pub fn max_abs_diff(self, other: Point) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned rectangle `[x, x + width) × [y, y + height)`.
///
/// A rectangle with a non-positive width or height is empty. Empty
/// rectangles are legal values (they are what an intersection returns
/// when two regions do not overlap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { x, y, width, height }
    }

    /// Rectangle of size `width × height` whose top-left corner is
    /// `center - (width / 2, height / 2)`.
    pub fn centered(center: Point, width: i32, height: i32) -> Self {
        Rect::new(center.x - width / 2, center.y - height / 2, width, height)
    }

    /// Square of half-size `margin` around `center`: `[c - m, c + m)`.
    pub fn around(center: Point, margin: i32) -> Self {
        Rect::new(center.x - margin, center.y - margin, 2 * margin, 2 * margin)
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Integer centre, rounding toward the top-left.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Overlap of two rectangles. Returns an empty rect (width/height 0)
    /// positioned at the clamped corner when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}×{} at ({}, {})]", self.width, self.height, self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// RgbImage
// ---------------------------------------------------------------------------

/// A tightly packed, row-major, 3-channel 8-bit image.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl RgbImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        RgbImage {
            data: vec![0; width * height * CHANNELS],
            width,
            height,
        }
    }

    /// Wrap an existing interleaved buffer.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height * 3`.
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width * height * CHANNELS,
            "data length ({}) must equal width * height * 3 ({})",
            data.len(),
            width * height * CHANNELS,
        );
        RgbImage { data, width, height }
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> [u8; 3],
    ) -> Self {
        let mut data = Vec::with_capacity(width * height * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        RgbImage { data, width, height }
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
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The full frame as a rectangle anchored at the origin.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Pixel at (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [u8; 3] {
        let i = self.index(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, px: [u8; 3]) {
        let i = self.index(x, y);
        self.data[i..i + CHANNELS].copy_from_slice(&px);
    }

    /// Set a pixel given signed coordinates; silently ignores anything
    /// outside the image. This is what the overlay primitives draw with.
    #[inline]
    pub fn put(&mut self, x: i32, y: i32, px: [u8; 3]) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.set(x as usize, y as usize, px);
        }
    }

    /// One row of interleaved bytes (`width * 3` long).
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let stride = self.width * CHANNELS;
        &self.data[y * stride..(y + 1) * stride]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let stride = self.width * CHANNELS;
        &mut self.data[y * stride..(y + 1) * stride]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy the region `rect` into a new image.
    ///
    /// # Panics
    /// Panics if `rect` is not fully inside the image. Callers clip with
    /// `Rect::intersect(&img.bounds())` first.
    pub fn crop(&self, rect: Rect) -> RgbImage {
        assert!(
            rect.x >= 0
                && rect.y >= 0
                && rect.width >= 0
                && rect.height >= 0
                && rect.right() as usize <= self.width
                && rect.bottom() as usize <= self.height,
            "crop region {rect} exceeds image bounds {}×{}",
            self.width,
            self.height,
        );
        let (x0, w) = (rect.x as usize, rect.width as usize);
        let mut data = Vec::with_capacity(w * rect.height as usize * CHANNELS);
        for y in rect.y as usize..rect.bottom() as usize {
            let row = self.row(y);
            data.extend_from_slice(&row[x0 * CHANNELS..(x0 + w) * CHANNELS]);
        }
        RgbImage::from_vec(w, rect.height as usize, data)
    }

    /// Paste `src` with its top-left corner at (x, y); clipped at the edges.
    pub fn blit(&mut self, src: &RgbImage, x: i32, y: i32) {
        for sy in 0..src.height {
            for sx in 0..src.width {
                self.put(x + sx as i32, y + sy as i32, src.get(sx, sy));
            }
        }
    }

    /// Bilinear resample to `new_width × new_height`.
    ///
    /// Uses pixel-centre alignment (`src = (dst + 0.5) * scale - 0.5`) with
    /// edge replication, so a 1:1 resize is the identity.
    pub fn resize_bilinear(&self, new_width: usize, new_height: usize) -> RgbImage {
        assert!(!self.is_empty(), "cannot resize an empty image");
        let sx = self.width as f32 / new_width as f32;
        let sy = self.height as f32 / new_height as f32;
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;

        RgbImage::from_fn(new_width, new_height, |dx, dy| {
            let fx = ((dx as f32 + 0.5) * sx - 0.5).clamp(0.0, max_x);
            let fy = ((dy as f32 + 0.5) * sy - 0.5).clamp(0.0, max_y);
            let x0 = fx.floor() as usize;
            let y0 = fy.floor() as usize;
            let x1 = (x0 + 1).min(self.width - 1);
            let y1 = (y0 + 1).min(self.height - 1);
            let ax = fx - x0 as f32;
            let ay = fy - y0 as f32;

            let p00 = self.get(x0, y0);
            let p10 = self.get(x1, y0);
            let p01 = self.get(x0, y1);
            let p11 = self.get(x1, y1);
            let mut out = [0u8; 3];
            for c in 0..CHANNELS {
                let v = (1.0 - ax) * (1.0 - ay) * p00[c] as f32
                    + ax * (1.0 - ay) * p10[c] as f32
                    + (1.0 - ax) * ay * p01[c] as f32
                    + ax * ay * p11[c] as f32;
                out[c] = v.clamp(0.0, 255.0).round() as u8;
            }
            out
        })
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
        (y * self.width + x) * CHANNELS
    }
}

impl fmt::Debug for RgbImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgbImage {{ {}×{} }}", self.width, self.height)
    }
}
