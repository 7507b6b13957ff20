// convert.rs — Pixel format conversions at the collaborator boundaries.
//
//   camera  → core : YUYV 4:2:2 or packed RGB24  → RgbImage
//   core → display : RgbImage → XRGB8888 / RGB565 (framebuffer)
//                    RgbImage → 0RGB u32        (minifb window)
//
// The core only ever sees interleaved RGB8.

use crate::image::RgbImage;

/// Convert one packed YUYV (YUY2) frame to RGB using BT.601 limited-range
/// coefficients in 8.8 fixed point.
///
/// Returns `None` if `src` is shorter than `width * height * 2` bytes or
/// `width` is odd (YUYV packs pixel pairs).
pub fn yuyv_to_rgb(src: &[u8], width: usize, height: usize) -> Option<RgbImage> {
    if width % 2 != 0 || src.len() < width * height * 2 {
        return None;
    }
    let mut out = RgbImage::new(width, height);
    for y in 0..height {
        let src_row = &src[y * width * 2..(y + 1) * width * 2];
        let dst_row = out.row_mut(y);
        for (pair, dst) in src_row.chunks_exact(4).zip(dst_row.chunks_exact_mut(6)) {
            let (y0, u, y1, v) = (pair[0], pair[1], pair[2], pair[3]);
            dst[..3].copy_from_slice(&yuv_to_rgb(y0, u, v));
            dst[3..].copy_from_slice(&yuv_to_rgb(y1, u, v));
        }
    }
    Some(out)
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

/// Wrap a packed RGB24 buffer, trimming any driver padding past the frame.
pub fn rgb24_to_rgb(src: &[u8], width: usize, height: usize) -> Option<RgbImage> {
    let n = width * height * 3;
    (src.len() >= n).then(|| RgbImage::from_vec(width, height, src[..n].to_vec()))
}

/// Pack a pixel as `0x00RRGGBB` — minifb's buffer format.
#[inline]
pub fn pack_0rgb(px: [u8; 3]) -> u32 {
    ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32
}

/// Pack a pixel as little-endian XRGB8888 bytes (`B G R X` in memory),
/// the common 32 bpp Linux framebuffer layout.
#[inline]
pub fn pack_xrgb8888(px: [u8; 3]) -> [u8; 4] {
    [px[2], px[1], px[0], 0xff]
}

/// Pack a pixel as little-endian RGB565 bytes.
#[inline]
pub fn pack_rgb565(px: [u8; 3]) -> [u8; 2] {
    let v = ((px[0] as u16 & 0xf8) << 8) | ((px[1] as u16 & 0xfc) << 3) | (px[2] as u16 >> 3);
    v.to_le_bytes()
}

/// Whole-frame conversion for the window sink.
pub fn rgb_to_0rgb(src: &RgbImage, dst: &mut Vec<u32>) {
    dst.clear();
    dst.extend(src.as_bytes().chunks_exact(3).map(|p| pack_0rgb([p[0], p[1], p[2]])));
}
