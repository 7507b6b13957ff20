// io/framebuffer.rs — Linux fbdev sink.
//
// Geometry comes from sysfs rather than FBIOGET_* ioctls:
//
//   /sys/class/graphics/<fb>/virtual_size    "1920,1080"
//   /sys/class/graphics/<fb>/bits_per_pixel  "32"
//   /sys/class/graphics/<fb>/stride          "7680"   (optional)
//
// The device node is mapped once; each frame is packed row by row into the
// mapping. Frames larger than the screen are clipped at the right and
// bottom, smaller ones leave the rest of the screen untouched.

use std::fs::{self, OpenOptions};
use std::path::Path;

use log::info;
use memmap2::{MmapMut, MmapOptions};

use crate::convert::{pack_rgb565, pack_xrgb8888};
use crate::error::DisplayError;
use crate::image::RgbImage;
use crate::pipeline::FrameSink;

/// Screen layout of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FbGeometry {
    pub width: usize,
    pub height: usize,
    pub bits_per_pixel: u32,
    /// Bytes per row.
    pub stride: usize,
}

impl FbGeometry {
    /// Parse the sysfs attribute contents. A missing stride is derived
    /// from width and depth.
    pub fn parse(
        virtual_size: &str,
        bits_per_pixel: &str,
        stride: Option<&str>,
    ) -> Result<Self, DisplayError> {
        let virtual_size = virtual_size.trim();
        let (w, h) = virtual_size
            .split_once(',')
            .ok_or_else(|| DisplayError::Geometry(format!("bad virtual_size '{virtual_size}'")))?;
        let parse_num = |s: &str, what: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| DisplayError::Geometry(format!("bad {what} '{}'", s.trim())))
        };
        let width = parse_num(w, "width")?;
        let height = parse_num(h, "height")?;
        let bpp = parse_num(bits_per_pixel, "bits_per_pixel")? as u32;
        if bpp != 32 && bpp != 16 {
            return Err(DisplayError::UnsupportedDepth(bpp));
        }
        let stride = match stride {
            Some(s) => parse_num(s, "stride")?,
            None => width * (bpp as usize / 8),
        };
        if width == 0 || height == 0 || stride < width * (bpp as usize / 8) {
            return Err(DisplayError::Geometry(format!(
                "inconsistent geometry {width}×{height} stride {stride} at {bpp} bpp"
            )));
        }
        Ok(FbGeometry { width, height, bits_per_pixel: bpp, stride })
    }

    /// Read geometry for `/dev/fbN` from `/sys/class/graphics/fbN`.
    pub fn from_sysfs(device: &Path) -> Result<Self, DisplayError> {
        let name = device.file_name().ok_or_else(|| {
            DisplayError::Geometry(format!("no device name in {}", device.display()))
        })?;
        let dir = Path::new("/sys/class/graphics").join(name);
        let read = |attr: &str| {
            let path = dir.join(attr);
            fs::read_to_string(&path).map_err(|source| DisplayError::Io { path, source })
        };
        let size = read("virtual_size")?;
        let bpp = read("bits_per_pixel")?;
        let stride = read("stride").ok();
        Self::parse(&size, &bpp, stride.as_deref())
    }

    pub fn len(&self) -> usize {
        self.stride * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pack `frame` into `dst` laid out as `geom`, clipping to the screen.
pub fn write_frame(dst: &mut [u8], geom: &FbGeometry, frame: &RgbImage) {
    let rows = frame.height().min(geom.height);
    let cols = frame.width().min(geom.width);
    for y in 0..rows {
        let src = &frame.row(y)[..cols * 3];
        let line = &mut dst[y * geom.stride..];
        match geom.bits_per_pixel {
            32 => {
                for (out, px) in line.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                    out.copy_from_slice(&pack_xrgb8888([px[0], px[1], px[2]]));
                }
            }
            _ => {
                for (out, px) in line.chunks_exact_mut(2).zip(src.chunks_exact(3)) {
                    out.copy_from_slice(&pack_rgb565([px[0], px[1], px[2]]));
                }
            }
        }
    }
}

/// A memory-mapped `/dev/fbN`.
pub struct Framebuffer {
    map: MmapMut,
    geometry: FbGeometry,
}

impl Framebuffer {
    pub fn open(path: &Path) -> Result<Self, DisplayError> {
        let geometry = FbGeometry::from_sysfs(path)?;
        let io_err = |source| DisplayError::Io { path: path.to_path_buf(), source };
        let file = OpenOptions::new().read(true).write(true).open(path).map_err(io_err)?;
        // SAFETY: the framebuffer device is a fixed-size mapping that no
        // other part of this process aliases.
        let map = unsafe { MmapOptions::new().len(geometry.len()).map_mut(&file) }.map_err(io_err)?;
        info!(
            "framebuffer {} {}×{} at {} bpp, stride {}",
            path.display(),
            geometry.width,
            geometry.height,
            geometry.bits_per_pixel,
            geometry.stride
        );
        Ok(Framebuffer { map, geometry })
    }
}

impl FrameSink for Framebuffer {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        write_frame(&mut self.map, &self.geometry, frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geometry() {
        let g = FbGeometry::parse("1920,1080\n", "32\n", Some("7680\n")).unwrap();
        assert_eq!(g, FbGeometry { width: 1920, height: 1080, bits_per_pixel: 32, stride: 7680 });
        let g = FbGeometry::parse("800,480", "16", None).unwrap();
        assert_eq!(g.stride, 1600);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            FbGeometry::parse("1920x1080", "32", None),
            Err(DisplayError::Geometry(_))
        ));
        assert!(matches!(
            FbGeometry::parse("1920,1080", "24", None),
            Err(DisplayError::UnsupportedDepth(24))
        ));
        assert!(FbGeometry::parse("1920,1080", "32", Some("100")).is_err());
    }

    #[test]
    fn test_write_frame_32bpp_clips_and_respects_stride() {
        let geom = FbGeometry { width: 4, height: 2, bits_per_pixel: 32, stride: 20 };
        let mut dst = vec![0xAAu8; geom.len()];
        let frame = RgbImage::from_fn(6, 3, |x, y| [x as u8, y as u8, 9]);
        write_frame(&mut dst, &geom, &frame);
        // Pixel (3, 1): B G R X.
        assert_eq!(&dst[20 + 12..20 + 16], &[9, 1, 3, 0xff]);
        // Row padding untouched.
        assert_eq!(dst[16], 0xAA);
    }

    #[test]
    fn test_write_frame_16bpp_small_frame() {
        let geom = FbGeometry { width: 4, height: 4, bits_per_pixel: 16, stride: 8 };
        let mut dst = vec![0u8; geom.len()];
        let frame = RgbImage::from_fn(2, 2, |_, _| [255, 255, 255]);
        write_frame(&mut dst, &geom, &frame);
        assert_eq!(&dst[0..2], &[0xff, 0xff]);
        assert_eq!(&dst[4..8], &[0, 0, 0, 0]);
        assert_eq!(&dst[8 + 2..8 + 4], &[0xff, 0xff]);
    }
}
