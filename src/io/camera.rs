// io/camera.rs — V4L2 capture via memory-mapped buffers.
//
// The requested format is a request, not a guarantee: the driver answers
// with what it will actually deliver, and frames are decoded according to
// that answer. Anything other than YUYV or RGB3 is refused at open time.

use log::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::config::{CameraConfig, CameraFormat};
use crate::convert::{rgb24_to_rgb, yuyv_to_rgb};
use crate::error::CaptureError;
use crate::image::RgbImage;
use crate::pipeline::FrameSource;

const BUFFER_COUNT: u32 = 4;

impl CameraFormat {
    pub fn fourcc(self) -> FourCC {
        match self {
            CameraFormat::Yuyv => FourCC::new(b"YUYV"),
            CameraFormat::Rgb24 => FourCC::new(b"RGB3"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(CameraFormat::Yuyv),
            b"RGB3" => Some(CameraFormat::Rgb24),
            _ => None,
        }
    }
}

/// A V4L2 camera producing RGB frames.
///
/// `stream` is declared before `_device` so buffers are unmapped before
/// the device handle closes.
pub struct V4lCamera {
    stream: MmapStream<'static>,
    format: CameraFormat,
    width: usize,
    height: usize,
    _device: Device,
}

impl V4lCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        let device = Device::with_path(&config.device_path)?;

        let mut format = device.format()?;
        format.width = config.width as u32;
        format.height = config.height as u32;
        format.fourcc = config.format.fourcc();
        let actual = device.set_format(&format)?;

        let negotiated = CameraFormat::from_fourcc(actual.fourcc)
            .ok_or_else(|| CaptureError::UnsupportedFormat(actual.fourcc.to_string()))?;
        if negotiated != config.format {
            warn!("camera gave {} instead of {}", actual.fourcc, format.fourcc);
        }
        if (actual.width, actual.height) != (format.width, format.height) {
            warn!(
                "camera gave {}×{} instead of {}×{}",
                actual.width, actual.height, format.width, format.height
            );
        }

        if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
            warn!("could not set {} fps: {e}", config.fps);
        }

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;
        // A stalled camera surfaces as a timed-out dequeue instead of a hang.
        stream.set_timeout(config.timeout);
        info!(
            "camera {} streaming {}×{} {} at {} fps",
            config.device_path, actual.width, actual.height, actual.fourcc, config.fps
        );

        Ok(V4lCamera {
            stream,
            format: negotiated,
            width: actual.width as usize,
            height: actual.height as usize,
            _device: device,
        })
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl FrameSource for V4lCamera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let (buf, meta) = self.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Ok(None);
        }
        let data = &buf[..used];
        let frame = match self.format {
            CameraFormat::Yuyv => yuyv_to_rgb(data, self.width, self.height),
            CameraFormat::Rgb24 => rgb24_to_rgb(data, self.width, self.height),
        };
        if frame.is_none() {
            debug!("short frame: {used} bytes for {}×{}", self.width, self.height);
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping() {
        for f in [CameraFormat::Yuyv, CameraFormat::Rgb24] {
            assert_eq!(CameraFormat::from_fourcc(f.fourcc()), Some(f));
        }
        assert_eq!(CameraFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }
}
