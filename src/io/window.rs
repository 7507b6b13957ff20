// io/window.rs — Desktop window sink for development hosts.

use minifb::{Key, Window, WindowOptions};

use crate::convert::rgb_to_0rgb;
use crate::error::DisplayError;
use crate::image::RgbImage;
use crate::pipeline::FrameSink;
use crate::signals::QuitFlag;

/// Presents frames in a `minifb` window. Closing the window or pressing
/// Escape raises quit.
pub struct WindowSink {
    window: Window,
    buffer: Vec<u32>,
    quit: QuitFlag,
}

impl WindowSink {
    pub fn open(
        title: &str,
        width: usize,
        height: usize,
        quit: QuitFlag,
    ) -> Result<Self, DisplayError> {
        let options = WindowOptions { resize: true, ..WindowOptions::default() };
        let window = Window::new(title, width, height, options)?;
        Ok(WindowSink { window, buffer: Vec::with_capacity(width * height), quit })
    }
}

impl FrameSink for WindowSink {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            self.quit.raise();
            return Ok(());
        }
        rgb_to_0rgb(frame, &mut self.buffer);
        self.window.update_with_buffer(&self.buffer, frame.width(), frame.height())?;
        Ok(())
    }
}
