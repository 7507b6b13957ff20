// input/pointer.rs — Raw mouse aggregator.
//
// Discovery walks a fixed candidate list and takes the first node that
// reports relative X motion and a primary button. The device is grabbed so
// the console does not see the events, switched to non-blocking reads, and
// polled with a short sleep whenever nothing is pending.
//
// Event handling is split from the device: `PointerState::apply` turns
// `PointerEvent`s into position updates and click edges, and `translate`
// maps evdev events onto `PointerEvent`. Only the loop touches the device.

use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;

use evdev::{Device, InputEvent, InputEventKind, Key, RelativeAxisType};
use log::{debug, info, warn};

use crate::config::PointerConfig;
use crate::error::InputError;
use crate::image::Point;
use crate::signals::{PointerProducer, QuitFlag};

/// Mouse buttons the tracker cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Primary,
    Secondary,
}

/// Device-independent pointer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Motion { dx: i32, dy: i32 },
    Button { button: Button, pressed: bool },
}

/// Requests raised by button edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Select,
    Reset,
}

/// Accumulated pointer position and button state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerState {
    position: Point,
    width: i32,
    height: i32,
    primary_down: bool,
    secondary_down: bool,
}

impl PointerState {
    pub fn new(start: Point, width: i32, height: i32) -> Self {
        let mut state = PointerState {
            position: start,
            width,
            height,
            primary_down: false,
            secondary_down: false,
        };
        state.position = state.clamp(start);
        state
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn primary_down(&self) -> bool {
        self.primary_down
    }

    fn clamp(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(0, (self.width - 1).max(0)),
            p.y.clamp(0, (self.height - 1).max(0)),
        )
    }

    /// Apply one event. Returns an action only on a press edge; holding a
    /// button (autorepeat) or releasing it returns `None`.
    pub fn apply(&mut self, event: PointerEvent) -> Option<PointerAction> {
        match event {
            PointerEvent::Motion { dx, dy } => {
                self.position = self.clamp(self.position.offset(dx, dy));
                None
            }
            PointerEvent::Button { button: Button::Primary, pressed } => {
                let edge = pressed && !self.primary_down;
                self.primary_down = pressed;
                edge.then_some(PointerAction::Select)
            }
            PointerEvent::Button { button: Button::Secondary, pressed } => {
                let edge = pressed && !self.secondary_down;
                self.secondary_down = pressed;
                edge.then_some(PointerAction::Reset)
            }
        }
    }
}

/// Map an evdev event onto a `PointerEvent`. Key value 0 is release,
/// 1 press, 2 autorepeat (treated as still pressed).
pub fn translate(ev: &InputEvent) -> Option<PointerEvent> {
    match ev.kind() {
        InputEventKind::RelAxis(RelativeAxisType::REL_X) => {
            Some(PointerEvent::Motion { dx: ev.value(), dy: 0 })
        }
        InputEventKind::RelAxis(RelativeAxisType::REL_Y) => {
            Some(PointerEvent::Motion { dx: 0, dy: ev.value() })
        }
        InputEventKind::Key(Key::BTN_LEFT) => Some(PointerEvent::Button {
            button: Button::Primary,
            pressed: ev.value() != 0,
        }),
        InputEventKind::Key(Key::BTN_RIGHT) => Some(PointerEvent::Button {
            button: Button::Secondary,
            pressed: ev.value() != 0,
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Device discovery
// ---------------------------------------------------------------------------

fn is_pointer(device: &Device) -> bool {
    let has_rel_x = device
        .supported_relative_axes()
        .is_some_and(|axes| axes.contains(RelativeAxisType::REL_X));
    let has_primary = device
        .supported_keys()
        .is_some_and(|keys| keys.contains(Key::BTN_LEFT));
    has_rel_x && has_primary
}

/// Log every input device the kernel exposes.
fn log_inventory() {
    for (path, device) in evdev::enumerate() {
        debug!("input device {}: {}", path.display(), device.name().unwrap_or("<unnamed>"));
    }
}

/// First candidate that opens and looks like a mouse.
pub fn discover(candidates: &[PathBuf]) -> Result<(PathBuf, Device), InputError> {
    log_inventory();
    for path in candidates {
        match Device::open(path) {
            Ok(device) if is_pointer(&device) => {
                info!(
                    "pointer device {} ({})",
                    path.display(),
                    device.name().unwrap_or("<unnamed>")
                );
                return Ok((path.clone(), device));
            }
            Ok(_) => debug!("{} is not a pointer device", path.display()),
            Err(e) => debug!("{}: {e}", path.display()),
        }
    }
    Err(InputError::NoPointerDevice { tried: candidates.len() })
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: `fd` is owned by `device` and stays open for both calls.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn open_grabbed(path: &Path, mut device: Device) -> io::Result<Device> {
    if let Err(e) = device.grab() {
        warn!("could not grab {}: {e}; events will also reach the console", path.display());
    }
    set_nonblocking(&device)?;
    Ok(device)
}

// ---------------------------------------------------------------------------
// Aggregator loop
// ---------------------------------------------------------------------------

/// Pointer aggregator thread body. Returns when quit is raised, when no
/// device is found, or when the device goes away.
pub fn run(config: PointerConfig, producer: PointerProducer, quit: QuitFlag) {
    let (path, device) = match discover(&config.candidates) {
        Ok(found) => found,
        Err(e) => {
            warn!("{e}; continuing with keyboard commands only");
            producer.set_available(false);
            return;
        }
    };
    let mut device = match open_grabbed(&path, device) {
        Ok(d) => d,
        Err(e) => {
            warn!("pointer device {} unusable: {e}", path.display());
            producer.set_available(false);
            return;
        }
    };

    let mut state = PointerState::new(config.start, config.display_width, config.display_height);
    producer.set_position(state.position());
    producer.set_available(true);

    while !quit.is_raised() {
        match device.fetch_events() {
            Ok(events) => {
                for ev in events {
                    let Some(event) = translate(&ev) else { continue };
                    match state.apply(event) {
                        Some(PointerAction::Select) => {
                            // Position first: the frame loop reads it with the request.
                            producer.set_position(state.position());
                            info!("select at {}", state.position());
                            producer.request_select();
                        }
                        Some(PointerAction::Reset) => producer.request_reset(),
                        None => {}
                    }
                }
                producer.set_position(state.position());
                producer.set_down(state.primary_down());
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(config.idle_backoff),
            Err(e) => {
                warn!("pointer device {} read failed: {e}", path.display());
                producer.set_available(false);
                break;
            }
        }
    }
    debug!("pointer aggregator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    fn state() -> PointerState {
        PointerState::new(Point::new(320, 240), 1920, 1080)
    }

    #[test]
    fn test_motion_accumulates_and_clamps() {
        let mut s = state();
        s.apply(PointerEvent::Motion { dx: 15, dy: -5 });
        assert_eq!(s.position(), Point::new(335, 235));
        s.apply(PointerEvent::Motion { dx: -5000, dy: 0 });
        assert_eq!(s.position().x, 0);
        s.apply(PointerEvent::Motion { dx: 99999, dy: 99999 });
        assert_eq!(s.position(), Point::new(1919, 1079));
    }

    #[test]
    fn test_start_is_clamped() {
        let s = PointerState::new(Point::new(-10, 5000), 640, 480);
        assert_eq!(s.position(), Point::new(0, 479));
    }

    #[test]
    fn test_press_edges_only() {
        let mut s = state();
        let press = PointerEvent::Button { button: Button::Primary, pressed: true };
        let release = PointerEvent::Button { button: Button::Primary, pressed: false };
        assert_eq!(s.apply(press), Some(PointerAction::Select));
        // Autorepeat while held.
        assert_eq!(s.apply(press), None);
        assert!(s.primary_down());
        assert_eq!(s.apply(release), None);
        assert_eq!(s.apply(press), Some(PointerAction::Select));
    }

    #[test]
    fn test_secondary_resets() {
        let mut s = state();
        let ev = PointerEvent::Button { button: Button::Secondary, pressed: true };
        assert_eq!(s.apply(ev), Some(PointerAction::Reset));
        assert!(!s.primary_down());
    }

    #[test]
    fn test_translate() {
        let rel_x = InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, 7);
        assert_eq!(translate(&rel_x), Some(PointerEvent::Motion { dx: 7, dy: 0 }));
        let rel_y = InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, -3);
        assert_eq!(translate(&rel_y), Some(PointerEvent::Motion { dx: 0, dy: -3 }));
        let repeat = InputEvent::new(EventType::KEY, Key::BTN_LEFT.code(), 2);
        assert_eq!(
            translate(&repeat),
            Some(PointerEvent::Button { button: Button::Primary, pressed: true })
        );
        let wheel = InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_WHEEL.0, 1);
        assert_eq!(translate(&wheel), None);
    }

    #[test]
    fn test_discover_with_no_candidates() {
        let result = discover(&[PathBuf::from("/nonexistent/event99")]);
        assert!(matches!(result, Err(InputError::NoPointerDevice { tried: 1 })));
    }
}
