// signals.rs — Mailboxes between the input threads and the frame loop.
//
// Each producer gets its own mailbox and its own writer handle:
//
//   PointerProducer ─► PointerMailbox { x, y, down, available, select, reset }
//   CommandProducer ─► CommandMailbox { select, reset }
//   QuitFlag        ─► shared quit bit (command keys, Ctrl-C, the pipeline)
//
//   SignalReader    ◄─ both mailboxes + quit, owned by the frame loop
//
// Writer handles are not `Clone`, so "one writer per field" is enforced by
// ownership rather than convention. Fields are independent atomics: the
// reader may see a click edge together with a pointer position that is one
// motion event stale, and nothing depends on cross-field consistency.
//
// Request flags are a one-shot mailbox: `SignalReader::snapshot` swaps
// them back to false, so every request is observed by exactly one frame.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use crate::image::Point;

#[derive(Debug)]
struct PointerMailbox {
    x: AtomicI32,
    y: AtomicI32,
    down: AtomicBool,
    available: AtomicBool,
    select: AtomicBool,
    reset: AtomicBool,
}

#[derive(Debug, Default)]
struct CommandMailbox {
    select: AtomicBool,
    reset: AtomicBool,
}

/// Process-wide stop request. Every loop polls it once per iteration.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sole writer of the pointer mailbox.
#[derive(Debug)]
pub struct PointerProducer {
    mailbox: Arc<PointerMailbox>,
}

impl PointerProducer {
    pub fn set_position(&self, p: Point) {
        self.mailbox.x.store(p.x, Ordering::Relaxed);
        self.mailbox.y.store(p.y, Ordering::Relaxed);
    }

    pub fn set_down(&self, down: bool) {
        self.mailbox.down.store(down, Ordering::Relaxed);
    }

    pub fn set_available(&self, available: bool) {
        self.mailbox.available.store(available, Ordering::Release);
    }

    pub fn request_select(&self) {
        self.mailbox.select.store(true, Ordering::Release);
    }

    pub fn request_reset(&self) {
        self.mailbox.reset.store(true, Ordering::Release);
    }

    /// Read-only view of the same mailbox.
    pub fn view(&self) -> PointerView {
        PointerView { mailbox: Arc::clone(&self.mailbox) }
    }
}

/// Sole writer of the command mailbox; may also raise quit.
#[derive(Debug)]
pub struct CommandProducer {
    mailbox: Arc<CommandMailbox>,
    quit: QuitFlag,
}

impl CommandProducer {
    pub fn request_select(&self) {
        self.mailbox.select.store(true, Ordering::Release);
    }

    pub fn request_reset(&self) {
        self.mailbox.reset.store(true, Ordering::Release);
    }

    pub fn request_quit(&self) {
        self.quit.raise();
    }

    pub fn quit_flag(&self) -> &QuitFlag {
        &self.quit
    }
}

/// Read-only access to pointer state, for diagnostics.
#[derive(Debug, Clone)]
pub struct PointerView {
    mailbox: Arc<PointerMailbox>,
}

impl PointerView {
    pub fn position(&self) -> Point {
        Point::new(
            self.mailbox.x.load(Ordering::Relaxed),
            self.mailbox.y.load(Ordering::Relaxed),
        )
    }

    pub fn is_available(&self) -> bool {
        self.mailbox.available.load(Ordering::Acquire)
    }

    pub fn is_down(&self) -> bool {
        self.mailbox.down.load(Ordering::Relaxed)
    }
}

/// What the frame loop acts on this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalSnapshot {
    pub select: bool,
    pub reset: bool,
    pub quit: bool,
    /// Pointer position, `None` when no pointer device is available.
    pub pointer: Option<Point>,
}

/// Consumer side, owned by the frame loop.
#[derive(Debug)]
pub struct SignalReader {
    pointer: Arc<PointerMailbox>,
    command: Arc<CommandMailbox>,
    quit: QuitFlag,
}

impl SignalReader {
    /// Take this frame's snapshot, consuming pending select/reset requests
    /// from both producers. Quit is terminal and is not consumed.
    pub fn snapshot(&self) -> SignalSnapshot {
        let select = self.pointer.select.swap(false, Ordering::AcqRel)
            | self.command.select.swap(false, Ordering::AcqRel);
        let reset = self.pointer.reset.swap(false, Ordering::AcqRel)
            | self.command.reset.swap(false, Ordering::AcqRel);
        let view = self.pointer_view();
        SignalSnapshot {
            select,
            reset,
            quit: self.quit.is_raised(),
            pointer: view.is_available().then(|| view.position()),
        }
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.is_raised()
    }

    pub fn pointer_view(&self) -> PointerView {
        PointerView { mailbox: Arc::clone(&self.pointer) }
    }
}

/// All handles for one session. Destructure and hand each part to its
/// thread.
#[derive(Debug)]
pub struct ControlSignals {
    pub pointer: PointerProducer,
    pub command: CommandProducer,
    pub reader: SignalReader,
    pub quit: QuitFlag,
}

impl ControlSignals {
    /// Fresh mailboxes with the pointer parked at `start` and marked
    /// unavailable until discovery succeeds.
    pub fn new(start: Point) -> Self {
        let pointer = Arc::new(PointerMailbox {
            x: AtomicI32::new(start.x),
            y: AtomicI32::new(start.y),
            down: AtomicBool::new(false),
            available: AtomicBool::new(false),
            select: AtomicBool::new(false),
            reset: AtomicBool::new(false),
        });
        let command = Arc::new(CommandMailbox::default());
        let quit = QuitFlag::new();
        ControlSignals {
            pointer: PointerProducer { mailbox: Arc::clone(&pointer) },
            command: CommandProducer { mailbox: Arc::clone(&command), quit: quit.clone() },
            reader: SignalReader { pointer, command, quit: quit.clone() },
            quit,
        }
    }
}

/// Shorthand for `ControlSignals::new`.
pub fn channel(start: Point) -> ControlSignals {
    ControlSignals::new(start)
}
