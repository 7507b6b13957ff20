// input/command.rs — Keyboard command aggregator.
//
// A reader thread does blocking single-byte reads and forwards them over a
// channel; the aggregator waits on that channel with a timeout so it can
// notice quit even while the reader is stuck in `read`. The reader thread
// is detached: it ends on EOF or when the process exits.

use std::io::{self, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::signals::{CommandProducer, PointerView};

/// A keyboard command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Reset,
    Select,
    /// Log the pointer position.
    Diagnostic,
}

impl Command {
    /// `q` `r` `s` `m`, either case. Everything else is ignored.
    pub fn from_byte(b: u8) -> Option<Command> {
        match b.to_ascii_lowercase() {
            b'q' => Some(Command::Quit),
            b'r' => Some(Command::Reset),
            b's' => Some(Command::Select),
            b'm' => Some(Command::Diagnostic),
            _ => None,
        }
    }
}

/// Carry out `cmd` against the mailboxes.
pub fn dispatch(cmd: Command, producer: &CommandProducer, pointer: &PointerView) {
    match cmd {
        Command::Quit => {
            info!("quit requested");
            producer.request_quit();
        }
        Command::Reset => producer.request_reset(),
        Command::Select => producer.request_select(),
        Command::Diagnostic => {
            if pointer.is_available() {
                let button = if pointer.is_down() { "down" } else { "up" };
                info!("pointer at {} (button {button})", pointer.position());
            } else {
                info!("no pointer device");
            }
        }
    }
}

/// Spawn the detached byte reader.
fn spawn_reader<R: Read + Send + 'static>(mut input: R) -> io::Result<mpsc::Receiver<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new().name("command-reader".into()).spawn(move || {
        let mut byte = [0u8; 1];
        loop {
            match input.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(byte[0]).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("command input read failed: {e}");
                    break;
                }
            }
        }
        debug!("command reader stopped");
    })?;
    Ok(rx)
}

/// Command aggregator thread body. Returns when quit is raised or the
/// input reaches EOF.
pub fn run<R: Read + Send + 'static>(
    input: R,
    producer: CommandProducer,
    pointer: PointerView,
    poll: Duration,
) {
    let rx = match spawn_reader(input) {
        Ok(rx) => rx,
        Err(e) => {
            warn!("could not start command reader: {e}");
            return;
        }
    };
    info!("commands: s=select r=reset m=pointer q=quit");

    while !producer.quit_flag().is_raised() {
        match rx.recv_timeout(poll) {
            Ok(b) => {
                if let Some(cmd) = Command::from_byte(b) {
                    debug!("command {cmd:?}");
                    dispatch(cmd, &producer, &pointer);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("command input closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Point;
    use crate::signals::ControlSignals;

    #[test]
    fn test_key_mapping() {
        assert_eq!(Command::from_byte(b'q'), Some(Command::Quit));
        assert_eq!(Command::from_byte(b'Q'), Some(Command::Quit));
        assert_eq!(Command::from_byte(b'R'), Some(Command::Reset));
        assert_eq!(Command::from_byte(b's'), Some(Command::Select));
        assert_eq!(Command::from_byte(b'M'), Some(Command::Diagnostic));
        assert_eq!(Command::from_byte(b'\n'), None);
        assert_eq!(Command::from_byte(b'x'), None);
    }

    #[test]
    fn test_run_processes_input_until_eof() {
        let ControlSignals { pointer, command, reader, .. } = ControlSignals::new(Point::default());
        let input = io::Cursor::new(b"s\nm\nr\n".to_vec());
        run(input, command, pointer.view(), Duration::from_millis(5));
        let snap = reader.snapshot();
        assert!(snap.select && snap.reset);
        assert!(!snap.quit);
    }

    #[test]
    fn test_run_stops_on_quit_key() {
        let ControlSignals { pointer, command, reader, .. } = ControlSignals::new(Point::default());
        run(io::Cursor::new(b"xq".to_vec()), command, pointer.view(), Duration::from_millis(5));
        assert!(reader.quit_requested());
    }

    #[test]
    fn test_run_observes_external_quit_while_reader_blocks() {
        struct Blocking;
        impl Read for Blocking {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                thread::sleep(Duration::from_secs(3600));
                Ok(0)
            }
        }
        let ControlSignals { pointer, command, quit, .. } = ControlSignals::new(Point::default());
        let view = pointer.view();
        let handle = thread::spawn(move || run(Blocking, command, view, Duration::from_millis(5)));
        thread::sleep(Duration::from_millis(20));
        quit.raise();
        handle.join().unwrap();
    }
}
