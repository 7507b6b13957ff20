// input/mod.rs — The two control-signal producers.
//
//   pointer  evdev mouse → position, select (left), reset (right)
//   command  stdin keys  → select, reset, quit, pointer diagnostic

pub mod command;
pub mod pointer;
