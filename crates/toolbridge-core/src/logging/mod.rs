//! Runtime-agnostic logging
//!
//! Components take an `Arc<dyn Logger>` and prefix their messages with
//! `[Component]`, e.g. `[SessionPool]` or `[stdio]`.

mod traits;
mod noop;
mod console;
mod memory;

pub use traits::{Logger, LogLevel, SharedLogger};
pub use noop::NoOpLogger;
pub use console::ConsoleLogger;
pub use memory::{LogEntry, MemoryLogger};
