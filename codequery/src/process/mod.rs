//! Child process execution.
//!
//! Async spawning with captured output, a hard deadline, and guaranteed
//! termination of processes that overrun it.

mod spawn;

pub use spawn::{spawn_process, ProcessOptions};
