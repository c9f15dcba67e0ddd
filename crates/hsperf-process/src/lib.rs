//! # hsperf process
//!
//! Low-level process lifecycle primitives for the measurement harness.
//!
//! This crate provides:
//! - Executable validation and lookup
//! - Process spawning with stdout/stderr appended to a log file
//! - Non-blocking status polling
//! - Graceful termination with a force-kill fallback
//! - Process existence checks by PID
//!
//! Nothing here parses process output; callers that need to react to
//! output lines attach an observer to the [`LogSink`].

pub mod check;
pub mod execute;
pub mod output;
pub mod terminate;
pub mod validation;

pub use check::process_exists;
pub use execute::{ChildProcess, CommandSpec, ProcessStatus};
pub use output::{LineObserver, LogSink};
pub use terminate::{force_kill, send_terminate, FORCE_KILL_TIMEOUT};
pub use validation::{resolve_executable, validate_executable};
