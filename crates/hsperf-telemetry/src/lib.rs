//! # hsperf telemetry
//!
//! Control-event capture for the anonymity-service processes.
//!
//! For each service, a [`ControlEventLogger`] opens the service's control
//! channel, authenticates, subscribes to a fixed set of event categories and
//! appends every asynchronous event to a dedicated log file as
//!
//! ```text
//! <local time> <epoch seconds> <raw event>
//! ```
//!
//! until the shutdown signal fires.

pub mod control;
pub mod events;
pub mod output;
pub mod service;
pub mod types;

pub use control::{ControlConnection, ControlReply, ProtocolInfo};
pub use events::{EventCategory, DEFAULT_EVENTS};
pub use output::EventLogWriter;
pub use service::{ControlEventLogger, ControlLoggerConfig, LoggerHandle};
pub use types::{EventLogEntry, LoggerStatus};
