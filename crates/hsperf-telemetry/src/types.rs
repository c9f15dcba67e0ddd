//! Core types for event capture.

use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One captured control event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    /// Event exactly as received, reply code included.
    pub raw: String,
}

impl EventLogEntry {
    /// Human-readable local time.
    pub fn local_time(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    /// Seconds since the epoch with microsecond precision.
    pub fn epoch(&self) -> String {
        format!(
            "{}.{:06}",
            self.timestamp.timestamp(),
            self.timestamp.timestamp_subsec_micros()
        )
    }

    /// Log lines, newline included.
    ///
    /// A multi-line event yields one physical line per reply line, each
    /// carrying the same timestamp prefix.
    pub fn to_line(&self) -> String {
        let prefix = format!("{} {}", self.local_time(), self.epoch());
        self.raw
            .lines()
            .map(|line| format!("{} {}\n", prefix, line))
            .collect()
    }
}

/// Live counters for one logger, read by the heartbeat.
#[derive(Debug, Default)]
pub struct LoggerStatus {
    connected: AtomicBool,
    events_logged: AtomicU64,
    last_event: RwLock<Option<DateTime<Utc>>>,
}

impl LoggerStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn events_logged(&self) -> u64 {
        self.events_logged.load(Ordering::SeqCst)
    }

    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.last_event.read()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn record_event(&self, timestamp: DateTime<Utc>) {
        self.events_logged.fetch_add(1, Ordering::SeqCst);
        *self.last_event.write() = Some(timestamp);
    }
}
