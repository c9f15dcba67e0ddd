//! Append-only event log.

use crate::types::EventLogEntry;
use chrono::{DateTime, Duration, Utc};
use hsperf_common::{Error, Result, Role};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes [`EventLogEntry`] lines to one file per monitored service.
///
/// Timestamps are strictly increasing across entries: when the clock has
/// not advanced (or went backwards) since the previous entry, the new entry
/// is stamped one microsecond after it.
pub struct EventLogWriter {
    role: Role,
    path: PathBuf,
    writer: BufWriter<File>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl EventLogWriter {
    /// Open `path` for appending, creating parent directories.
    pub fn open(role: Role, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::channel(
                    role,
                    format!("Failed to create log directory {}: {}", parent.display(), e),
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                Error::channel(
                    role,
                    format!("Failed to open event log {}: {}", path.display(), e),
                )
            })?;

        Ok(Self {
            role,
            path,
            writer: BufWriter::new(file),
            last_timestamp: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `raw` with the current time and append it.
    pub fn append(&mut self, raw: &str) -> Result<EventLogEntry> {
        self.append_at(Utc::now(), raw)
    }

    pub(crate) fn append_at(&mut self, now: DateTime<Utc>, raw: &str) -> Result<EventLogEntry> {
        let timestamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        let entry = EventLogEntry {
            timestamp,
            raw: raw.to_string(),
        };

        self.writer.write_all(entry.to_line().as_bytes())?;
        self.writer.flush()?;
        Ok(entry)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| {
            Error::channel(
                self.role,
                format!("Failed to flush event log {}: {}", self.path.display(), e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epochs(path: &Path) -> Vec<(i64, u32)> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| {
                let epoch = line.split(' ').nth(2).unwrap();
                let (secs, micros) = epoch.split_once('.').unwrap();
                (secs.parse().unwrap(), micros.parse().unwrap())
            })
            .collect()
    }

    #[test]
    fn test_timestamps_strictly_increase_on_clock_ties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server/tor/torctl.log");
        let mut writer = EventLogWriter::open(Role::ServerControl, &path).unwrap();

        let now = Utc::now();
        writer.append_at(now, "650 BW 0 0").unwrap();
        writer.append_at(now, "650 BW 1 1").unwrap();
        writer.append_at(now - Duration::seconds(1), "650 BW 2 2").unwrap();
        writer.append("650 BW 3 3").unwrap();

        let epochs = epochs(&path);
        assert_eq!(epochs.len(), 4);
        assert!(epochs.windows(2).all(|w| w[0] < w[1]), "{:?}", epochs);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torctl.log");

        EventLogWriter::open(Role::ClientControl, &path)
            .unwrap()
            .append("650 CIRC 1 LAUNCHED")
            .unwrap();
        EventLogWriter::open(Role::ClientControl, &path)
            .unwrap()
            .append("650 CIRC 1 BUILT")
            .unwrap();

        let log = std::fs::read_to_string(&path).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.lines().next().unwrap().ends_with("650 CIRC 1 LAUNCHED"));
    }
}
