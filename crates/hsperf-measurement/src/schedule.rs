//! Transfer-size cycling and burst pacing for the fetching role.

use hsperf_common::{Error, Result};
use std::fmt;
use std::time::Duration;

/// One transfer-size descriptor, kept in the textual form the traffic
/// generator expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSize {
    text: String,
    bytes: u64,
}

impl TransferSize {
    /// Parse `"<number> <unit>"`, e.g. `"5 MiB"` or `"50 KiB"`.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);

        let value: u64 = number
            .parse()
            .map_err(|_| Error::config(format!("Invalid transfer size '{}'", text)))?;

        let multiplier: u64 = match unit.trim() {
            "" | "B" | "bytes" => 1,
            "KB" => 1_000,
            "KiB" => 1 << 10,
            "MB" => 1_000_000,
            "MiB" => 1 << 20,
            "GB" => 1_000_000_000,
            "GiB" => 1 << 30,
            other => {
                return Err(Error::config(format!(
                    "Unknown unit '{}' in transfer size '{}'",
                    other, text
                )))
            }
        };

        let bytes = value
            .checked_mul(multiplier)
            .filter(|b| *b > 0)
            .ok_or_else(|| Error::config(format!("Transfer size '{}' out of range", text)))?;

        Ok(Self {
            text: trimmed.to_string(),
            bytes,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl fmt::Display for TransferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Pause the fetcher takes after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Short delay between transfers of the same burst.
    Transfer(Duration),
    /// Long cooldown after the N-th transfer of a burst.
    Burst(Duration),
}

impl Pause {
    pub fn duration(&self) -> Duration {
        match self {
            Pause::Transfer(d) | Pause::Burst(d) => *d,
        }
    }
}

/// Cyclic size sequence plus the burst counter.
#[derive(Debug, Clone)]
pub struct BurstSchedule {
    sizes: Vec<TransferSize>,
    index: usize,
    burst_count: u32,
    completed_in_burst: u32,
    transfer_delay: Duration,
    burst_interval: Duration,
}

impl BurstSchedule {
    pub fn new(
        sizes: Vec<TransferSize>,
        burst_count: u32,
        transfer_delay: Duration,
        burst_interval: Duration,
    ) -> Result<Self> {
        if sizes.is_empty() {
            return Err(Error::config("transfer size schedule is empty"));
        }
        if burst_count == 0 {
            return Err(Error::config("burst count must be at least 1"));
        }
        Ok(Self {
            sizes,
            index: 0,
            burst_count,
            completed_in_burst: 0,
            transfer_delay,
            burst_interval,
        })
    }

    /// Size for the next run.
    pub fn current(&self) -> &TransferSize {
        &self.sizes[self.index]
    }

    /// Record one finished run and return the pause that follows it.
    pub fn advance(&mut self) -> Pause {
        self.index = (self.index + 1) % self.sizes.len();
        self.completed_in_burst += 1;

        if self.completed_in_burst >= self.burst_count {
            self.completed_in_burst = 0;
            Pause::Burst(self.burst_interval)
        } else {
            Pause::Transfer(self.transfer_delay)
        }
    }

    pub fn completed_in_burst(&self) -> u32 {
        self.completed_in_burst
    }
}
