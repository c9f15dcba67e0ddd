//! Delay policy applied between a child's exit and its respawn.
//!
//! The default is [`NoBackoff`]: a child that exits is restarted at once,
//! however often it exits. [`ExponentialBackoff`] is opt-in.

use crate::config::duration_serde;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Decides how long a restart loop pauses before respawning.
pub trait BackoffPolicy: Send {
    /// Delay before the next spawn, given how long the last child ran.
    fn next_delay(&mut self, last_run: Duration) -> Duration;

    /// Forget accumulated failures.
    fn reset(&mut self);
}

/// Immediate, unconditional restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn next_delay(&mut self, _last_run: Duration) -> Duration {
        Duration::ZERO
    }

    fn reset(&mut self) {}
}

/// Doubling delay for children that keep exiting quickly.
///
/// A child that stayed up for at least `stable_after` counts as healthy and
/// resets the sequence.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    stable_after: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, stable_after: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: multiplier.max(1.0),
            stable_after,
            attempts: 0,
        }
    }

    fn calculate_delay(&self) -> Duration {
        let factor = self.multiplier.powi(self.attempts.min(64) as i32);
        let delay_secs = self.initial.as_secs_f64() * factor;
        Duration::try_from_secs_f64(delay_secs)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&mut self, last_run: Duration) -> Duration {
        if last_run >= self.stable_after {
            self.reset();
        }
        let delay = self.calculate_delay();
        self.attempts = self.attempts.saturating_add(1);
        debug!(attempts = self.attempts, ?delay, "Backoff delay computed");
        delay
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Serialized form of the restart policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum BackoffConfig {
    #[default]
    None,
    Exponential {
        #[serde(default = "default_initial", with = "duration_serde")]
        initial: Duration,
        #[serde(default = "default_max", with = "duration_serde")]
        max: Duration,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default = "default_stable_after", with = "duration_serde")]
        stable_after: Duration,
    },
}

impl BackoffConfig {
    pub fn build(&self) -> Box<dyn BackoffPolicy> {
        match self {
            BackoffConfig::None => Box::new(NoBackoff),
            BackoffConfig::Exponential {
                initial,
                max,
                multiplier,
                stable_after,
            } => Box::new(ExponentialBackoff::new(
                *initial,
                *max,
                *multiplier,
                *stable_after,
            )),
        }
    }
}

fn default_initial() -> Duration {
    Duration::from_secs(1)
}

fn default_max() -> Duration {
    Duration::from_secs(300)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_stable_after() -> Duration {
    Duration::from_secs(60)
}
