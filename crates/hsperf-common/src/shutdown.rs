//! Process-wide cancellation signal.
//!
//! The signal starts unset and is set once, by the orchestrator, when the
//! run is interrupted. Every loop in the harness waits on it with a bound
//! instead of sleeping unconditionally, so a shutdown request is observed
//! within one wait interval.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Broadcast shutdown flag. Cloning yields another observer of the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter. Idempotent.
    pub fn signal_shutdown(&self) {
        self.token.cancel();
    }

    /// Non-blocking check.
    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait up to `timeout`; true iff the flag was or became set.
    pub async fn wait_or_timeout(&self, timeout: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(timeout) => self.is_set(),
        }
    }

    /// Wait until the flag is set.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Drive `future` to completion unless the flag is set first.
    pub async fn run_until<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            output = future => Some(output),
        }
    }
}
