//! Deadlines for bounded waits.

use std::time::Duration;
use tokio::time::Instant;

/// Roughly 30 years, the same horizon tokio treats as "never".
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating at a far-future instant instead of
/// overflowing for very large timeouts.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}
