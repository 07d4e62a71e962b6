//! Conversions from configured seconds to chrono durations.

use chrono::Duration;

/// Seconds as a chrono duration, saturating at [`Duration::MAX`].
pub fn saturating_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
