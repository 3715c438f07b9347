//! Wall-clock helpers for message timestamping.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as integer milliseconds since the
/// Unix epoch.
///
/// Saturates instead of panicking on a clock set before the epoch (returns
/// 0) or absurdly far in the future (returns `u64::MAX`).
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
