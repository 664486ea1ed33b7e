//! Tunable constants for the sync core.
//!
//! None of these are protocol-level guarantees. The one constraint worth
//! keeping: the protection window must exceed a plausible server round-trip
//! plus a few poll cycles, or a slow PATCH can outlive its own protection.

use std::time::Duration;

use chrono::FixedOffset;

/// Background refresh cadence while the view is visible.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Quiet period before a field edit is written out.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(600);

/// How long a protection entry overrides fetched data.
pub const DEFAULT_PROTECTION_WINDOW: Duration = Duration::from_secs(60);

/// How long a saved/error badge lingers before reverting to idle.
pub const DEFAULT_STATUS_REVERT: Duration = Duration::from_millis(2500);

/// Configuration for the sync core. `Default` gives production values;
/// tests shrink the timers.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    pub debounce_delay: Duration,
    pub protection_window: Duration,
    pub status_revert: Duration,
    /// Fixed clinic offset used for the "today" bucket key. Shared with the
    /// server; deliberately not the device-local timezone.
    pub clinic_offset: FixedOffset,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            protection_window: DEFAULT_PROTECTION_WINDOW,
            status_revert: DEFAULT_STATUS_REVERT,
            clinic_offset: FixedOffset::west_opt(5 * 3600).expect("static offset"),
        }
    }
}
