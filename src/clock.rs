//! Injectable clock.
//!
//! Protection-window expiry and the "today" bucket key both depend on the
//! current time; routing every read through a `Clock` lets tests advance
//! time deterministically instead of sleeping through real windows.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The current date in the given fixed clinic offset — the bucket key
    /// counter writes target. Must match the rule the server applies.
    fn today(&self, offset: &FixedOffset) -> NaiveDate {
        self.now().with_timezone(offset).date_naive()
    }
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
