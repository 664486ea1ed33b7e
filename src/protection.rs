//! Mutation Protection Registry — a time-windowed overlay recording
//! "this entity/field was just changed locally to value V".
//!
//! Every merge of freshly fetched data consults the registry; a live entry
//! always wins over the fetched value for the same key. This is what
//! defeats the race between "user toggles a box" and "the poller's
//! response for the pre-toggle state arrives a moment later".
//!
//! Entries self-clean: `get` evicts anything older than the window, so no
//! separate sweep task exists. All methods take `&self` (interior
//! mutability via `parking_lot::Mutex`); the lock is never held across
//! `.await` or callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::clock::Clock;
use crate::types::ProtectionKey;

/// One recorded local write: the value and when it was recorded.
#[derive(Debug, Clone)]
struct ProtectionEntry {
    value: Value,
    recorded_at: DateTime<Utc>,
}

/// Time-boxed override map consulted on every merge.
pub struct ProtectionRegistry {
    entries: Mutex<HashMap<ProtectionKey, ProtectionEntry>>,
    window: ChronoDuration,
    clock: Arc<dyn Clock>,
}

impl ProtectionRegistry {
    pub fn new(window: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window: ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX),
            clock,
        }
    }

    /// Insert or overwrite the entry for `key` with the current time.
    /// Idempotent; no error conditions. The most recent `record` wins.
    pub fn record(&self, key: ProtectionKey, value: Value) {
        let entry = ProtectionEntry {
            value,
            recorded_at: self.clock.now(),
        };
        self.entries.lock().insert(key, entry);
    }

    /// The live value for `key`, if any.
    ///
    /// An entry older than the window is evicted on the spot and `None` is
    /// returned — callers probing on every merge keep the map clean.
    pub fn get(&self, key: &ProtectionKey) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now - entry.recorded_at <= self.window => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove the entry outright. Used on mutation failure, so the rollback
    /// is not itself masked by the entry it would contradict.
    pub fn clear(&self, key: &ProtectionKey) {
        self.entries.lock().remove(key);
    }

    /// Drop every entry (user-initiated discard of all pending intent).
    pub fn clear_all(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries currently held, live or not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
