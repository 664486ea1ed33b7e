//! Save-status board — the per-field `idle → saving → {saved | error} →
//! idle` machine behind the little badge next to an editable field.
//!
//! Purely a UI annotation: the merge logic never reads it. Saved/error
//! states auto-revert to idle after a short delay; each transition bumps a
//! generation counter so an older revert timer cannot downgrade a newer
//! state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::types::FieldTarget;

/// Where a field's save currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

struct StatusSlot {
    status: SaveStatus,
    generation: u64,
}

pub struct StatusBoard {
    slots: Arc<Mutex<HashMap<FieldTarget, StatusSlot>>>,
    revert_after: Duration,
}

impl StatusBoard {
    pub fn new(revert_after: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            revert_after,
        }
    }

    /// Current status for a field. Absent means idle.
    pub fn get(&self, target: &FieldTarget) -> SaveStatus {
        self.slots
            .lock()
            .get(target)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// A write for this field is in flight.
    pub fn begin(&self, target: FieldTarget) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(target).or_insert(StatusSlot {
            status: SaveStatus::Idle,
            generation: 0,
        });
        slot.status = SaveStatus::Saving;
        slot.generation += 1;
    }

    /// The write settled. Shows saved/error, then reverts to idle after the
    /// configured delay — unless a newer transition got there first.
    ///
    /// Must be called from within a tokio runtime (spawns the revert timer).
    pub fn settle(&self, target: FieldTarget, ok: bool) {
        let generation = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(target.clone()).or_insert(StatusSlot {
                status: SaveStatus::Idle,
                generation: 0,
            });
            slot.status = if ok { SaveStatus::Saved } else { SaveStatus::Error };
            slot.generation += 1;
            slot.generation
        };

        let slots = Arc::clone(&self.slots);
        let revert_after = self.revert_after;
        tokio::spawn(async move {
            tokio::time::sleep(revert_after).await;
            let mut slots = slots.lock();
            if slots.get(&target).map(|s| s.generation) == Some(generation) {
                slots.remove(&target);
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
