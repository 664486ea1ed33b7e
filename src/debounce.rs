//! Debounced field save controller.
//!
//! Coalesces rapid keystrokes into one delayed write per (entity, field)
//! key. An edit updates the pending-value map immediately (screens render
//! it as the live field content) and restarts that key's timer; when the
//! timer fires, the *slot's latest* value — never a value captured at edit
//! time — is handed to the mutation protocol as a field-level write.
//!
//! Edits to different fields of the same entity run independent timers and
//! independent protocol invocations; those may settle out of order, which
//! is fine because each carries its own per-field protection entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::engine::SyncEngine;
use crate::error::MutationError;
use crate::status::StatusBoard;
use crate::types::{EntityRef, FieldTarget, MutationOutcome};

struct Slot {
    /// Bumped on every edit; a woken timer whose generation no longer
    /// matches was superseded and must not write.
    generation: u64,
    pending: Value,
    handle: JoinHandle<()>,
}

pub struct FieldSaveController {
    engine: Arc<SyncEngine>,
    status: Arc<StatusBoard>,
    slots: Arc<Mutex<HashMap<FieldTarget, Slot>>>,
    delay: Duration,
    disposed: Arc<AtomicBool>,
}

impl FieldSaveController {
    pub fn new(engine: Arc<SyncEngine>, status: Arc<StatusBoard>, delay: Duration) -> Self {
        Self {
            engine,
            status,
            slots: Arc::new(Mutex::new(HashMap::new())),
            delay,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record an edit and (re)start the timer for its key.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_edit(&self, entity: EntityRef, field: &str, value: Value) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let target = FieldTarget::new(entity, field);

        let mut slots = self.slots.lock();
        let generation = slots.get(&target).map_or(1, |s| s.generation + 1);
        if let Some(old) = slots.remove(&target) {
            old.handle.abort();
        }

        let handle = tokio::spawn(fire_after(
            self.delay,
            target.clone(),
            generation,
            Arc::clone(&self.slots),
            Arc::clone(&self.engine),
            Arc::clone(&self.status),
            Arc::clone(&self.disposed),
        ));

        slots.insert(
            target,
            Slot {
                generation,
                pending: value,
                handle,
            },
        );
    }

    /// The not-yet-written value for a key, if an edit is pending.
    pub fn pending_value(&self, target: &FieldTarget) -> Option<Value> {
        self.slots.lock().get(target).map(|s| s.pending.clone())
    }

    pub fn has_pending(&self, target: &FieldTarget) -> bool {
        self.slots.lock().contains_key(target)
    }

    /// Fire a pending edit immediately (blur/submit), skipping the rest of
    /// the quiet period. Returns `None` when nothing was pending.
    pub async fn flush(
        &self,
        target: &FieldTarget,
    ) -> Option<Result<MutationOutcome, MutationError>> {
        let value = {
            let mut slots = self.slots.lock();
            let slot = slots.remove(target)?;
            slot.handle.abort();
            slot.pending
        };
        Some(run_save(&self.engine, &self.status, target.clone(), value).await)
    }

    /// Cancel all pending timers; later edits are ignored.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let mut slots = self.slots.lock();
        for (_, slot) in slots.drain() {
            slot.handle.abort();
        }
    }
}

/// Timer body: sleep out the quiet period, then take the slot's latest
/// value — re-read at fire time, so a superseding edit (which bumped the
/// generation) wins and this timer becomes a no-op.
async fn fire_after(
    delay: Duration,
    target: FieldTarget,
    generation: u64,
    slots: Arc<Mutex<HashMap<FieldTarget, Slot>>>,
    engine: Arc<SyncEngine>,
    status: Arc<StatusBoard>,
    disposed: Arc<AtomicBool>,
) {
    tokio::time::sleep(delay).await;

    if disposed.load(Ordering::SeqCst) {
        return;
    }

    let value = {
        let mut slots = slots.lock();
        // An aborted timer can still reach here if it woke before the
        // abort landed; the generation check keeps it from acting on a
        // slot that now belongs to a newer edit.
        match slots.remove(&target) {
            Some(slot) if slot.generation == generation => slot.pending,
            Some(newer) => {
                slots.insert(target, newer);
                return;
            }
            None => return,
        }
    };

    let _ = run_save(&engine, &status, target, value).await;
}

async fn run_save(
    engine: &SyncEngine,
    status: &StatusBoard,
    target: FieldTarget,
    value: Value,
) -> Result<MutationOutcome, MutationError> {
    status.begin(target.clone());
    match engine.save_field(target.clone(), value).await {
        Ok(outcome) => {
            status.settle(target, true);
            Ok(outcome)
        }
        Err(e) => {
            warn!(key = %target.protection_key(), error = %e, "debounced save failed");
            status.settle(target, false);
            Err(e)
        }
    }
}
