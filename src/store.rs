//! WardStore — the cache layer.
//!
//! Owns one Collection Snapshot per logical collection. Snapshots are
//! replaced wholesale (clone, mutate, store back) on every successful fetch
//! or patch; nothing mutates a published snapshot in place.
//!
//! Every fetched snapshot passes through the protection-registry merge
//! before it may overwrite the cache — this is the only path by which
//! network data reaches the cache, uniformly for polls, focus refreshes,
//! and manual refreshes.
//!
//! # Locking
//! One `parking_lot::Mutex` over all collection state. The guard is never
//! held while a change listener runs; events are emitted after release.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::protection::ProtectionRegistry;
use crate::reactive::{ChangeEvent, EventEmitter};
use crate::types::{Collection, EntityRef, ProtectionKey};

/// An owned one-shot closure that removes a subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

// ============================================================================
// Internal state
// ============================================================================

#[derive(Default)]
struct CollectionState {
    records: Vec<Value>,
    /// Bumped by every mutation; a fetch that started under an older epoch
    /// is discarded when its result arrives.
    epoch: u64,
}

#[derive(Default)]
struct StoreState {
    patients: CollectionState,
    general_tasks: CollectionState,
    activity: CollectionState,
    stats: CollectionState,
}

impl StoreState {
    fn slot(&mut self, collection: Collection) -> &mut CollectionState {
        match collection {
            Collection::Patients => &mut self.patients,
            Collection::GeneralTasks => &mut self.general_tasks,
            Collection::Activity => &mut self.activity,
            Collection::Stats => &mut self.stats,
        }
    }

    fn slot_ref(&self, collection: Collection) -> &CollectionState {
        match collection {
            Collection::Patients => &self.patients,
            Collection::GeneralTasks => &self.general_tasks,
            Collection::Activity => &self.activity,
            Collection::Stats => &self.stats,
        }
    }
}

// ============================================================================
// WardStore
// ============================================================================

pub struct WardStore {
    state: Mutex<StoreState>,
    registry: Arc<ProtectionRegistry>,
    emitter: Arc<EventEmitter<ChangeEvent>>,
}

impl WardStore {
    pub fn new(registry: Arc<ProtectionRegistry>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            registry,
            emitter: Arc::new(EventEmitter::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The current snapshot of a collection.
    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.state.lock().slot_ref(collection).records.clone()
    }

    /// One record by its `"id"` field.
    pub fn find_record(&self, collection: Collection, id: &str) -> Option<Value> {
        self.state
            .lock()
            .slot_ref(collection)
            .records
            .iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
    }

    /// One task record inside a patient's checklist.
    pub fn find_task(&self, patient_id: &str, task_id: &str) -> Option<Value> {
        let state = self.state.lock();
        let patient = state
            .patients
            .records
            .iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(patient_id))?;
        patient
            .get("tasks")
            .and_then(Value::as_array)?
            .iter()
            .find(|t| t.get("id").and_then(Value::as_str) == Some(task_id))
            .cloned()
    }

    /// Current value of a same-day activity counter. A missing entry or
    /// missing field reads as zero.
    pub fn counter_value(&self, date: NaiveDate, field: &str) -> i64 {
        let date_str = date.to_string();
        let state = self.state.lock();
        state
            .activity
            .records
            .iter()
            .find(|r| r.get("date").and_then(Value::as_str) == Some(date_str.as_str()))
            .and_then(|r| r.get(field))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Fetch path
    // -----------------------------------------------------------------------

    /// Record the epoch a fetch starts under. Pass it back to
    /// [`apply_fetched`] when the result arrives.
    pub fn begin_fetch(&self, collection: Collection) -> u64 {
        self.state.lock().slot_ref(collection).epoch
    }

    /// Bump the collection's epoch so any in-flight fetch result is
    /// discarded on arrival.
    pub fn invalidate_inflight(&self, collection: Collection) {
        self.state.lock().slot(collection).epoch += 1;
    }

    /// Merge a fetch result with the protection registry and replace the
    /// snapshot. Returns `false` (and leaves the cache untouched) when the
    /// epoch moved since the fetch started.
    pub fn apply_fetched(
        &self,
        collection: Collection,
        records: Vec<Value>,
        started_epoch: u64,
    ) -> bool {
        let merged = self.merge_with_registry(collection, records);

        {
            let mut state = self.state.lock();
            let slot = state.slot(collection);
            if slot.epoch != started_epoch {
                debug!(collection = %collection, "discarding stale fetch result");
                return false;
            }
            slot.records = merged;
        }

        self.emit(ChangeEvent::Refreshed { collection });
        true
    }

    // -----------------------------------------------------------------------
    // Patch path
    // -----------------------------------------------------------------------

    /// Take the rollback snapshot for a collection.
    pub fn snapshot(&self, collection: Collection) -> Vec<Value> {
        self.records(collection)
    }

    /// Restore a previously taken snapshot (mutation failure path).
    pub fn restore(&self, collection: Collection, snapshot: Vec<Value>) {
        {
            let mut state = self.state.lock();
            state.slot(collection).records = snapshot;
        }
        self.emit(ChangeEvent::RolledBack { collection });
    }

    /// Merge `patch`'s fields into the addressed entity and republish the
    /// snapshot. An activity patch for an unseen date inserts a fresh
    /// entry. A missing target elsewhere is a no-op (the record can only
    /// have vanished via a fetch that raced ahead; protection still covers
    /// the field).
    ///
    /// The patched record is re-overlaid with the registry afterwards, so a
    /// confirmed record for one field cannot clobber a sibling field whose
    /// own protection entry is still live.
    pub fn patch_entity(&self, target: &EntityRef, patch: &Value) {
        let collection = target.collection();

        {
            let mut state = self.state.lock();
            let records = &mut state.slot(collection).records;

            match target {
                EntityRef::Patient { id } => {
                    if let Some(rec) = find_by_id(records, id) {
                        merge_object(rec, patch);
                        self.overlay_record(collection, rec);
                    }
                }
                EntityRef::PatientTask {
                    patient_id,
                    task_id,
                } => {
                    if let Some(task) = find_task_mut(records, patient_id, task_id) {
                        merge_object(task, patch);
                        overlay_fields(&self.registry, task, &["id"], |field| {
                            ProtectionKey::task(task_id, field)
                        });
                    }
                }
                EntityRef::GeneralTask { id } => {
                    if let Some(rec) = find_by_id(records, id) {
                        merge_object(rec, patch);
                        self.overlay_record(collection, rec);
                    }
                }
                EntityRef::Activity { date } => {
                    let date_str = date.to_string();
                    let idx = records
                        .iter()
                        .position(|r| r.get("date").and_then(Value::as_str) == Some(date_str.as_str()));
                    match idx {
                        Some(i) => {
                            let rec = &mut records[i];
                            merge_object(rec, patch);
                            self.overlay_record(collection, rec);
                        }
                        None => {
                            let mut fresh = serde_json::json!({ "date": date_str });
                            merge_object(&mut fresh, patch);
                            records.push(fresh);
                        }
                    }
                }
            }
        }

        self.emit(ChangeEvent::Patched { collection });
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Register a change listener. Returns an [`Unsubscribe`] closure.
    pub fn on_change(&self, callback: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Unsubscribe {
        let id = self.emitter.on(callback);
        let emitter = Arc::clone(&self.emitter);
        Box::new(move || {
            emitter.off(id);
        })
    }

    /// Emit outside the state lock; listener panics are isolated so a
    /// misbehaving subscriber cannot wedge the merge path.
    fn emit(&self, event: ChangeEvent) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.emitter.emit(&event);
        }));
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Overlay live protection entries onto fetched records. For patients
    /// this walks the nested task checklists too. Stats are read-only and
    /// pass through untouched.
    fn merge_with_registry(&self, collection: Collection, mut records: Vec<Value>) -> Vec<Value> {
        match collection {
            Collection::Stats => {}
            _ => {
                for record in &mut records {
                    self.overlay_record(collection, record);
                }
            }
        }
        records
    }

    /// Overlay one record (and, for patients, its nested tasks).
    fn overlay_record(&self, collection: Collection, record: &mut Value) {
        match collection {
            Collection::Patients => {
                let Some(id) = record.get("id").and_then(Value::as_str).map(String::from) else {
                    return;
                };
                overlay_fields(&self.registry, record, &["id", "tasks"], |field| {
                    ProtectionKey::patient(&id, field)
                });

                if let Some(tasks) = record.get_mut("tasks").and_then(Value::as_array_mut) {
                    for task in tasks {
                        let Some(task_id) =
                            task.get("id").and_then(Value::as_str).map(String::from)
                        else {
                            continue;
                        };
                        overlay_fields(&self.registry, task, &["id"], |field| {
                            ProtectionKey::task(&task_id, field)
                        });
                    }
                }
            }
            Collection::GeneralTasks => {
                let Some(id) = record.get("id").and_then(Value::as_str).map(String::from) else {
                    return;
                };
                overlay_fields(&self.registry, record, &["id"], |field| {
                    ProtectionKey::general_task(&id, field)
                });
            }
            Collection::Activity => {
                let Some(date) = record
                    .get("date")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<NaiveDate>().ok())
                else {
                    return;
                };
                overlay_fields(&self.registry, record, &["date", "id"], |field| {
                    ProtectionKey::activity(date, field)
                });
            }
            Collection::Stats => {}
        }
    }
}

// ============================================================================
// Record helpers
// ============================================================================

fn find_by_id<'a>(records: &'a mut [Value], id: &str) -> Option<&'a mut Value> {
    records
        .iter_mut()
        .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
}

fn find_task_mut<'a>(
    records: &'a mut [Value],
    patient_id: &str,
    task_id: &str,
) -> Option<&'a mut Value> {
    let patient = find_by_id(records, patient_id)?;
    patient
        .get_mut("tasks")
        .and_then(Value::as_array_mut)?
        .iter_mut()
        .find(|t| t.get("id").and_then(Value::as_str) == Some(task_id))
}

/// Shallow-merge the fields of `patch` into `dst` (objects only).
fn merge_object(dst: &mut Value, patch: &Value) {
    let (Some(dst_map), Some(patch_map)) = (dst.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (k, v) in patch_map {
        dst_map.insert(k.clone(), v.clone());
    }
}

/// Probe the registry for every field of `record` (except `skip`) and
/// overwrite with the live value where one exists. Probing every field on
/// every merge is also what lazily evicts expired entries.
fn overlay_fields(
    registry: &ProtectionRegistry,
    record: &mut Value,
    skip: &[&str],
    key_for: impl Fn(&str) -> ProtectionKey,
) {
    let Some(map) = record.as_object_mut() else {
        return;
    };
    let fields: Vec<String> = map
        .keys()
        .filter(|k| !skip.contains(&k.as_str()))
        .cloned()
        .collect();
    for field in fields {
        if let Some(value) = registry.get(&key_for(&field)) {
            map.insert(field, value);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
