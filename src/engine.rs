//! SyncEngine — the optimistic mutation protocol.
//!
//! Every write runs the same sequence: record protection, cancel in-flight
//! fetches, snapshot, patch the cache, call the server, then reconcile or
//! roll back. Protection is recorded *before* anything else, so a fetch
//! already in flight when the user acts can never win the race — its result
//! passes through the registry on arrival and the recorded value prevails.
//!
//! Settled mutations do not refetch. An immediate refetch can return a
//! snapshot computed before the write was durable server-side, which is
//! exactly the flicker this layer exists to prevent. Only create/delete
//! flows invalidate and refetch: there is no single field to protect and a
//! fresh list is the only correct result.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::SyncOptions;
use crate::error::MutationError;
use crate::protection::ProtectionRegistry;
use crate::store::WardStore;
use crate::transport::{TransportError, WardTransport};
use crate::types::{Collection, EntityRef, FieldTarget, MutationOutcome, ProtectionKey};

pub struct SyncEngine {
    transport: Arc<dyn WardTransport>,
    store: Arc<WardStore>,
    registry: Arc<ProtectionRegistry>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn WardTransport>,
        store: Arc<WardStore>,
        registry: Arc<ProtectionRegistry>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Self {
        Self {
            transport,
            store,
            registry,
            clock,
            options,
        }
    }

    pub fn store(&self) -> &Arc<WardStore> {
        &self.store
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// The date counter writes target before the server has answered —
    /// computed with the fixed clinic offset, never device-local time.
    pub fn clinic_today(&self) -> chrono::NaiveDate {
        self.clock.today(&self.options.clinic_offset)
    }

    // -----------------------------------------------------------------------
    // Field-level writes
    // -----------------------------------------------------------------------

    /// Toggle a checklist task on a patient's rounding sheet.
    pub async fn toggle_patient_task(
        &self,
        patient_id: &str,
        task_id: &str,
        completed: bool,
    ) -> Result<MutationOutcome, MutationError> {
        let entity = EntityRef::PatientTask {
            patient_id: patient_id.to_string(),
            task_id: task_id.to_string(),
        };
        self.mutate_field(entity, "completed", Value::Bool(completed))
            .await
    }

    /// Toggle a ward-wide task.
    pub async fn toggle_general_task(
        &self,
        task_id: &str,
        completed: bool,
    ) -> Result<MutationOutcome, MutationError> {
        let entity = EntityRef::GeneralTask {
            id: task_id.to_string(),
        };
        self.mutate_field(entity, "completed", Value::Bool(completed))
            .await
    }

    /// Save one edited field of a patient record.
    pub async fn save_patient_field(
        &self,
        patient_id: &str,
        field: &str,
        value: Value,
    ) -> Result<MutationOutcome, MutationError> {
        let entity = EntityRef::Patient {
            id: patient_id.to_string(),
        };
        self.mutate_field(entity, field, value).await
    }

    /// Save one edited field of a ward-wide task.
    pub async fn save_general_task_field(
        &self,
        task_id: &str,
        field: &str,
        value: Value,
    ) -> Result<MutationOutcome, MutationError> {
        let entity = EntityRef::GeneralTask {
            id: task_id.to_string(),
        };
        self.mutate_field(entity, field, value).await
    }

    /// Save one edited field of any addressable entity — the debounce
    /// controller's downstream.
    pub async fn save_field(
        &self,
        target: FieldTarget,
        value: Value,
    ) -> Result<MutationOutcome, MutationError> {
        let FieldTarget { entity, field } = target;
        self.mutate_field(entity, &field, value).await
    }

    /// The generic apply/rollback/commit sequence.
    async fn mutate_field(
        &self,
        entity: EntityRef,
        field: &str,
        value: Value,
    ) -> Result<MutationOutcome, MutationError> {
        let collection = entity.collection();
        let key = entity.protection_key(field);

        // Protection first — from here on, any merge prefers this value.
        self.registry.record(key.clone(), value.clone());
        self.store.invalidate_inflight(collection);

        let snapshot = self.store.snapshot(collection);
        let body = single_field(field, value.clone());
        self.store.patch_entity(&entity, &body);

        match self.transport.patch(&entity, body).await {
            Ok(confirmed) => {
                // The server may legitimately differ from the optimistic
                // guess (derived fields, normalization) — the confirmed
                // value becomes the protected one.
                let confirmed_value = confirmed.get(field).cloned().unwrap_or(value);
                self.registry.record(key, confirmed_value);
                self.store.patch_entity(&entity, &confirmed);
                Ok(MutationOutcome::confirmed(confirmed))
            }
            Err(e) => {
                warn!(collection = %collection, key = %key, error = %e, "write failed; rolling back");
                self.registry.clear(&key);
                self.store.restore(collection, snapshot);
                Err(MutationError::Write(e))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    /// Increment or decrement a same-day activity counter.
    ///
    /// A decrement that would take the counter below zero is clamped to a
    /// no-op: no network call, no cache change, no refetch — the outcome
    /// comes back `blocked` so callers can skip their own settlement work.
    ///
    /// The write targets the server's canonical date. The optimistic patch
    /// cannot wait for that answer, so it guesses with the shared clinic
    /// offset; a guess that misses the server's date self-corrects once the
    /// confirmed record lands and the next fetch merges.
    pub async fn adjust_activity_counter(
        &self,
        field: &str,
        delta: i64,
    ) -> Result<MutationOutcome, MutationError> {
        let guess = self.clinic_today();
        let current = self.store.counter_value(guess, field);

        if current <= 0 && delta < 0 {
            debug!(field, "decrement clamped at zero");
            return Ok(MutationOutcome::blocked());
        }

        let next = current + delta;
        let key = ProtectionKey::activity(guess, field);

        self.registry.record(key.clone(), Value::from(next));
        self.store.invalidate_inflight(Collection::Activity);

        let snapshot = self.store.snapshot(Collection::Activity);
        let body = single_field(field, Value::from(next));
        self.store
            .patch_entity(&EntityRef::Activity { date: guess }, &body);

        let server_day = match self.transport.server_today().await {
            Ok(day) => day,
            Err(e) => {
                warn!(field, error = %e, "canonical date lookup failed; rolling back");
                self.registry.clear(&key);
                self.store.restore(Collection::Activity, snapshot);
                return Err(MutationError::ServerDate(e));
            }
        };

        let target = EntityRef::Activity { date: server_day };
        match self.transport.patch(&target, body).await {
            Ok(confirmed) => {
                let confirmed_value = confirmed.get(field).cloned().unwrap_or(Value::from(next));
                self.registry.record(key, confirmed_value);
                self.store.patch_entity(&target, &confirmed);
                Ok(MutationOutcome::confirmed(confirmed))
            }
            Err(e) => {
                warn!(field, error = %e, "counter write failed; rolling back");
                self.registry.clear(&key);
                self.store.restore(Collection::Activity, snapshot);
                Err(MutationError::Write(e))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Create / delete — the invalidate-and-refetch flows
    // -----------------------------------------------------------------------

    /// Create a record and refetch its collection. No protection entry is
    /// attempted: there is no single field to protect. If the refetch loses
    /// a race or fails, the new row lags until the next poll — accepted.
    pub async fn create(
        &self,
        collection: Collection,
        body: Value,
    ) -> Result<Value, TransportError> {
        let created = self.transport.create(collection, body).await?;
        if let Err(e) = self.refresh(collection).await {
            debug!(collection = %collection, error = %e, "post-create refetch failed; next poll retries");
        }
        Ok(created)
    }

    /// Delete a record and refetch its collection.
    pub async fn delete(&self, target: EntityRef) -> Result<(), TransportError> {
        let collection = target.collection();
        self.transport.delete(&target).await?;
        if let Err(e) = self.refresh(collection).await {
            debug!(collection = %collection, error = %e, "post-delete refetch failed; next poll retries");
        }
        Ok(())
    }

    pub async fn create_general_task(&self, body: Value) -> Result<Value, TransportError> {
        self.create(Collection::GeneralTasks, body).await
    }

    pub async fn delete_general_task(&self, task_id: &str) -> Result<(), TransportError> {
        self.delete(EntityRef::GeneralTask {
            id: task_id.to_string(),
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Fetch
    // -----------------------------------------------------------------------

    /// Fetch one collection and merge it into the cache. Returns `false`
    /// when the result was discarded because a mutation moved the epoch
    /// while the fetch was in flight.
    pub async fn refresh(&self, collection: Collection) -> Result<bool, TransportError> {
        let epoch = self.store.begin_fetch(collection);
        let records = self.transport.fetch(collection).await?;
        Ok(self.store.apply_fetched(collection, records, epoch))
    }
}

/// `{ field: value }` — the partial-field patch body.
fn single_field(field: &str, value: Value) -> Value {
    let mut map = serde_json::Map::with_capacity(1);
    map.insert(field.to_string(), value);
    Value::Object(map)
}
