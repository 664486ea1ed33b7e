//! Shared types: logical collections, entity addressing, protection keys,
//! and the ward record shapes carried over the wire.
//!
//! The cache and merge logic operate on `serde_json::Value` records so they
//! stay shape-generic; the typed structs document the wire contract and are
//! used by transports and tests.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Collections
// ============================================================================

/// The server-backed collections held by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Patients with their nested task checklists.
    Patients,
    /// Ward-wide tasks not tied to a patient.
    GeneralTasks,
    /// One daily-activity entry per date (counters: MRI, rechecks, hours).
    Activity,
    /// Aggregated read-only stats.
    Stats,
}

impl Collection {
    /// All collections in the order the poller refreshes them.
    pub const ALL: [Collection; 4] = [
        Collection::Patients,
        Collection::GeneralTasks,
        Collection::Activity,
        Collection::Stats,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Patients => "patients",
            Collection::GeneralTasks => "general_tasks",
            Collection::Activity => "activity",
            Collection::Stats => "stats",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entity addressing
// ============================================================================

/// Address of a single mutable entity inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Patient { id: String },
    PatientTask { patient_id: String, task_id: String },
    GeneralTask { id: String },
    Activity { date: NaiveDate },
}

impl EntityRef {
    /// The collection this entity lives in.
    pub fn collection(&self) -> Collection {
        match self {
            EntityRef::Patient { .. } | EntityRef::PatientTask { .. } => Collection::Patients,
            EntityRef::GeneralTask { .. } => Collection::GeneralTasks,
            EntityRef::Activity { .. } => Collection::Activity,
        }
    }

    /// The protection key for one field of this entity.
    pub fn protection_key(&self, field: &str) -> ProtectionKey {
        match self {
            EntityRef::Patient { id } => ProtectionKey::patient(id, field),
            EntityRef::PatientTask { task_id, .. } => ProtectionKey::task(task_id, field),
            EntityRef::GeneralTask { id } => ProtectionKey::general_task(id, field),
            EntityRef::Activity { date } => ProtectionKey::activity(*date, field),
        }
    }
}

/// One editable field of one entity — the unit the debounce controller and
/// the save-status board key on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldTarget {
    pub entity: EntityRef,
    pub field: String,
}

impl FieldTarget {
    pub fn new(entity: EntityRef, field: impl Into<String>) -> Self {
        Self {
            entity,
            field: field.into(),
        }
    }

    pub fn protection_key(&self) -> ProtectionKey {
        self.entity.protection_key(&self.field)
    }
}

// ============================================================================
// Protection keys
// ============================================================================

/// Stable identifier for "what was changed" — an entity id plus field name.
///
/// Task ids are unique across patients, so a task key does not embed the
/// owning patient. Activity entries are keyed by their date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtectionKey(String);

impl ProtectionKey {
    pub fn patient(id: &str, field: &str) -> Self {
        Self(format!("patient:{id}:{field}"))
    }

    pub fn task(task_id: &str, field: &str) -> Self {
        Self(format!("task:{task_id}:{field}"))
    }

    pub fn general_task(id: &str, field: &str) -> Self {
        Self(format!("gtask:{id}:{field}"))
    }

    pub fn activity(date: NaiveDate, field: &str) -> Self {
        Self(format!("activity:{date}:{field}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Mutation outcome
// ============================================================================

/// What a settled mutation produced.
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    /// Server-confirmed record, when a write reached the server.
    pub confirmed: Option<Value>,
    /// The mutation was clamped to a no-op (same-day counter at zero) —
    /// no network call was made, no cache change, no refetch.
    pub blocked: bool,
}

impl MutationOutcome {
    pub fn confirmed(record: Value) -> Self {
        Self {
            confirmed: Some(record),
            blocked: false,
        }
    }

    pub fn blocked() -> Self {
        Self {
            confirmed: None,
            blocked: true,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }
}

// ============================================================================
// Wire shapes
// ============================================================================

/// A patient row with its nested task checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub kennel: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tasks: Vec<PatientTask>,
}

/// One checklist item on a patient's rounding sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientTask {
    pub id: String,
    pub label: String,
    pub completed: bool,
}

/// A ward-wide task not tied to a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralTask {
    pub id: String,
    pub label: String,
    pub completed: bool,
}

/// The per-date activity counters (one record per date).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub date: NaiveDate,
    #[serde(default)]
    pub mri_count: i64,
    #[serde(default)]
    pub recheck_count: i64,
    #[serde(default)]
    pub resident_minutes: i64,
}

/// Aggregated ward statistics. Read-only — never patched, never protected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardStats {
    pub patient_count: u64,
    pub open_task_count: u64,
    pub mri_this_week: u64,
}

// ============================================================================
// Tests
// ============================================================================
