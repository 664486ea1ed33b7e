//! Debounced field save controller tests — rapid edits against a mock
//! transport, asserting coalescing, fire-time value selection, and the
//! save-status badge lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use ward_sync::clock::ManualClock;
use ward_sync::config::SyncOptions;
use ward_sync::debounce::FieldSaveController;
use ward_sync::engine::SyncEngine;
use ward_sync::protection::ProtectionRegistry;
use ward_sync::status::{SaveStatus, StatusBoard};
use ward_sync::store::WardStore;
use ward_sync::transport::{TransportError, WardTransport};
use ward_sync::types::{Collection, EntityRef, FieldTarget};

// ============================================================================
// Mock transport — records every PATCH body
// ============================================================================

struct MockTransport {
    patches: Mutex<Vec<(EntityRef, Value)>>,
    patch_calls: AtomicUsize,
    fail_patches: Mutex<bool>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            patches: Mutex::new(Vec::new()),
            patch_calls: AtomicUsize::new(0),
            fail_patches: Mutex::new(false),
        }
    }

    fn last_patch(&self) -> Option<(EntityRef, Value)> {
        self.patches.lock().last().cloned()
    }
}

#[async_trait]
impl WardTransport for MockTransport {
    async fn fetch(&self, _collection: Collection) -> Result<Vec<Value>, TransportError> {
        Ok(Vec::new())
    }

    async fn patch(&self, target: &EntityRef, body: Value) -> Result<Value, TransportError> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_patches.lock() {
            return Err(TransportError::new("write rejected"));
        }
        self.patches.lock().push((target.clone(), body.clone()));
        Ok(body)
    }

    async fn create(&self, _collection: Collection, body: Value) -> Result<Value, TransportError> {
        Ok(body)
    }

    async fn delete(&self, _target: &EntityRef) -> Result<(), TransportError> {
        Ok(())
    }

    async fn server_today(&self) -> Result<NaiveDate, TransportError> {
        Ok(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
    }
}

// ============================================================================
// Helpers
// ============================================================================

const DEBOUNCE: Duration = Duration::from_millis(80);

struct Harness {
    transport: Arc<MockTransport>,
    status: Arc<StatusBoard>,
    controller: FieldSaveController,
}

fn make_harness() -> Harness {
    let transport = Arc::new(MockTransport::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 5, 15, 0, 0).unwrap(),
    ));
    let options = SyncOptions {
        debounce_delay: DEBOUNCE,
        status_revert: Duration::from_millis(40),
        ..SyncOptions::default()
    };
    let registry = Arc::new(ProtectionRegistry::new(
        options.protection_window,
        clock.clone(),
    ));
    let store = Arc::new(WardStore::new(registry.clone()));
    let status = Arc::new(StatusBoard::new(options.status_revert));
    let engine = Arc::new(SyncEngine::new(
        transport.clone(),
        store,
        registry,
        clock,
        options,
    ));
    let controller = FieldSaveController::new(engine, status.clone(), DEBOUNCE);
    Harness {
        transport,
        status,
        controller,
    }
}

fn notes_target() -> FieldTarget {
    FieldTarget::new(EntityRef::Patient { id: "p1".into() }, "notes")
}

fn edit(h: &Harness, field: &str, value: &str) {
    h.controller.on_edit(
        EntityRef::Patient { id: "p1".into() },
        field,
        json!(value),
    );
}

// ============================================================================
// Coalescing
// ============================================================================

#[tokio::test]
async fn rapid_edits_produce_one_write_with_the_final_value() {
    // Scenario C: three edits inside the quiet period → one PATCH.
    let h = make_harness();

    edit(&h, "notes", "N");
    tokio::time::sleep(Duration::from_millis(10)).await;
    edit(&h, "notes", "NP");
    tokio::time::sleep(Duration::from_millis(10)).await;
    edit(&h, "notes", "NPO");

    tokio::time::sleep(DEBOUNCE + Duration::from_millis(60)).await;

    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 1);
    let (_, body) = h.transport.last_patch().unwrap();
    assert_eq!(body, json!({ "notes": "NPO" }));
}

#[tokio::test]
async fn spaced_edits_each_write() {
    let h = make_harness();

    edit(&h, "notes", "first");
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(40)).await;
    edit(&h, "notes", "second");
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(40)).await;

    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sibling_fields_debounce_independently() {
    let h = make_harness();

    edit(&h, "notes", "cage rest");
    edit(&h, "kennel", "K-4");

    tokio::time::sleep(DEBOUNCE + Duration::from_millis(60)).await;

    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 2);
    let bodies: Vec<Value> = h
        .transport
        .patches
        .lock()
        .iter()
        .map(|(_, b)| b.clone())
        .collect();
    assert!(bodies.contains(&json!({ "notes": "cage rest" })));
    assert!(bodies.contains(&json!({ "kennel": "K-4" })));
}

// ============================================================================
// Pending values / flush
// ============================================================================

#[tokio::test]
async fn pending_value_is_visible_before_the_timer_fires() {
    let h = make_harness();

    edit(&h, "notes", "NPO");
    assert_eq!(
        h.controller.pending_value(&notes_target()),
        Some(json!("NPO"))
    );

    tokio::time::sleep(DEBOUNCE + Duration::from_millis(60)).await;
    assert_eq!(h.controller.pending_value(&notes_target()), None);
}

#[tokio::test]
async fn flush_fires_immediately() {
    let h = make_harness();

    edit(&h, "notes", "NPO");
    let result = h.controller.flush(&notes_target()).await;
    assert!(result.unwrap().is_ok());
    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 1);

    // The slot is cleared — the timer that was pending must not fire too.
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(40)).await;
    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn flush_with_nothing_pending_is_a_no_op() {
    let h = make_harness();
    assert!(h.controller.flush(&notes_target()).await.is_none());
    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dispose_cancels_pending_timers() {
    let h = make_harness();

    edit(&h, "notes", "NPO");
    h.controller.dispose();

    tokio::time::sleep(DEBOUNCE + Duration::from_millis(40)).await;
    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 0);

    // Edits after dispose are ignored.
    edit(&h, "notes", "more");
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(40)).await;
    assert_eq!(h.transport.patch_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Save status
// ============================================================================

#[tokio::test]
async fn status_runs_saving_saved_idle() {
    let h = make_harness();

    edit(&h, "notes", "NPO");
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(20)).await;

    // Settled quickly; either Saved is still showing or it already
    // reverted — poll briefly for the Saved reading.
    let mut saw_saved = false;
    for _ in 0..10 {
        if h.status.get(&notes_target()) == SaveStatus::Saved {
            saw_saved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(saw_saved, "saved badge never appeared");

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.status.get(&notes_target()), SaveStatus::Idle);
}

#[tokio::test]
async fn failed_save_shows_error_then_reverts() {
    let h = make_harness();
    *h.transport.fail_patches.lock() = true;

    edit(&h, "notes", "NPO");
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(20)).await;

    let mut saw_error = false;
    for _ in 0..10 {
        if h.status.get(&notes_target()) == SaveStatus::Error {
            saw_error = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(saw_error, "error badge never appeared");

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.status.get(&notes_target()), SaveStatus::Idle);
}
