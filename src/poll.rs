//! Background poller.
//!
//! Refreshes every collection on a fixed interval while the view is
//! visible, pauses while hidden, and refreshes immediately when visibility
//! returns. A failed tick keeps the last-known snapshot and stays quiet —
//! the next tick retries; the user never sees a hard error from polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::SyncEngine;
use crate::types::Collection;

pub struct Poller {
    engine: Arc<SyncEngine>,
    collections: Vec<Collection>,
    interval: Duration,
    visible: AtomicBool,
    wake: Notify,
    disposed: AtomicBool,
}

impl Poller {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self::with_collections(engine, interval, Collection::ALL.to_vec())
    }

    /// A poller covering only some collections (a screen that renders one
    /// list polls one list).
    pub fn with_collections(
        engine: Arc<SyncEngine>,
        interval: Duration,
        collections: Vec<Collection>,
    ) -> Self {
        Self {
            engine,
            collections,
            interval,
            visible: AtomicBool::new(true),
            wake: Notify::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Run the poll loop on the current runtime until disposed. The first
    /// tick fires immediately (initial load).
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        loop {
            if self.disposed.load(Ordering::SeqCst) {
                break;
            }
            if self.visible.load(Ordering::SeqCst) {
                self.tick().await;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    /// One refresh pass over all covered collections. Failures are logged
    /// and swallowed; an optimistic value in the cache is never rolled back
    /// by a failed poll.
    async fn tick(&self) {
        for collection in &self.collections {
            if let Err(e) = self.engine.refresh(*collection).await {
                debug!(collection = %collection, error = %e, "poll failed; keeping last snapshot");
            }
        }
    }

    /// Track view visibility. Regaining visibility triggers an immediate
    /// refresh instead of waiting out the interval.
    pub fn set_visible(&self, visible: bool) {
        let was = self.visible.swap(visible, Ordering::SeqCst);
        if visible && !was {
            self.wake.notify_one();
        }
    }

    /// Skip the current sleep and refresh now (manual refresh button).
    pub fn refresh_now(&self) {
        self.wake.notify_one();
    }

    /// Stop the loop. Idempotent; the loop exits at its next wakeup.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
