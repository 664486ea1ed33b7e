//! EventEmitter<T> — a simple typed pub/sub primitive.
//!
//! Listeners are stored as `Arc<dyn Fn(&T)>` so snapshots are cheap.
//! Snapshot-on-emit semantics mean:
//!   - A listener removed *during* emission is still called in that round.
//!   - A listener added *during* emission is NOT called until the next emit.
//!
//! All methods take `&self` (interior mutability via `parking_lot::Mutex`),
//! and the lock is released before any callback runs, so listeners can call
//! `on()`/`off()` from inside a callback without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A listener ID returned by [`EventEmitter::on`] that can be passed to
/// [`EventEmitter::off`] to remove the listener.
pub type ListenerId = u64;

/// Closure type for event listeners.
pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

/// Typed synchronous event emitter.
pub struct EventEmitter<T> {
    listeners: Mutex<Vec<(ListenerId, Arc<ListenerFn<T>>)>>,
    next_id: AtomicU64,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` and return its [`ListenerId`].
    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove the listener identified by `id`. Safe to call twice.
    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Emit `event` to all currently registered listeners.
    ///
    /// A snapshot of the listener list is taken before iteration so that
    /// additions or removals during a callback do not affect the current
    /// round. The lock is released before calling any callbacks.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Arc<ListenerFn<T>>> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for cb in snapshot {
            cb(event);
        }
    }

    /// Number of currently registered listeners.
    pub fn size(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_reaches_all_listeners() {
        let emitter = EventEmitter::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        emitter.on(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        emitter.on(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&7);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn off_removes_a_listener() {
        let emitter = EventEmitter::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let id = emitter.on(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        emitter.off(id);
        emitter.emit(&7);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.size(), 0);
    }

    #[test]
    fn listener_added_during_emit_waits_for_next_round() {
        let emitter = Arc::new(EventEmitter::<u32>::new());
        let count = Arc::new(AtomicUsize::new(0));

        let em = emitter.clone();
        let c = count.clone();
        emitter.on(move |_| {
            let inner = c.clone();
            em.on(move |_| {
                inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        emitter.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        emitter.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
