//! Change notification: a typed event emitter plus the cache change events
//! screens subscribe to.

pub mod event;
pub mod event_emitter;

pub use event::ChangeEvent;
pub use event_emitter::{EventEmitter, ListenerFn, ListenerId};
