//! Client-side optimistic synchronization core for the ward operations
//! app: a protected cache over the server's collections, an optimistic
//! mutation protocol with rollback, a debounced field-save controller, and
//! a background poller.

pub mod clock;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod poll;
pub mod protection;
pub mod reactive;
pub mod status;
pub mod store;
pub mod transport;
pub mod types;
