//! Transport seam — the user-implemented network layer.
//!
//! The sync core never talks HTTP directly. Implementations wrap whatever
//! client the host app uses and surface the four shapes the protocol
//! depends on: collection fetches, partial-field patches, create/delete,
//! and the canonical-date lookup used by counter writes.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::types::{Collection, EntityRef};

// ============================================================================
// TransportError
// ============================================================================

/// Classification of transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Retriable (network, temporary failures)
    Transient,
    /// Not retriable (validation, version mismatch, etc.)
    Permanent,
    /// Authentication failed
    Auth,
    /// Rate limit or quota exceeded
    Capacity,
}

/// Transport-level error (wraps arbitrary error strings from the network layer).
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
    pub kind: TransportErrorKind,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TransportErrorKind::Transient,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: TransportErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

// ============================================================================
// WardTransport
// ============================================================================

/// User-implemented transport for the ward service endpoints.
///
/// All methods map to the narrow HTTP contract the core consumes:
/// `fetch` → `GET /collection`, `patch` → `PATCH /entity/{id}`,
/// `create`/`delete` → `POST /entity` / `DELETE /entity/{id}`,
/// `server_today` → the "what day is it" endpoint.
#[async_trait]
pub trait WardTransport: Send + Sync {
    /// Fetch the full current list of records for a collection.
    async fn fetch(&self, collection: Collection) -> Result<Vec<Value>, TransportError>;

    /// Apply a partial-field patch to one entity. Returns the
    /// server-confirmed record (full or partial — confirmed fields
    /// override the optimistic guess).
    async fn patch(&self, target: &EntityRef, body: Value) -> Result<Value, TransportError>;

    /// Create a new record. Used only by add flows, which bypass
    /// protection and refetch the whole collection.
    async fn create(&self, collection: Collection, body: Value) -> Result<Value, TransportError>;

    /// Delete a record. Used only by remove flows, which bypass
    /// protection and refetch the whole collection.
    async fn delete(&self, target: &EntityRef) -> Result<(), TransportError>;

    /// The server's canonical current date, in the clinic timezone.
    async fn server_today(&self) -> Result<NaiveDate, TransportError>;
}
