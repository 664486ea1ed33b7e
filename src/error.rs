use thiserror::Error;

use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// MutationError
// ---------------------------------------------------------------------------

/// A mutation's server call failed after the optimistic patch was applied.
///
/// By the time a caller sees one of these, the cache has already been
/// restored from the pre-patch snapshot and the protection entry cleared —
/// the error is a notification, not a request for cleanup. Non-fatal;
/// retryable by repeating the action.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The write call was rejected or failed in transit.
    #[error("write failed: {0}")]
    Write(#[source] TransportError),

    /// The canonical-date lookup for a counter write failed before the
    /// write was attempted.
    #[error("server date unavailable: {0}")]
    ServerDate(#[source] TransportError),
}

impl MutationError {
    /// The underlying transport failure.
    pub fn transport(&self) -> &TransportError {
        match self {
            MutationError::Write(e) | MutationError::ServerDate(e) => e,
        }
    }
}

// ---------------------------------------------------------------------------
// WardSyncError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WardSyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("sync client is disposed")]
    Disposed,
}

/// Convenience alias — the default error type is `WardSyncError`.
pub type Result<T, E = WardSyncError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportErrorKind;

    #[test]
    fn mutation_error_write_display() {
        let e = MutationError::Write(TransportError::new("connection reset"));
        let msg = e.to_string();
        assert!(msg.contains("write failed"), "prefix missing: {msg}");
        assert!(msg.contains("connection reset"), "cause missing: {msg}");
    }

    #[test]
    fn mutation_error_server_date_display() {
        let e = MutationError::ServerDate(TransportError::with_kind(
            "503",
            TransportErrorKind::Capacity,
        ));
        let msg = e.to_string();
        assert!(msg.contains("server date"), "prefix missing: {msg}");
    }

    #[test]
    fn mutation_error_exposes_transport_kind() {
        let e = MutationError::Write(TransportError::with_kind(
            "forbidden",
            TransportErrorKind::Auth,
        ));
        assert_eq!(e.transport().kind, TransportErrorKind::Auth);
    }

    #[test]
    fn ward_sync_error_from_conversions() {
        let t: WardSyncError = TransportError::new("down").into();
        assert!(matches!(t, WardSyncError::Transport(_)));

        let m: WardSyncError = MutationError::Write(TransportError::new("down")).into();
        assert!(matches!(m, WardSyncError::Mutation(_)));
    }

    #[test]
    fn disposed_display() {
        assert!(WardSyncError::Disposed.to_string().contains("disposed"));
    }
}
