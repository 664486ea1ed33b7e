//! Cache change events.

use crate::types::Collection;

/// Fired whenever a collection snapshot is replaced. Screens re-render the
/// named collection from the cache; the event does not carry record data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A fetch passed the merge and replaced the snapshot.
    Refreshed { collection: Collection },
    /// An optimistic or confirmed patch replaced the snapshot.
    Patched { collection: Collection },
    /// A failed mutation restored the pre-patch snapshot.
    RolledBack { collection: Collection },
}

impl ChangeEvent {
    pub fn collection(&self) -> Collection {
        match self {
            ChangeEvent::Refreshed { collection }
            | ChangeEvent::Patched { collection }
            | ChangeEvent::RolledBack { collection } => *collection,
        }
    }
}
