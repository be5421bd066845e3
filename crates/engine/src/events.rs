use tokio::sync::broadcast;
use tracing::trace;

use canvas_core::{DocumentId, ResolutionChoice, VersionSource};

/// Notifications for views that do not want to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEvent {
    VersionAppended {
        document_id: DocumentId,
        number: u64,
        source: VersionSource,
    },
    ConflictRaised {
        document_id: DocumentId,
        base_version: u64,
    },
    /// The pending conflict's user side was replaced by a newer settled edit.
    ConflictUpdated {
        document_id: DocumentId,
        base_version: u64,
    },
    ConflictResolved {
        document_id: DocumentId,
        choice: ResolutionChoice,
        number: u64,
    },
    ViewChanged {
        document_id: DocumentId,
        viewed_version: u64,
        is_viewing_old_version: bool,
    },
}

pub struct EventHub {
    tx: broadcast::Sender<CanvasEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: CanvasEvent) {
        if self.tx.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }
}
