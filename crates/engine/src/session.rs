use std::time::Duration;

use serde::Serialize;

use canvas_core::{Conflict, DocumentId, DocumentRecord, Version};

use crate::buffer::LocalEditBuffer;
use crate::history::{HistoryView, ViewPointer};

/// Reconciliation state of one document. Holding the conflict inside the
/// state means a document can never have two pending at once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    AwaitingResolution(Conflict),
}

impl SyncState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn pending_conflict(&self) -> Option<&Conflict> {
        match self {
            Self::Idle => None,
            Self::AwaitingResolution(conflict) => Some(conflict),
        }
    }
}

/// All mutable per-document state. One lock guards the whole struct, which
/// is what serializes reconciliation decisions per document.
#[derive(Debug)]
pub struct DocumentSession {
    pub(crate) document: DocumentRecord,
    pub(crate) buffer: LocalEditBuffer,
    pub(crate) state: SyncState,
    pub(crate) view: ViewPointer,
}

impl DocumentSession {
    pub fn new(document: DocumentRecord, latest: Version, settle_window: Duration) -> Self {
        Self {
            document,
            buffer: LocalEditBuffer::new(latest, settle_window),
            state: SyncState::Idle,
            view: ViewPointer::Latest,
        }
    }

    pub fn document_id(&self) -> DocumentId {
        self.document.id
    }

    pub fn current_version(&self) -> u64 {
        self.document.current_version
    }

    pub fn history_view(&self) -> HistoryView {
        HistoryView::new(self.view, self.current_version())
    }

    /// Advance the document pointer after a successful append.
    pub(crate) fn record_appended(&mut self, version: &Version) {
        self.document.current_version = self.document.current_version.max(version.number);
    }

    pub fn snapshot(&self) -> DocumentState {
        DocumentState {
            document: self.document.clone(),
            baseline_version: self.buffer.baseline().number,
            buffer_content: self.buffer.content().to_string(),
            is_dirty: self.buffer.is_dirty(),
            pending_conflict: self.state.pending_conflict().cloned(),
            history: self.history_view(),
        }
    }
}

/// Everything a view needs to render one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub document: DocumentRecord,
    pub baseline_version: u64,
    pub buffer_content: String,
    pub is_dirty: bool,
    pub pending_conflict: Option<Conflict>,
    pub history: HistoryView,
}

impl DocumentState {
    pub fn is_awaiting_resolution(&self) -> bool {
        self.pending_conflict.is_some()
    }
}
