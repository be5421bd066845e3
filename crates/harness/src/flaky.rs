use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use canvas_core::{DocumentId, DocumentRecord, DocumentType, Version, VersionSource};
use canvas_storage::{StorageError, VersionStore};

/// Shared handle that makes the next N appends of a `FlakyStore` fail.
#[derive(Clone, Default)]
pub struct FailureSwitch(Arc<AtomicUsize>);

impl FailureSwitch {
    pub fn fail_next(&self, count: usize) {
        self.0.store(count, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn trip(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Store wrapper whose appends can be made to fail on demand. Reads always
/// pass through.
pub struct FlakyStore<S> {
    inner: S,
    switch: FailureSwitch,
}

impl<S: VersionStore> FlakyStore<S> {
    pub fn new(inner: S) -> (Self, FailureSwitch) {
        let switch = FailureSwitch::default();
        (
            Self {
                inner,
                switch: switch.clone(),
            },
            switch,
        )
    }
}

impl<S: VersionStore> VersionStore for FlakyStore<S> {
    fn create_document(
        &mut self,
        document_type: DocumentType,
        language: Option<&str>,
        content: &str,
        source: VersionSource,
        note: Option<&str>,
    ) -> Result<(DocumentRecord, Version), StorageError> {
        self.inner
            .create_document(document_type, language, content, source, note)
    }

    fn get_document(&self, document_id: DocumentId) -> Result<Option<DocumentRecord>, StorageError> {
        self.inner.get_document(document_id)
    }

    fn list_documents(&self) -> Result<Vec<DocumentRecord>, StorageError> {
        self.inner.list_documents()
    }

    fn append(
        &mut self,
        document_id: DocumentId,
        content: &str,
        source: VersionSource,
        note: Option<&str>,
    ) -> Result<Version, StorageError> {
        if self.switch.trip() {
            return Err(StorageError::Io(std::io::Error::other("injected append failure")));
        }
        self.inner.append(document_id, content, source, note)
    }

    fn get_version(
        &self,
        document_id: DocumentId,
        number: u64,
    ) -> Result<Option<Version>, StorageError> {
        self.inner.get_version(document_id, number)
    }

    fn get_latest(&self, document_id: DocumentId) -> Result<Option<Version>, StorageError> {
        self.inner.get_latest(document_id)
    }

    fn list_versions(&self, document_id: DocumentId) -> Result<Vec<Version>, StorageError> {
        self.inner.list_versions(document_id)
    }
}
