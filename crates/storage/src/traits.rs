use canvas_core::{DocumentId, DocumentRecord, DocumentType, Version, VersionSource};

use crate::error::StorageError;

/// Append-only persistence of document snapshots.
///
/// Implementations are the sole writer of version numbers: `append` assigns
/// `current_version + 1` and advances the document pointer in one atomic
/// step, or fails without writing anything.
pub trait VersionStore {
    /// Create a document together with its first version.
    fn create_document(
        &mut self,
        document_type: DocumentType,
        language: Option<&str>,
        content: &str,
        source: VersionSource,
        note: Option<&str>,
    ) -> Result<(DocumentRecord, Version), StorageError>;

    fn get_document(&self, document_id: DocumentId) -> Result<Option<DocumentRecord>, StorageError>;

    fn list_documents(&self) -> Result<Vec<DocumentRecord>, StorageError>;

    fn append(
        &mut self,
        document_id: DocumentId,
        content: &str,
        source: VersionSource,
        note: Option<&str>,
    ) -> Result<Version, StorageError>;

    /// `Ok(None)` for unknown documents and out-of-range numbers alike.
    fn get_version(
        &self,
        document_id: DocumentId,
        number: u64,
    ) -> Result<Option<Version>, StorageError>;

    fn get_latest(&self, document_id: DocumentId) -> Result<Option<Version>, StorageError>;

    /// All versions ascending by number. Empty for unknown documents.
    fn list_versions(&self, document_id: DocumentId) -> Result<Vec<Version>, StorageError>;
}
