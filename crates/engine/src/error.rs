use canvas_core::DocumentId;
use canvas_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict pending on document {0}")]
    ConflictPending(DocumentId),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    #[error("invalid resolution: {0}")]
    InvalidResolution(String),
}

impl EngineError {
    /// Whether the caller may retry the same call later. Of the store
    /// failures only SQLite and I/O errors qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConflictPending(_)
                | Self::Persistence(StorageError::Sqlite(_) | StorageError::Io(_))
        )
    }
}
