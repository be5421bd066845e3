use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("content hash mismatch for {document_id} v{number}")]
    Integrity { document_id: String, number: u64 },

    #[error("core error: {0}")]
    Core(#[from] canvas_core::CoreError),
}
