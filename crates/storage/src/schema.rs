use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS documents (
    document_id BLOB PRIMARY KEY CHECK (length(document_id) = 16),
    document_type TEXT NOT NULL CHECK (document_type IN ('code', 'prose')),
    language TEXT,
    current_version INTEGER NOT NULL DEFAULT 0 CHECK (current_version >= 0),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS versions (
    document_id BLOB NOT NULL REFERENCES documents (document_id),
    number INTEGER NOT NULL CHECK (number >= 1),
    content TEXT NOT NULL,
    content_hash BLOB NOT NULL CHECK (length(content_hash) = 32),
    source TEXT NOT NULL CHECK (source IN ('user_edit', 'ai_edit', 'conflict_resolution')),
    note TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (document_id, number)
) WITHOUT ROWID;

CREATE TRIGGER IF NOT EXISTS versions_no_update
BEFORE UPDATE ON versions
BEGIN
    SELECT RAISE(ABORT, 'versions are immutable');
END;

CREATE TRIGGER IF NOT EXISTS versions_no_delete
BEFORE DELETE ON versions
BEGIN
    SELECT RAISE(ABORT, 'versions are immutable');
END;
";
