use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use canvas_core::{
    ids::{ContentHash, DocumentId},
    version::{from_millis, now_millis},
    DocumentRecord, DocumentType, Version, VersionSource,
};

use crate::error::StorageError;
use crate::traits::VersionStore;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn to_sql_number(number: u64) -> Result<i64, StorageError> {
    i64::try_from(number)
        .map_err(|_| StorageError::Serialization(format!("version number {number} out of range")))
}

fn from_sql_number(number: i64) -> Result<u64, StorageError> {
    u64::try_from(number)
        .map_err(|_| StorageError::Serialization(format!("negative version number {number}")))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

const VERSION_COLUMNS: &str =
    "document_id, number, content, content_hash, source, note, created_at";

fn read_version(row: &rusqlite::Row<'_>) -> Result<Version, StorageError> {
    let document_id_bytes: Vec<u8> = row.get(0)?;
    let number: i64 = row.get(1)?;
    let content: String = row.get(2)?;
    let hash_bytes: Vec<u8> = row.get(3)?;
    let source: String = row.get(4)?;
    let note: Option<String> = row.get(5)?;
    let created_at: i64 = row.get(6)?;

    let document_id = DocumentId::from_bytes(to_array::<16>(document_id_bytes, "document_id")?);
    let number = from_sql_number(number)?;
    let hash = ContentHash::from_bytes(to_array::<32>(hash_bytes, "content_hash")?);
    if !hash.matches(&content) {
        return Err(StorageError::Integrity {
            document_id: document_id.to_string(),
            number,
        });
    }

    Ok(Version {
        document_id,
        number,
        content,
        source: VersionSource::parse(&source)?,
        note,
        created_at: from_millis(created_at)?,
    })
}

fn read_document(row: &rusqlite::Row) -> Result<DocumentRecord, StorageError> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let document_type: String = row.get(1)?;
    let language: Option<String> = row.get(2)?;
    let current_version: i64 = row.get(3)?;

    Ok(DocumentRecord {
        id: DocumentId::from_bytes(to_array::<16>(id_bytes, "document_id")?),
        document_type: DocumentType::parse(&document_type)?,
        language,
        current_version: from_sql_number(current_version)?,
    })
}

/// Tunnel a StorageError through the rusqlite::Error a row closure must return.
fn tunnel(e: StorageError) -> rusqlite::Error {
    match e {
        StorageError::Sqlite(sq) => sq,
        other => rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            Box::new(OpaqueStorageError(other.to_string())),
        ),
    }
}

fn insert_version(
    tx: &rusqlite::Transaction,
    document_id: DocumentId,
    number: u64,
    content: &str,
    source: VersionSource,
    note: Option<&str>,
) -> Result<Version, StorageError> {
    let created_at = now_millis();
    let result = tx.execute(
        "INSERT INTO versions (document_id, number, content, content_hash, source, note, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            document_id.as_bytes().as_slice(),
            to_sql_number(number)?,
            content,
            ContentHash::of(content).as_bytes().as_slice(),
            source.as_str(),
            note,
            created_at.timestamp_millis(),
        ],
    );
    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(StorageError::ConstraintViolation(format!(
                "version {number} of {document_id} already exists"
            )));
        }
        Err(e) => return Err(StorageError::Sqlite(e)),
    }

    Ok(Version {
        document_id,
        number,
        content: content.to_string(),
        source,
        note: note.map(str::to_string),
        created_at,
    })
}

impl VersionStore for SqliteStorage {
    fn create_document(
        &mut self,
        document_type: DocumentType,
        language: Option<&str>,
        content: &str,
        source: VersionSource,
        note: Option<&str>,
    ) -> Result<(DocumentRecord, Version), StorageError> {
        let document_id = DocumentId::new();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO documents (document_id, document_type, language, current_version, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
            rusqlite::params![
                document_id.as_bytes().as_slice(),
                document_type.as_str(),
                language,
                now_millis().timestamp_millis(),
            ],
        )?;
        let version = insert_version(&tx, document_id, 1, content, source, note)?;

        tx.commit()?;
        debug!(%document_id, document_type = document_type.as_str(), "document created");

        let record = DocumentRecord {
            id: document_id,
            document_type,
            language: language.map(str::to_string),
            current_version: 1,
        };
        Ok((record, version))
    }

    fn get_document(&self, document_id: DocumentId) -> Result<Option<DocumentRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, document_type, language, current_version FROM documents WHERE document_id = ?1",
        )?;
        let mut rows = stmt.query_map(
            rusqlite::params![document_id.as_bytes().as_slice()],
            |row| read_document(row).map_err(tunnel),
        )?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(StorageError::Sqlite(e)),
            None => Ok(None),
        }
    }

    fn list_documents(&self) -> Result<Vec<DocumentRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, document_type, language, current_version FROM documents ORDER BY created_at, document_id",
        )?;
        let records = stmt
            .query_map([], |row| read_document(row).map_err(tunnel))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn append(
        &mut self,
        document_id: DocumentId,
        content: &str,
        source: VersionSource,
        note: Option<&str>,
    ) -> Result<Version, StorageError> {
        let tx = self.conn.transaction()?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT current_version FROM documents WHERE document_id = ?1",
                rusqlite::params![document_id.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        let current = match current {
            Some(n) => from_sql_number(n)?,
            None => return Err(StorageError::DocumentNotFound(document_id.to_string())),
        };
        let number = current + 1;

        let version = insert_version(&tx, document_id, number, content, source, note)?;

        let updated = tx.execute(
            "UPDATE documents SET current_version = ?1 WHERE document_id = ?2 AND current_version = ?3",
            rusqlite::params![
                to_sql_number(number)?,
                document_id.as_bytes().as_slice(),
                to_sql_number(current)?,
            ],
        )?;
        if updated != 1 {
            return Err(StorageError::ConstraintViolation(format!(
                "current_version of {document_id} moved during append"
            )));
        }

        tx.commit()?;
        debug!(%document_id, number, source = source.as_str(), "version appended");
        Ok(version)
    }

    fn get_version(
        &self,
        document_id: DocumentId,
        number: u64,
    ) -> Result<Option<Version>, StorageError> {
        // Anything past i64::MAX cannot exist.
        let Ok(number) = i64::try_from(number) else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM versions WHERE document_id = ?1 AND number = ?2"
        ))?;
        let mut rows = stmt.query(rusqlite::params![document_id.as_bytes().as_slice(), number])?;
        rows.next()?.map(read_version).transpose()
    }

    fn get_latest(&self, document_id: DocumentId) -> Result<Option<Version>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT v.document_id, v.number, v.content, v.content_hash, v.source, v.note, v.created_at
             FROM versions v JOIN documents d ON d.document_id = v.document_id
             WHERE v.document_id = ?1 AND v.number = d.current_version",
        )?;
        let mut rows = stmt.query(rusqlite::params![document_id.as_bytes().as_slice()])?;
        rows.next()?.map(read_version).transpose()
    }

    fn list_versions(&self, document_id: DocumentId) -> Result<Vec<Version>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM versions WHERE document_id = ?1 ORDER BY number"
        ))?;
        // Rows are decoded outside query_map so a hash mismatch keeps its own error.
        let mut rows = stmt.query(rusqlite::params![document_id.as_bytes().as_slice()])?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next()? {
            versions.push(read_version(row)?);
        }
        Ok(versions)
    }
}

/// Wrapper error type used to tunnel StorageError through rusqlite's error system
/// in query_map closures that must return rusqlite::Error.
#[derive(Debug)]
struct OpaqueStorageError(String);

impl std::fmt::Display for OpaqueStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OpaqueStorageError {}
