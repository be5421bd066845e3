use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::DocumentId;

/// Affects formatting conventions of callers only; the engine treats both alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Code,
    Prose,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Prose => "prose",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "code" => Ok(Self::Code),
            "prose" => Ok(Self::Prose),
            _ => Err(CoreError::UnknownVariant {
                kind: "document type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub document_type: DocumentType,
    /// Carried through versions, never interpreted.
    pub language: Option<String>,
    pub current_version: u64,
}
