use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    UserEdit,
    AiEdit,
    ConflictResolution,
}

impl VersionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserEdit => "user_edit",
            Self::AiEdit => "ai_edit",
            Self::ConflictResolution => "conflict_resolution",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "user_edit" => Ok(Self::UserEdit),
            "ai_edit" => Ok(Self::AiEdit),
            "conflict_resolution" => Ok(Self::ConflictResolution),
            _ => Err(CoreError::UnknownVariant {
                kind: "version source",
                value: s.to_string(),
            }),
        }
    }
}

/// An immutable, numbered full-content snapshot of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub document_id: DocumentId,
    /// Contiguous from 1 per document, assigned by the store.
    pub number: u64,
    pub content: String,
    pub source: VersionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            number: self.number,
            source: self.source,
            note: self.note.clone(),
            created_at: self.created_at,
        }
    }
}

/// History-list entry without the content body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub number: u64,
    pub source: VersionSource,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Current time truncated to the millisecond precision versions are stored at.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>, CoreError> {
    DateTime::from_timestamp_millis(ms).ok_or(CoreError::InvalidTimestamp(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_parse_roundtrip() {
        for source in [
            VersionSource::UserEdit,
            VersionSource::AiEdit,
            VersionSource::ConflictResolution,
        ] {
            assert_eq!(VersionSource::parse(source.as_str()).unwrap(), source);
        }
        match VersionSource::parse("agent") {
            Err(CoreError::UnknownVariant { kind, value }) => {
                assert_eq!(kind, "version source");
                assert_eq!(value, "agent");
            }
            other => panic!("expected UnknownVariant, got {other:?}"),
        }
    }

    #[test]
    fn persisted_shape_matches_record_layout() {
        let version = Version {
            document_id: DocumentId::new(),
            number: 4,
            content: "Z".into(),
            source: VersionSource::AiEdit,
            note: None,
            created_at: now_millis(),
        };
        let json = serde_json::to_value(&version).unwrap();
        let obj = json.as_object().unwrap();
        for key in ["documentId", "number", "content", "source", "createdAt"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert!(!obj.contains_key("note"));
        assert_eq!(json["source"], "ai_edit");

        let back: Version = serde_json::from_value(json).unwrap();
        assert_eq!(back, version);
    }

    #[test]
    fn millis_roundtrip_is_lossless_after_truncation() {
        let now = now_millis();
        assert_eq!(from_millis(now.timestamp_millis()).unwrap(), now);
    }
}
