//! Core data types: records, location index entries and change events.

use crate::decider::parse_created_at;
use crate::error::{TierError, TierResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque JSON document as stored in the hot tier and snapshotted to cold.
pub type Document = serde_json::Value;

/// Field carrying the record identifier inside a document.
pub const ID_FIELD: &str = "id";
/// Field carrying the creation timestamp inside a document.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Storage tier a record currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Hot,
    Cold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "HOT",
            Tier::Cold => "COLD",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "HOT" => Some(Tier::Hot),
            "COLD" => Some(Tier::Cold),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated record: identifier and UTC creation time extracted from its
/// document. The document itself is carried untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub document: Document,
}

impl Record {
    /// Validate a raw document and extract its identity.
    pub fn from_document(document: Document) -> TierResult<Self> {
        let obj = document
            .as_object()
            .ok_or_else(|| TierError::Validation("document is not a JSON object".to_string()))?;

        let id = match obj.get(ID_FIELD) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(TierError::Validation(format!(
                    "'{}' must be a string",
                    ID_FIELD
                )))
            }
            None => return Err(TierError::Validation(format!("missing '{}'", ID_FIELD))),
        };
        validate_record_id(&id)?;

        let created_at = match obj.get(CREATED_AT_FIELD) {
            Some(serde_json::Value::String(s)) => parse_created_at(s)?,
            Some(_) => {
                return Err(TierError::Validation(format!(
                    "'{}' of record '{}' must be a string",
                    CREATED_AT_FIELD, id
                )))
            }
            None => {
                return Err(TierError::Validation(format!(
                    "missing '{}' on record '{}'",
                    CREATED_AT_FIELD, id
                )))
            }
        };

        Ok(Self {
            id,
            created_at,
            document,
        })
    }
}

/// Reject identifiers that are empty or would escape their cold path segment.
pub fn validate_record_id(id: &str) -> TierResult<()> {
    if id.trim().is_empty() {
        return Err(TierError::Validation("record id is empty".to_string()));
    }
    if id.starts_with('.') {
        return Err(TierError::Validation(format!(
            "record id '{}' must not start with '.'",
            id
        )));
    }
    if id.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(TierError::Validation(format!(
            "record id '{}' contains a path separator or control character",
            id.escape_debug()
        )));
    }
    Ok(())
}

/// Best-effort identifier for logging documents that failed validation.
pub fn document_id_hint(document: &Document) -> Option<String> {
    document
        .get(ID_FIELD)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Value stored in the location index for a record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub tier: Tier,
    /// Present (and authoritative) only when `tier` is `Cold`.
    pub cold_path: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LocationEntry {
    pub fn cold(path: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            tier: Tier::Cold,
            cold_path: Some(path.into()),
            updated_at,
        }
    }

    pub fn hot(updated_at: DateTime<Utc>) -> Self {
        Self {
            tier: Tier::Hot,
            cold_path: None,
            updated_at,
        }
    }

    /// The cold path, if this entry points at the cold tier.
    pub fn resolvable_cold_path(&self) -> Option<&str> {
        match self.tier {
            Tier::Cold => self.cold_path.as_deref(),
            Tier::Hot => None,
        }
    }
}

/// Kind of mutation reported by the change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change notification: the document snapshot after the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub document: Document,
    pub kind: ChangeKind,
    /// How many times this event has been handed to a consumer.
    #[serde(default)]
    pub delivery_count: u32,
}

impl ChangeEvent {
    pub fn new(document: Document, kind: ChangeKind) -> Self {
        Self {
            document,
            kind,
            delivery_count: 0,
        }
    }

    pub fn upsert(document: Document) -> Self {
        Self::new(document, ChangeKind::Update)
    }
}

/// A record served by the retrieval coordinator, tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub document: Document,
    pub served_from: Tier,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_document_normalizes_timestamp() {
        let rec = Record::from_document(json!({
            "id": "R1",
            "createdAt": "2024-03-05T10:00:00+02:00",
            "amount": 12
        }))
        .unwrap();
        assert_eq!(rec.id, "R1");
        assert_eq!(rec.created_at.to_rfc3339(), "2024-03-05T08:00:00+00:00");
        assert_eq!(rec.document["amount"], 12);
    }

    #[test]
    fn test_record_requires_id_and_created_at() {
        let missing_id = Record::from_document(json!({"createdAt": "2024-01-01T00:00:00Z"}));
        assert!(matches!(missing_id, Err(TierError::Validation(_))));

        let missing_ts = Record::from_document(json!({"id": "x"}));
        assert!(matches!(missing_ts, Err(TierError::Validation(_))));

        let numeric_id = Record::from_document(json!({"id": 7, "createdAt": "2024-01-01"}));
        assert!(matches!(numeric_id, Err(TierError::Validation(_))));

        let not_object = Record::from_document(json!(["id", "x"]));
        assert!(matches!(not_object, Err(TierError::Validation(_))));
    }

    #[test]
    fn test_record_id_must_be_path_safe() {
        assert!(validate_record_id("inv-2024-001").is_ok());
        assert!(validate_record_id("").is_err());
        assert!(validate_record_id("   ").is_err());
        assert!(validate_record_id("../etc").is_err());
        assert!(validate_record_id("a/b").is_err());
        assert!(validate_record_id("a\\b").is_err());
        assert!(validate_record_id("a\nb").is_err());
    }

    #[test]
    fn test_hot_entry_ignores_stale_cold_path() {
        let mut entry = LocationEntry::hot(Utc::now());
        entry.cold_path = Some("billing/2020/01/01/x.json".into());
        assert_eq!(entry.resolvable_cold_path(), None);

        let cold = LocationEntry::cold("billing/2020/01/01/x.json", Utc::now());
        assert_eq!(cold.resolvable_cold_path(), Some("billing/2020/01/01/x.json"));
    }

    #[test]
    fn test_tier_round_trips_through_str() {
        assert_eq!(Tier::parse(Tier::Cold.as_str()), Some(Tier::Cold));
        assert_eq!(Tier::parse("WARM"), None);
    }
}
