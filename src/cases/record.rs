//! Wire model for case records and update payloads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cases::registry::{FieldSpec, FieldStorage};

pub const PENDING_SUGGESTIONS_KEY: &str = "pending_suggestions";
pub const LOCKED_FIELDS_KEY: &str = "locked_fields";

/// Field name -> value.
pub type FieldValues = BTreeMap<String, Value>;
/// Document key -> suggested field values from that analysis run.
pub type PendingSuggestions = BTreeMap<String, FieldValues>;
pub type LockedFields = BTreeSet<String>;

/// Backend case identifier. Accepts JSON strings or integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CaseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(D::Error::custom(format!(
                "case id must be a string or integer, got {other}"
            ))),
        }
    }
}

/// A case as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub case_details: CaseDetails,
    /// Dedicated top-level columns.
    #[serde(flatten)]
    pub columns: FieldValues,
}

/// Nested details blob. Holds the reserved review keys plus every
/// non-dedicated field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseDetails {
    #[serde(default, deserialize_with = "lenient_pending")]
    pub pending_suggestions: PendingSuggestions,
    #[serde(default, deserialize_with = "lenient_locked")]
    pub locked_fields: LockedFields,
    #[serde(flatten)]
    pub fields: FieldValues,
}

impl CaseRecord {
    /// Stored value for a registered field, from its storage location.
    pub fn current_value(&self, spec: &FieldSpec) -> Option<&Value> {
        match spec.storage {
            FieldStorage::Dedicated => self.columns.get(&spec.name),
            FieldStorage::Details => self.case_details.fields.get(&spec.name),
        }
    }
}

/// Partial update sent to the backend. `case_details`, when present, is
/// always the fully merged blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateCasePayload {
    #[serde(flatten)]
    pub columns: FieldValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_details: Option<CaseDetails>,
}

impl UpdateCasePayload {
    pub fn details_only(details: CaseDetails) -> Self {
        Self {
            columns: FieldValues::new(),
            case_details: Some(details),
        }
    }

    /// Apply this update to a local copy the way the backend does: columns
    /// overwrite, `case_details` is replaced whole.
    pub fn merge_into(&self, record: &mut CaseRecord) {
        record
            .columns
            .extend(self.columns.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(details) = &self.case_details {
            record.case_details = details.clone();
        }
    }
}

/// The `locked_fields` list echoed by an update response, if it has the
/// expected shape.
pub fn echoed_locked_fields(response: &Value) -> Option<LockedFields> {
    response
        .get("case_details")?
        .get(LOCKED_FIELDS_KEY)?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_pending<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<PendingSuggestions, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let docs = match raw {
        Value::Object(docs) => docs,
        Value::Null => return Ok(PendingSuggestions::new()),
        other => {
            tracing::warn!(
                "Ignoring malformed {} (expected object, got {})",
                PENDING_SUGGESTIONS_KEY,
                json_kind(&other)
            );
            return Ok(PendingSuggestions::new());
        }
    };

    let mut out = PendingSuggestions::new();
    for (doc_key, fields) in docs {
        match fields {
            Value::Object(fields) => {
                out.insert(doc_key, fields.into_iter().collect());
            }
            other => tracing::warn!(
                doc_key = %doc_key,
                "Ignoring malformed suggestions entry (expected object, got {})",
                json_kind(&other)
            ),
        }
    }
    Ok(out)
}

fn lenient_locked<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LockedFields, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        Value::Null => Ok(LockedFields::new()),
        other => {
            tracing::warn!(
                "Ignoring malformed {} (expected array, got {})",
                LOCKED_FIELDS_KEY,
                json_kind(&other)
            );
            Ok(LockedFields::new())
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CaseDetails, CaseId, CaseRecord, UpdateCasePayload, echoed_locked_fields};
    use crate::cases::registry::FieldRegistry;

    #[test]
    fn decodes_record_with_numeric_id_and_reserved_keys() {
        let record: CaseRecord = serde_json::from_value(json!({
            "id": 42,
            "judge": "Hon. Smith",
            "filing_date": "2024-01-01",
            "case_details": {
                "plaintiff_counsel_info": "Jane Roe",
                "pending_suggestions": {"doc1": {"judge": "Hon. X"}},
                "locked_fields": ["judge"]
            }
        }))
        .expect("record should decode");

        assert_eq!(record.id, CaseId::new("42"));
        assert_eq!(record.columns.get("judge"), Some(&json!("Hon. Smith")));
        assert!(record.case_details.locked_fields.contains("judge"));
        assert_eq!(
            record.case_details.pending_suggestions["doc1"]["judge"],
            json!("Hon. X")
        );
        assert_eq!(
            record.case_details.fields.get("plaintiff_counsel_info"),
            Some(&json!("Jane Roe"))
        );
        assert!(!record.case_details.fields.contains_key("locked_fields"));
    }

    #[test]
    fn null_details_and_malformed_reserved_keys_decode_as_empty() {
        let record: CaseRecord =
            serde_json::from_value(json!({"id": "c-1", "case_details": null}))
                .expect("null details should decode");
        assert_eq!(record.case_details, CaseDetails::default());

        let details: CaseDetails = serde_json::from_value(json!({
            "pending_suggestions": {"doc1": "oops", "doc2": {"county": "Kings"}},
            "locked_fields": "judge"
        }))
        .expect("malformed reserved keys should decode");
        assert!(details.locked_fields.is_empty());
        assert_eq!(details.pending_suggestions.len(), 1);
        assert!(details.pending_suggestions.contains_key("doc2"));
    }

    #[test]
    fn current_value_reads_from_storage_location() {
        let registry = FieldRegistry::bundled().expect("registry");
        let record: CaseRecord = serde_json::from_value(json!({
            "id": 1,
            "judge": "Hon. Smith",
            "case_details": {"county": "Kings", "judge": "shadow"}
        }))
        .expect("record");

        let judge = registry.get("judge").expect("judge");
        let county = registry.get("county").expect("county");
        assert_eq!(record.current_value(judge), Some(&json!("Hon. Smith")));
        assert_eq!(record.current_value(county), Some(&json!("Kings")));
    }

    #[test]
    fn merge_into_overwrites_columns_and_replaces_details() {
        let mut record: CaseRecord = serde_json::from_value(json!({
            "id": 1,
            "judge": "Hon. Smith",
            "case_name": "Roe v. Doe",
            "case_details": {
                "county": "Kings",
                "pending_suggestions": {"doc1": {"judge": "Hon. X"}}
            }
        }))
        .expect("record");
        let mut payload = UpdateCasePayload::details_only(
            serde_json::from_value(json!({"jurisdiction": "NY"})).expect("details"),
        );
        payload.columns.insert("judge".to_string(), json!("Hon. X"));

        payload.merge_into(&mut record);

        assert_eq!(record.columns["judge"], json!("Hon. X"));
        assert_eq!(record.columns["case_name"], json!("Roe v. Doe"));
        assert!(record.case_details.pending_suggestions.is_empty());
        assert!(!record.case_details.fields.contains_key("county"));
        assert_eq!(record.case_details.fields["jurisdiction"], json!("NY"));
    }

    #[test]
    fn payload_omits_details_when_absent() {
        let mut payload = UpdateCasePayload::default();
        payload.columns.insert("judge".to_string(), json!("Hon. X"));
        assert_eq!(
            serde_json::to_value(&payload).expect("serialize"),
            json!({"judge": "Hon. X"})
        );
    }

    #[test]
    fn echoed_locked_fields_requires_string_array() {
        assert_eq!(
            echoed_locked_fields(&json!({"case_details": {"locked_fields": ["judge"]}}))
                .map(|set| set.into_iter().collect::<Vec<_>>()),
            Some(vec!["judge".to_string()])
        );
        assert!(echoed_locked_fields(&json!({"case_details": {"locked_fields": [1]}})).is_none());
        assert!(echoed_locked_fields(&json!({"id": 1})).is_none());
    }
}
