//! Builds the single update payload for Apply and Clear.

use serde_json::Value;

use crate::cases::locks::LockManager;
use crate::cases::reconcile::{is_applicable, is_reviewable};
use crate::cases::record::{CaseRecord, FieldValues, PendingSuggestions, UpdateCasePayload};
use crate::cases::registry::{FieldRegistry, FieldStorage};
use crate::cases::store::DocFieldMap;

/// Default cap on accepted string values.
pub const DEFAULT_MAX_SUGGESTION_LENGTH: usize = 200;

/// What an Apply will send, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyPlan {
    pub payload: UpdateCasePayload,
    /// `(doc_key, field)` written to the case.
    pub applied: Vec<(String, String)>,
    /// `(doc_key, field)` accepted but skipped because the field is locked.
    pub skipped_locked: Vec<(String, String)>,
    /// `(doc_key, field)` accepted but not in the registry.
    pub skipped_unknown: Vec<(String, String)>,
    /// Document keys removed from `pending_suggestions`.
    pub removed_documents: Vec<String>,
}

/// Truncate strings to `max_chars` characters. Other values pass through.
pub fn truncate_value(value: &Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) if s.chars().count() > max_chars => {
            Value::String(s.chars().take(max_chars).collect())
        }
        other => other.clone(),
    }
}

/// Plan an Apply of `accepted` against `record`.
///
/// Returns `None` when nothing is accepted. Locks are read from `locks` at
/// call time.
pub fn plan_apply(
    registry: &FieldRegistry,
    record: &CaseRecord,
    accepted: &DocFieldMap<Value>,
    locks: &LockManager,
    max_chars: usize,
) -> Option<ApplyPlan> {
    if accepted.values().all(|fields| fields.is_empty()) {
        return None;
    }

    let mut columns = FieldValues::new();
    let mut details = record.case_details.clone();
    let mut applied = Vec::new();
    let mut skipped_locked = Vec::new();
    let mut skipped_unknown = Vec::new();

    for (doc_key, fields) in accepted {
        for (field, value) in fields {
            let entry = (doc_key.clone(), field.clone());
            if !is_applicable(locks, field) {
                tracing::debug!(doc_key = %doc_key, field = %field, "Skipping locked field");
                skipped_locked.push(entry);
                continue;
            }
            let Some(spec) = registry.get(field) else {
                tracing::warn!(doc_key = %doc_key, field = %field, "Skipping unregistered field");
                skipped_unknown.push(entry);
                continue;
            };
            let value = truncate_value(value, max_chars);
            match spec.storage {
                FieldStorage::Dedicated => {
                    columns.insert(field.clone(), value);
                }
                FieldStorage::Details => {
                    details.fields.insert(field.clone(), value);
                }
            }
            applied.push(entry);
        }
    }

    let (pending, removed_documents) =
        prune_processed(registry, record, &record.case_details.pending_suggestions, accepted);
    details.pending_suggestions = pending;
    details.locked_fields = locks.locked_fields().clone();

    Some(ApplyPlan {
        payload: UpdateCasePayload {
            columns,
            case_details: Some(details),
        },
        applied,
        skipped_locked,
        skipped_unknown,
        removed_documents,
    })
}

/// Drop every processed field from its document. A document keeps only the
/// entries that are still reviewable; documents left with none are removed.
fn prune_processed(
    registry: &FieldRegistry,
    record: &CaseRecord,
    pending: &PendingSuggestions,
    accepted: &DocFieldMap<Value>,
) -> (PendingSuggestions, Vec<String>) {
    let mut next = PendingSuggestions::new();
    let mut removed = Vec::new();

    for (doc_key, fields) in pending {
        let Some(processed) = accepted.get(doc_key) else {
            next.insert(doc_key.clone(), fields.clone());
            continue;
        };
        let remaining: FieldValues = fields
            .iter()
            .filter(|(field, _)| !processed.contains_key(*field))
            .filter(|(field, value)| is_reviewable(registry, record, field, value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        if remaining.is_empty() {
            removed.push(doc_key.clone());
        } else {
            next.insert(doc_key.clone(), remaining);
        }
    }

    (next, removed)
}

/// Payload that empties `pending_suggestions` and leaves everything else
/// as-is. Dedicated columns are not sent.
pub fn plan_clear(record: &CaseRecord, locks: &LockManager) -> UpdateCasePayload {
    let mut details = record.case_details.clone();
    details.pending_suggestions = PendingSuggestions::new();
    details.locked_fields = locks.locked_fields().clone();
    UpdateCasePayload::details_only(details)
}

/// Payload persisting the current lock set.
pub fn plan_lock_update(record: &CaseRecord, locks: &LockManager) -> UpdateCasePayload {
    let mut details = record.case_details.clone();
    details.locked_fields = locks.locked_fields().clone();
    UpdateCasePayload::details_only(details)
}
