//! Session-local review state: pending suggestions plus the reviewer's
//! accept and dismiss decisions.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::cases::record::PendingSuggestions;

/// Document key -> field name -> `V`.
pub type DocFieldMap<V> = BTreeMap<String, BTreeMap<String, V>>;

/// Copy of `map` with `doc_key.field` set to `value`.
pub fn with_entry<V: Clone>(
    map: &DocFieldMap<V>,
    doc_key: &str,
    field: &str,
    value: V,
) -> DocFieldMap<V> {
    let mut next = map.clone();
    next.entry(doc_key.to_string())
        .or_default()
        .insert(field.to_string(), value);
    next
}

/// Copy of `map` without `doc_key.field`. Documents left empty are dropped.
pub fn without_entry<V: Clone>(map: &DocFieldMap<V>, doc_key: &str, field: &str) -> DocFieldMap<V> {
    let mut next = map.clone();
    if let Some(fields) = next.get_mut(doc_key) {
        fields.remove(field);
        if fields.is_empty() {
            next.remove(doc_key);
        }
    }
    next
}

pub fn contains_entry<V>(map: &DocFieldMap<V>, doc_key: &str, field: &str) -> bool {
    map.get(doc_key)
        .is_some_and(|fields| fields.contains_key(field))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionStore {
    pending: PendingSuggestions,
    accepted: DocFieldMap<Value>,
    dismissed: DocFieldMap<()>,
}

impl SuggestionStore {
    pub fn new(pending: PendingSuggestions) -> Self {
        Self {
            pending,
            accepted: DocFieldMap::new(),
            dismissed: DocFieldMap::new(),
        }
    }

    /// Replace pending suggestions and drop every review decision.
    pub fn reset(&mut self, pending: PendingSuggestions) {
        *self = Self::new(pending);
    }

    pub fn pending(&self) -> &PendingSuggestions {
        &self.pending
    }

    pub fn accepted(&self) -> &DocFieldMap<Value> {
        &self.accepted
    }

    pub fn dismissed(&self) -> &DocFieldMap<()> {
        &self.dismissed
    }

    pub fn is_accepted(&self, doc_key: &str, field: &str) -> bool {
        contains_entry(&self.accepted, doc_key, field)
    }

    pub fn is_dismissed(&self, doc_key: &str, field: &str) -> bool {
        contains_entry(&self.dismissed, doc_key, field)
    }

    /// Check or uncheck a suggestion. Returns whether state changed.
    /// Dismissed suggestions cannot be accepted.
    pub fn record_acceptance(
        &mut self,
        doc_key: &str,
        field: &str,
        value: Value,
        checked: bool,
    ) -> bool {
        if checked {
            if self.is_dismissed(doc_key, field) {
                return false;
            }
            if self
                .accepted
                .get(doc_key)
                .and_then(|fields| fields.get(field))
                == Some(&value)
            {
                return false;
            }
            self.accepted = with_entry(&self.accepted, doc_key, field, value);
            true
        } else {
            if !self.is_accepted(doc_key, field) {
                return false;
            }
            self.accepted = without_entry(&self.accepted, doc_key, field);
            true
        }
    }

    /// Hide a suggestion for the rest of the session. The persisted pending
    /// entry is untouched.
    pub fn dismiss(&mut self, doc_key: &str, field: &str) {
        self.accepted = without_entry(&self.accepted, doc_key, field);
        self.dismissed = with_entry(&self.dismissed, doc_key, field, ());
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.values().map(BTreeMap::len).sum()
    }
}
