//! Decides which suggestions are shown and which may be applied.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::cases::locks::LockManager;
use crate::cases::record::CaseRecord;
use crate::cases::registry::{DisplayGroup, FieldRegistry};
use crate::cases::store::SuggestionStore;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Extraction noise: null, zero, and empty strings/arrays/objects.
pub fn is_noise(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) => false,
    }
}

pub fn is_date_field(field: &str) -> bool {
    field.to_ascii_lowercase().contains("date")
}

/// Calendar day named by a date-like JSON string.
pub fn parse_calendar_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Whether `suggested` is equivalent to the stored value for `field`.
pub fn is_redundant(field: &str, suggested: &Value, current: Option<&Value>) -> bool {
    let Some(current) = current.filter(|v| !v.is_null()) else {
        return false;
    };

    if is_date_field(field) {
        return match (parse_calendar_date(suggested), parse_calendar_date(current)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    }

    match (suggested, current) {
        (Value::String(a), Value::String(b)) => {
            a.trim().to_lowercase() == b.trim().to_lowercase()
        }
        _ => suggested == current,
    }
}

/// Known field, not noise, and not already stored on the case.
pub fn is_reviewable(
    registry: &FieldRegistry,
    record: &CaseRecord,
    field: &str,
    value: &Value,
) -> bool {
    let Some(spec) = registry.get(field) else {
        return false;
    };
    !is_noise(value) && !is_redundant(field, value, record.current_value(spec))
}

/// Locked fields are never applied, whatever the reviewer checked.
pub fn is_applicable(locks: &LockManager, field: &str) -> bool {
    !locks.is_locked(field)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub field: String,
    pub label: String,
    pub group: DisplayGroup,
    pub editable: bool,
    pub suggested: Value,
    pub current: Option<Value>,
    pub accepted: bool,
    pub locked: bool,
    pub lock_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReview {
    pub doc_key: String,
    pub items: Vec<ReviewItem>,
}

/// Visible suggestions grouped by source document. Documents with nothing
/// visible are omitted.
pub fn build_review(
    registry: &FieldRegistry,
    record: &CaseRecord,
    store: &SuggestionStore,
    locks: &LockManager,
) -> Vec<DocumentReview> {
    let mut out = Vec::new();
    for (doc_key, fields) in store.pending() {
        let mut items: Vec<ReviewItem> = fields
            .iter()
            .filter(|(field, _)| !store.is_dismissed(doc_key, field))
            .filter(|(field, value)| is_reviewable(registry, record, field, value))
            .filter_map(|(field, value)| {
                let spec = registry.get(field)?;
                Some(ReviewItem {
                    field: field.clone(),
                    label: spec.label.clone(),
                    group: spec.group,
                    editable: spec.editable,
                    suggested: value.clone(),
                    current: record.current_value(spec).cloned(),
                    accepted: store.is_accepted(doc_key, field),
                    locked: locks.is_locked(field),
                    lock_pending: locks.is_pending(field),
                })
            })
            .collect();
        if items.is_empty() {
            continue;
        }
        items.sort_by_key(|item| registry.position(&item.field));
        out.push(DocumentReview {
            doc_key: doc_key.clone(),
            items,
        });
    }
    out
}

pub fn visible_count(review: &[DocumentReview]) -> usize {
    review.iter().map(|doc| doc.items.len()).sum()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        build_review, is_noise, is_redundant, is_reviewable, parse_calendar_date, visible_count,
    };
    use crate::cases::locks::LockManager;
    use crate::cases::record::{CaseRecord, LockedFields};
    use crate::cases::registry::FieldRegistry;
    use crate::cases::store::SuggestionStore;

    fn record(value: serde_json::Value) -> CaseRecord {
        serde_json::from_value(value).expect("record")
    }

    #[test]
    fn noise_values_are_filtered() {
        for value in [json!(null), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(is_noise(&value), "{value} should be noise");
        }
        for value in [json!(false), json!(1), json!(" "), json!(["a"]), json!({"a": 1})] {
            assert!(!is_noise(&value), "{value} should not be noise");
        }
    }

    #[test]
    fn date_formats_resolve_to_the_same_day() {
        let iso = json!("2024-03-01");
        for other in [
            "March 1, 2024",
            "03/01/2024",
            "3/1/2024",
            "Mar 1, 2024",
            "1 March 2024",
            "2024-03-01T15:30:00Z",
            "2024-03-01T00:00:00.000",
            "2024/03/01",
        ] {
            assert!(
                is_redundant("filing_date", &json!(other), Some(&iso)),
                "{other} should match 2024-03-01"
            );
        }
        assert!(!is_redundant("filing_date", &json!("2024-03-02"), Some(&iso)));
    }

    #[test]
    fn unparseable_dates_are_never_redundant() {
        assert_eq!(parse_calendar_date(&json!("sometime in spring")), None);
        assert!(!is_redundant(
            "trial_date",
            &json!("TBD"),
            Some(&json!("TBD"))
        ));
    }

    #[test]
    fn strings_compare_trimmed_and_case_insensitive() {
        assert!(is_redundant(
            "judge",
            &json!("  HON. Smith "),
            Some(&json!("hon. smith"))
        ));
        assert!(!is_redundant(
            "judge",
            &json!("Hon. Smyth"),
            Some(&json!("Hon. Smith"))
        ));
    }

    #[test]
    fn structured_values_compare_deeply() {
        let current = json!({"name": "Jane", "bar": 123});
        assert!(is_redundant(
            "plaintiff_counsel_info",
            &json!({"bar": 123, "name": "Jane"}),
            Some(&current)
        ));
        assert!(!is_redundant("demand_amount", &json!(5000), Some(&json!("5000"))));
        assert!(!is_redundant("judge", &json!("Hon. X"), None));
        assert!(!is_redundant("judge", &json!("Hon. X"), Some(&json!(null))));
    }

    #[test]
    fn redundant_filing_date_is_not_reviewable() {
        let registry = FieldRegistry::bundled().expect("registry");
        let case = record(json!({"id": 1, "filing_date": "2024-01-01"}));
        assert!(!is_reviewable(
            registry,
            &case,
            "filing_date",
            &json!("01/01/2024")
        ));
        assert!(!is_reviewable(registry, &case, "not_a_field", &json!("x")));
    }

    #[test]
    fn review_hides_noise_redundant_and_dismissed_but_flags_locks() {
        let registry = FieldRegistry::bundled().expect("registry");
        let case = record(json!({
            "id": 1,
            "judge": "Hon. Smith",
            "filing_date": "2024-01-01",
            "case_details": {
                "pending_suggestions": {
                    "doc1": {
                        "filing_date": "01/01/2024",
                        "judge": "Hon. X",
                        "county": "",
                        "plaintiff_counsel_info": "Jane Doe, Esq.",
                        "case_type": "Tort",
                        "mystery": "value"
                    },
                    "doc2": {"demand_amount": 0}
                }
            }
        }));
        let mut store = SuggestionStore::new(case.case_details.pending_suggestions.clone());
        store.dismiss("doc1", "case_type");
        let locks = LockManager::new(LockedFields::from(["judge".to_string()]));

        let review = build_review(registry, &case, &store, &locks);
        assert_eq!(review.len(), 1);
        let fields: Vec<&str> = review[0].items.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["judge", "plaintiff_counsel_info"]);
        assert!(review[0].items[0].locked);
        assert_eq!(visible_count(&review), 2);
    }

    #[test]
    fn review_serializes_with_group_keys() {
        let registry = FieldRegistry::bundled().expect("registry");
        let case = record(json!({
            "id": 1,
            "case_details": {"pending_suggestions": {"doc1": {"judge": "Hon. X"}}}
        }));
        let store = SuggestionStore::new(case.case_details.pending_suggestions.clone());

        let review = build_review(registry, &case, &store, &LockManager::default());
        let body = serde_json::to_value(&review).expect("serialize");

        assert_eq!(body[0]["doc_key"], json!("doc1"));
        assert_eq!(body[0]["items"][0]["group"], json!("court"));
        assert_eq!(body[0]["items"][0]["current"], json!(null));
        assert_eq!(body[0]["items"][0]["locked"], json!(false));
    }
}
