//! Configuration resolved from settings plus environment overrides.

mod case;
pub(crate) mod helpers;

pub use case::{AuditConfig, CaseApiConfig, ReconcileConfig, SuggestionConfig, UpdateMethod};
