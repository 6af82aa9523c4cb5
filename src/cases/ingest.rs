//! Merging analysis output into a case's pending suggestions.

use std::future::Future;
use std::time::Duration;

use crate::cases::reconcile::is_noise;
use crate::cases::record::{CaseDetails, FieldValues};
use crate::config::SuggestionConfig;
use crate::error::CaseApiError;

/// Merge one analysis run into `pending_suggestions[doc_key]`. Newer values
/// replace same-named entries; noise is dropped. Returns the number of
/// entries merged.
pub fn merge_document_suggestions(
    details: &mut CaseDetails,
    doc_key: &str,
    suggestions: FieldValues,
) -> usize {
    let kept: FieldValues = suggestions
        .into_iter()
        .filter(|(_, value)| !is_noise(value))
        .collect();
    if kept.is_empty() {
        return 0;
    }
    let merged = kept.len();
    details
        .pending_suggestions
        .entry(doc_key.to_string())
        .or_default()
        .extend(kept);
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub attempts: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SuggestionConfig) -> Self {
        Self {
            attempts: config.ingest_retry_attempts.max(1),
            backoff: config.ingest_retry_backoff,
        }
    }
}

/// Run `op`, retrying only transient connection failures.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, CaseApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CaseApiError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient_connection() && attempt < policy.attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.attempts,
                    "Transient backend error during {}: {}; retrying",
                    what,
                    err
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
