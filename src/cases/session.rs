//! A review session over one case.
//!
//! The session holds the working copy of the case plus the reviewer's
//! decisions and lock state. Every write to the case goes through one async
//! queue and builds its payload only once it reaches the front, so two
//! writes never send `case_details` computed from the same stale snapshot.
//! Reloading or closing the session bumps a generation counter; responses
//! that come back for an older generation are discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use crate::api::CaseApi;
use crate::audit::{AuditAction, AuditLog};
use crate::cases::apply::{plan_apply, plan_clear, plan_lock_update};
use crate::cases::ingest::{RetryPolicy, merge_document_suggestions, retry_transient};
use crate::cases::locks::{LockManager, LockState};
use crate::cases::reconcile::{DocumentReview, build_review, visible_count};
use crate::cases::record::{
    CaseId, CaseRecord, FieldValues, LockedFields, UpdateCasePayload, echoed_locked_fields,
};
use crate::cases::registry::FieldRegistry;
use crate::cases::store::SuggestionStore;
use crate::config::SuggestionConfig;
use crate::error::{CaseApiError, ReconcileError};

/// Result of a successful Apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub skipped_locked: usize,
    pub removed_documents: Vec<String>,
    /// False when the update succeeded but the follow-up fetch did not.
    pub refreshed: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    record: Option<CaseRecord>,
    store: SuggestionStore,
    locks: LockManager,
    generation: u64,
}

impl SessionState {
    fn record(&self) -> Result<&CaseRecord, ReconcileError> {
        self.record.as_ref().ok_or(ReconcileError::NoCaseLoaded)
    }

    /// Take a newer copy of the same case, written or read inside the write
    /// queue. Lock state and the generation are kept, so queued writes still
    /// go through; review decisions are dropped.
    fn absorb(&mut self, record: CaseRecord) {
        self.store
            .reset(record.case_details.pending_suggestions.clone());
        self.record = Some(record);
    }
}

pub struct ReviewSession {
    api: Arc<dyn CaseApi>,
    registry: Arc<FieldRegistry>,
    config: SuggestionConfig,
    audit: Option<Arc<AuditLog>>,
    state: Mutex<SessionState>,
    writes: tokio::sync::Mutex<()>,
}

impl ReviewSession {
    pub fn new(
        api: Arc<dyn CaseApi>,
        registry: Arc<FieldRegistry>,
        config: SuggestionConfig,
    ) -> Self {
        Self {
            api,
            registry,
            config,
            audit: None,
            state: Mutex::new(SessionState::default()),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_audit(&self, action: AuditAction, case_id: &CaseId, details: Value) {
        if let Some(audit) = &self.audit {
            audit.record(action, case_id, details);
        }
    }

    /// Fetch a case and start a fresh review of it.
    pub async fn load(&self, case_id: &CaseId) -> Result<(), ReconcileError> {
        let record = self.api.get_case(case_id).await?;
        self.replace_record(record);
        Ok(())
    }

    /// Re-fetch the loaded case. Review decisions are discarded.
    pub async fn refresh(&self) -> Result<(), ReconcileError> {
        let case_id = self.case_id().ok_or(ReconcileError::NoCaseLoaded)?;
        self.load(&case_id).await
    }

    /// Swap in a new backing record, re-seeding locks from it and dropping
    /// accepted and dismissed state.
    pub fn replace_record(&self, record: CaseRecord) {
        let mut state = self.state();
        state
            .store
            .reset(record.case_details.pending_suggestions.clone());
        state.locks.reset(record.case_details.locked_fields.clone());
        state.record = Some(record);
        state.generation += 1;
    }

    /// Drop the case. In-flight operations finish without touching state.
    pub fn close(&self) {
        let mut state = self.state();
        let generation = state.generation + 1;
        *state = SessionState {
            generation,
            ..SessionState::default()
        };
    }

    pub fn case_id(&self) -> Option<CaseId> {
        self.state().record.as_ref().map(|r| r.id.clone())
    }

    pub fn record(&self) -> Option<CaseRecord> {
        self.state().record.clone()
    }

    pub fn review(&self) -> Result<Vec<DocumentReview>, ReconcileError> {
        let state = self.state();
        let record = state.record()?;
        Ok(build_review(
            &self.registry,
            record,
            &state.store,
            &state.locks,
        ))
    }

    pub fn suggestion_count(&self) -> Result<usize, ReconcileError> {
        Ok(visible_count(&self.review()?))
    }

    pub fn accepted_count(&self) -> usize {
        self.state().store.accepted_count()
    }

    pub fn record_acceptance(
        &self,
        doc_key: &str,
        field: &str,
        value: Value,
        checked: bool,
    ) -> Result<bool, ReconcileError> {
        let mut state = self.state();
        state.record()?;
        if !self.registry.is_displayable(field) {
            return Err(ReconcileError::UnknownField(field.to_string()));
        }
        Ok(state.store.record_acceptance(doc_key, field, value, checked))
    }

    /// Accept every visible suggestion from one document.
    pub fn accept_all(&self, doc_key: &str) -> Result<usize, ReconcileError> {
        let review = self.review()?;
        let mut state = self.state();
        let mut accepted = 0;
        for doc in review.into_iter().filter(|doc| doc.doc_key == doc_key) {
            for item in doc.items {
                if state
                    .store
                    .record_acceptance(doc_key, &item.field, item.suggested, true)
                {
                    accepted += 1;
                }
            }
        }
        Ok(accepted)
    }

    pub fn dismiss(&self, doc_key: &str, field: &str) -> Result<(), ReconcileError> {
        let mut state = self.state();
        state.record()?;
        state.store.dismiss(doc_key, field);
        Ok(())
    }

    pub fn is_locked(&self, field: &str) -> bool {
        self.state().locks.is_locked(field)
    }

    /// While true, the lock control for `field` must stay disabled.
    pub fn is_lock_pending(&self, field: &str) -> bool {
        self.state().locks.is_pending(field)
    }

    pub fn locked_fields(&self) -> LockedFields {
        self.state().locks.locked_fields().clone()
    }

    /// Flip the lock on `field` and persist the new lock set.
    ///
    /// The new state is visible immediately. If the save fails the field goes
    /// back to exactly the state it had before this call.
    pub async fn toggle_lock(&self, field: &str) -> Result<LockState, ReconcileError> {
        let (case_id, transition, generation) = {
            let mut state = self.state();
            let case_id = state.record()?.id.clone();
            if self.registry.get(field).is_none() {
                return Err(ReconcileError::UnknownField(field.to_string()));
            }
            let transition = state.locks.begin_toggle(field)?;
            (case_id, transition, state.generation)
        };

        let _write = self.writes.lock().await;
        let payload = {
            let state = self.state();
            if state.generation != generation {
                return Err(ReconcileError::Stale);
            }
            plan_lock_update(state.record()?, &state.locks)
        };

        let result = self.api.update_case(&case_id, &payload).await;

        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!(case_id = %case_id, field, "Discarding lock result for reloaded case");
            return Err(ReconcileError::Stale);
        }
        match result {
            Ok(response) => {
                state.locks.commit(&transition);
                check_lock_echo(&case_id, &payload, &response);
                drop(state);
                tracing::info!(
                    case_id = %case_id,
                    field,
                    state = transition.next.as_str(),
                    "Field lock saved"
                );
                self.record_audit(
                    AuditAction::FieldLockChanged,
                    &case_id,
                    json!({"field": field, "state": transition.next.as_str()}),
                );
                Ok(transition.next)
            }
            Err(err) => {
                state.locks.rollback(&transition);
                tracing::warn!(case_id = %case_id, field, "Lock change failed, rolled back: {}", err);
                Err(err.into())
            }
        }
    }

    /// Write every accepted, unlocked suggestion to the case in one update.
    ///
    /// `Ok(None)` means nothing was accepted and no request was made. On
    /// failure the accepted set is kept so the review is not lost. On
    /// success the local case takes the written values before the case is
    /// re-read, and both happen before the next queued write starts.
    pub async fn apply(&self) -> Result<Option<ApplyOutcome>, ReconcileError> {
        let (case_id, generation) = {
            let state = self.state();
            let case_id = state.record()?.id.clone();
            if state.store.accepted_count() == 0 {
                return Ok(None);
            }
            (case_id, state.generation)
        };

        let write = self.writes.lock().await;
        let plan = {
            let state = self.state();
            if state.generation != generation {
                return Err(ReconcileError::Stale);
            }
            // Locks are read here, not when the suggestions were accepted.
            plan_apply(
                &self.registry,
                state.record()?,
                state.store.accepted(),
                &state.locks,
                self.config.max_length,
            )
        };
        let Some(plan) = plan else {
            return Ok(None);
        };

        if let Err(err) = self.api.update_case(&case_id, &plan.payload).await {
            tracing::warn!(case_id = %case_id, "Apply failed, accepted suggestions kept: {}", err);
            return Err(err.into());
        }

        {
            let mut state = self.state();
            if state.generation != generation {
                return Err(ReconcileError::Stale);
            }
            // Writes queued behind this one must build on the applied case.
            let mut record = state.record()?.clone();
            plan.payload.merge_into(&mut record);
            state.absorb(record);
        }

        tracing::info!(
            case_id = %case_id,
            applied = plan.applied.len(),
            skipped_locked = plan.skipped_locked.len(),
            removed_documents = plan.removed_documents.len(),
            "Applied suggestions"
        );
        self.record_audit(
            AuditAction::SuggestionsApplied,
            &case_id,
            json!({
                "applied": plan.applied.iter().map(|(doc, field)| json!({"doc_key": doc, "field": field})).collect::<Vec<_>>(),
                "skipped_locked": plan.skipped_locked.iter().map(|(_, field)| field).collect::<Vec<_>>(),
                "removed_documents": &plan.removed_documents,
            }),
        );

        let refreshed = match self.api.get_case(&case_id).await {
            Ok(record) => {
                let mut state = self.state();
                if state.generation == generation {
                    state.absorb(record);
                }
                true
            }
            Err(err) => {
                tracing::warn!(case_id = %case_id, "Refetch after apply failed: {}", err);
                false
            }
        };
        drop(write);

        Ok(Some(ApplyOutcome {
            applied: plan.applied.len(),
            skipped_locked: plan.skipped_locked.len(),
            removed_documents: plan.removed_documents,
            refreshed,
        }))
    }

    /// Discard every pending suggestion on the case.
    pub async fn clear(&self) -> Result<(), ReconcileError> {
        let (case_id, generation) = {
            let state = self.state();
            (state.record()?.id.clone(), state.generation)
        };

        let _write = self.writes.lock().await;
        let payload = {
            let state = self.state();
            if state.generation != generation {
                return Err(ReconcileError::Stale);
            }
            plan_clear(state.record()?, &state.locks)
        };

        self.api.update_case(&case_id, &payload).await?;

        let mut state = self.state();
        if state.generation != generation {
            return Err(ReconcileError::Stale);
        }
        let SessionState { record, store, .. } = &mut *state;
        if let Some(record) = record.as_mut() {
            record.case_details.pending_suggestions.clear();
        }
        store.reset(Default::default());
        drop(state);

        tracing::info!(case_id = %case_id, "Cleared pending suggestions");
        self.record_audit(AuditAction::SuggestionsCleared, &case_id, json!({}));
        Ok(())
    }

    /// Merge one analysis run's output into the loaded case.
    ///
    /// The case is re-read before merging so suggestions written by other
    /// runs are kept. Transient backend connection errors are retried per
    /// the configured policy. Returns the number of suggestions merged.
    pub async fn ingest_analysis(
        &self,
        doc_key: &str,
        suggestions: FieldValues,
    ) -> Result<usize, ReconcileError> {
        let (case_id, generation) = {
            let state = self.state();
            (state.record()?.id.clone(), state.generation)
        };
        let policy = RetryPolicy::from_config(&self.config);
        let api = &self.api;
        let id = &case_id;

        let _write = self.writes.lock().await;
        let (merged, record) = retry_transient(policy, "suggestion ingest", || {
            let suggestions = suggestions.clone();
            async move {
                let mut record = api.get_case(id).await?;
                let merged =
                    merge_document_suggestions(&mut record.case_details, doc_key, suggestions);
                if merged > 0 {
                    let payload = UpdateCasePayload::details_only(record.case_details.clone());
                    api.update_case(id, &payload).await?;
                }
                Ok::<_, CaseApiError>((merged, record))
            }
        })
        .await?;

        {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(case_id = %case_id, doc_key, "Discarding ingest result for reloaded case");
                return Err(ReconcileError::Stale);
            }
            state.absorb(record);
        }
        if merged > 0 {
            tracing::info!(case_id = %case_id, doc_key, merged, "Ingested analysis suggestions");
            self.record_audit(
                AuditAction::SuggestionsIngested,
                &case_id,
                json!({"doc_key": doc_key, "merged": merged}),
            );
        }
        Ok(merged)
    }
}

/// Log when a successful lock update does not echo the lock set we sent.
/// The local state stays authoritative either way.
fn check_lock_echo(case_id: &CaseId, payload: &UpdateCasePayload, response: &Value) {
    let sent = payload
        .case_details
        .as_ref()
        .map(|details| &details.locked_fields);
    match echoed_locked_fields(response) {
        Some(echoed) if Some(&echoed) == sent => {}
        Some(echoed) => tracing::warn!(
            case_id = %case_id,
            echoed = ?echoed,
            "Lock update response disagrees with the saved lock set; keeping local state"
        ),
        None => tracing::warn!(
            case_id = %case_id,
            "Lock update response has no locked_fields list; keeping local state"
        ),
    }
}
