//! Case backend access.
//!
//! [`CaseApi`] is the seam between review sessions and the REST backend.
//! [`HttpCaseApi`] talks to the real service; tests substitute their own
//! implementations.

mod http;

use async_trait::async_trait;

use crate::cases::record::{CaseId, CaseRecord, UpdateCasePayload};
use crate::error::CaseApiError;

pub use http::HttpCaseApi;

#[async_trait]
pub trait CaseApi: Send + Sync {
    async fn get_case(&self, case_id: &CaseId) -> Result<CaseRecord, CaseApiError>;

    /// Apply a partial update. The raw response body is returned because
    /// callers only inspect parts of it and must tolerate unexpected shapes.
    async fn update_case(
        &self,
        case_id: &CaseId,
        payload: &UpdateCasePayload,
    ) -> Result<serde_json::Value, CaseApiError>;
}
