//! Suggestion review for case records.
//!
//! Analysis runs leave extracted field values on a case under
//! `case_details.pending_suggestions`. This module decides which of those are
//! worth showing, tracks what the reviewer accepted, dismissed, or locked,
//! and turns the accepted set into one case update.

pub mod apply;
pub mod ingest;
pub mod locks;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod session;
pub mod store;

pub use locks::{LockManager, LockState};
pub use record::{CaseDetails, CaseId, CaseRecord, UpdateCasePayload};
pub use registry::{DisplayGroup, FieldRegistry, FieldSpec, FieldStorage};
pub use session::{ApplyOutcome, ReviewSession};
