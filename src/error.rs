//! Error types for configuration, the case API, and reconciliation.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read settings file {path}: {reason}")]
    SettingsFile { path: String, reason: String },
}

/// Errors returned by a [`crate::api::CaseApi`] backend.
#[derive(Debug, Error)]
pub enum CaseApiError {
    #[error("request to case backend timed out")]
    Timeout,

    #[error("could not reach case backend: {0}")]
    Connection(String),

    #[error("case backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("case {case_id} not found")]
    NotFound { case_id: String },

    #[error("failed to decode case backend response: {0}")]
    Decode(String),
}

/// Body fragments the backend emits when its database connection drops
/// mid-request. These clear up on their own once the pool reconnects.
const TRANSIENT_CONNECTION_MARKERS: &[&str] = &[
    "server closed the connection unexpectedly",
    "ssl connection has been closed unexpectedly",
    "connection reset by peer",
    "terminating connection due to administrator command",
];

impl CaseApiError {
    /// True for the class of failures the ingest path retries.
    pub fn is_transient_connection(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Status { status, body } if *status >= 500 => {
                let body = body.to_ascii_lowercase();
                TRANSIENT_CONNECTION_MARKERS
                    .iter()
                    .any(|marker| body.contains(marker))
            }
            _ => false,
        }
    }
}

/// Field registry table errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid field registry TOML: {0}")]
    Parse(String),

    #[error("field '{0}' is declared more than once")]
    Duplicate(String),

    #[error("field '{0}' collides with a reserved case_details key")]
    Reserved(String),

    #[error("unknown display group '{group}' for field '{field}'")]
    UnknownGroup { field: String, group: String },
}

/// Errors surfaced by review-session operations.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no case is loaded")]
    NoCaseLoaded,

    #[error("unknown case field '{0}'")]
    UnknownField(String),

    #[error("a lock change for '{0}' is already in progress")]
    LockPending(String),

    #[error("the case was reloaded before the update finished")]
    Stale,

    #[error(transparent)]
    Api(#[from] CaseApiError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ReconcileError {
    /// Text shown to the reviewer for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoCaseLoaded => "Load a case before changing suggestions.".to_string(),
            Self::UnknownField(field) => format!("'{field}' is not a case field."),
            Self::LockPending(field) => {
                format!("Still saving the previous lock change for '{field}'.")
            }
            Self::Stale => "The case changed while saving; review the refreshed case.".to_string(),
            Self::Api(CaseApiError::Timeout) => {
                "The case server took too long to respond. Please try again.".to_string()
            }
            Self::Api(CaseApiError::NotFound { .. }) => "This case no longer exists.".to_string(),
            Self::Api(err) => format!("Could not save changes: {err}"),
            Self::Registry(err) => format!("Field configuration is invalid: {err}"),
        }
    }
}
