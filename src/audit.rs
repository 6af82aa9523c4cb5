//! Append-only JSONL record of changes written to cases.
//!
//! Each line optionally carries the SHA-256 of the previous line's event so
//! edits to the file are detectable.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cases::record::CaseId;
use crate::config::AuditConfig;

/// Kinds of case writes worth recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SuggestionsApplied,
    SuggestionsCleared,
    SuggestionsIngested,
    FieldLockChanged,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuggestionsApplied => "suggestions_applied",
            Self::SuggestionsCleared => "suggestions_cleared",
            Self::SuggestionsIngested => "suggestions_ingested",
            Self::FieldLockChanged => "field_lock_changed",
        }
    }
}

#[derive(Debug, Serialize)]
struct AuditLine<'a> {
    ts: String,
    action: AuditAction,
    case_id: &'a str,
    details: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Mutex<Option<String>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, hash_chain: bool) -> Self {
        Self {
            path: path.into(),
            hash_chain,
            last_hash: Mutex::new(None),
        }
    }

    /// `None` when auditing is disabled.
    pub fn from_config(config: &AuditConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.path.clone(), config.hash_chain))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Failures are logged and never interrupt the
    /// operation being audited.
    pub fn record(&self, action: AuditAction, case_id: &CaseId, details: serde_json::Value) {
        let mut last_hash = match self.last_hash.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!("Audit hash-chain lock poisoned: {}", e);
                return;
            }
        };

        let mut line = AuditLine {
            ts: Utc::now().to_rfc3339(),
            action,
            case_id: case_id.as_str(),
            details: &details,
            prev_hash: last_hash.clone(),
            hash: None,
        };

        let next_hash = if self.hash_chain {
            match serde_json::to_string(&line) {
                Ok(unhashed) => {
                    let hash = format!("{:x}", Sha256::digest(unhashed.as_bytes()));
                    line.hash = Some(hash.clone());
                    Some(hash)
                }
                Err(e) => {
                    tracing::warn!("Failed to serialize audit event for hashing: {}", e);
                    return;
                }
            }
        } else {
            None
        };

        let serialized = match serde_json::to_string(&line) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        if self.append(&serialized) && next_hash.is_some() {
            *last_hash = next_hash;
        }
    }

    fn append(&self, line: &str) -> bool {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("Failed to create audit log dir {:?}: {}", parent, e);
            return false;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = match options.open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Failed to open audit log {:?}: {}", self.path, e);
                return false;
            }
        };

        // Refuse to append to a file others can read.
        #[cfg(unix)]
        {
            match file.metadata() {
                Ok(meta) if meta.permissions().mode() & 0o777 != 0o600 => {
                    tracing::warn!(
                        "Refusing to write audit event; insecure mode {:o} on {:?} (expected 600)",
                        meta.permissions().mode() & 0o777,
                        self.path
                    );
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to read permissions for audit log {:?}: {}", self.path, e);
                    return false;
                }
            }
        }

        match writeln!(file, "{line}") {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to append audit event: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;

    use super::{AuditAction, AuditLog};
    use crate::cases::record::CaseId;

    fn lines(path: &std::path::Path) -> Vec<Value> {
        fs::read_to_string(path)
            .expect("read audit log")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[test]
    fn hash_chain_links_consecutive_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/audit.jsonl");
        let log = AuditLog::new(path.clone(), true);
        let case_id = CaseId::new("7");

        log.record(
            AuditAction::FieldLockChanged,
            &case_id,
            serde_json::json!({"field": "judge", "state": "locked"}),
        );
        log.record(
            AuditAction::SuggestionsCleared,
            &case_id,
            serde_json::json!({}),
        );

        let events = lines(&path);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["action"], "field_lock_changed");
        assert_eq!(events[0]["case_id"], "7");
        assert!(events[0].get("prev_hash").is_none());
        assert_eq!(events[1]["prev_hash"], events[0]["hash"]);
        assert!(events[1]["hash"].is_string());
    }

    #[test]
    fn chain_is_off_when_disabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(path.clone(), false);

        log.record(
            AuditAction::SuggestionsApplied,
            &CaseId::new("1"),
            serde_json::json!({"applied": 2}),
        );

        let events = lines(&path);
        assert!(events[0].get("hash").is_none());
        assert_eq!(events[0]["details"]["applied"], 2);
    }

    #[cfg(unix)]
    #[test]
    fn refuses_existing_file_with_broad_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        fs::write(&path, "existing\n").expect("seed file");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        AuditLog::new(path.clone(), false).record(
            AuditAction::SuggestionsCleared,
            &CaseId::new("1"),
            serde_json::json!({}),
        );

        assert_eq!(fs::read_to_string(&path).expect("read"), "existing\n");
    }

    #[cfg(unix)]
    #[test]
    fn new_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        AuditLog::new(path.clone(), false).record(
            AuditAction::SuggestionsIngested,
            &CaseId::new("1"),
            serde_json::json!({}),
        );

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
