//! File-backed settings, the lowest-precedence configuration layer.
//!
//! Every value has a default so an absent file is valid. Environment
//! variables override these in [`crate::config::ReconcileConfig::resolve`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub suggestions: SuggestionSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub url: Option<String>,
    pub timeout_secs: u64,
    pub update_method: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
            update_method: "patch".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionSettings {
    pub max_length: u64,
    pub ingest_retry_attempts: u64,
    pub ingest_retry_backoff_ms: u64,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            max_length: 200,
            ingest_retry_attempts: 3,
            ingest_retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub enabled: bool,
    pub path: String,
    pub hash_chain: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "logs/case_audit.jsonl".to_string(),
            hash_chain: true,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::SettingsFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Self::from_toml_str(&raw).map_err(|reason| ConfigError::SettingsFile {
            path: path.display().to_string(),
            reason,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }
}
