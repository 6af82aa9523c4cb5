use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::config::helpers::{optional_env, parse_bool_env, parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// HTTP verb used for the case update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Patch,
    Put,
}

impl UpdateMethod {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "put" => Ok(Self::Put),
            other => Err(ConfigError::InvalidValue {
                key: "CASE_API_UPDATE_METHOD".to_string(),
                message: format!("unsupported method '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Put => "put",
        }
    }
}

/// Case backend connection settings.
#[derive(Debug, Clone)]
pub struct CaseApiConfig {
    pub base_url: Url,
    pub token: Option<SecretString>,
    pub timeout: Duration,
    pub update_method: UpdateMethod,
}

/// Suggestion review limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionConfig {
    pub max_length: usize,
    pub ingest_retry_attempts: u32,
    pub ingest_retry_backoff: Duration,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_length: 200,
            ingest_retry_attempts: 3,
            ingest_retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Audit log controls.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub hash_chain: bool,
}

/// Fully resolved configuration for a review session and its backend.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub api: CaseApiConfig,
    pub suggestions: SuggestionConfig,
    pub audit: AuditConfig,
}

fn validate_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    // Url::join drops the last segment unless the base ends in '/'.
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| ConfigError::InvalidValue {
        key: "CASE_API_URL".to_string(),
        message: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue {
            key: "CASE_API_URL".to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Audit logs live under `logs/`; the path is returned without `.` parts.
fn validate_audit_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "CASE_AUDIT_PATH".to_string(),
        message: message.to_string(),
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(invalid("audit log path must not be empty"));
    }

    let normalized = Path::new(raw).components().try_fold(
        PathBuf::new(),
        |mut path, component| match component {
            Component::Normal(segment) => {
                path.push(segment);
                Ok(path)
            }
            Component::CurDir => Ok(path),
            Component::ParentDir => Err(invalid("audit log path must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                Err(invalid("audit log path must be relative"))
            }
        },
    )?;

    let mut parts = normalized.components();
    let under_logs = parts.next() == Some(Component::Normal(std::ffi::OsStr::new("logs")));
    if !under_logs || parts.next().is_none() {
        return Err(invalid("audit log path must be under 'logs/' and name a file"));
    }
    Ok(normalized)
}

fn positive_usize(key: &str, value: u64) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than 0".to_string(),
        });
    }
    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: "value is too large".to_string(),
    })
}

impl ReconcileConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw_url = optional_env("CASE_API_URL")?
            .or_else(|| settings.api.url.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CASE_API_URL".to_string(),
            })?;
        let update_method = UpdateMethod::from_str(&parse_string_env(
            "CASE_API_UPDATE_METHOD",
            settings.api.update_method.clone(),
        )?)?;
        let timeout_secs = parse_u64_env("CASE_API_TIMEOUT_SECS", settings.api.timeout_secs)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CASE_API_TIMEOUT_SECS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let attempts = parse_u64_env(
            "CASE_INGEST_RETRY_ATTEMPTS",
            settings.suggestions.ingest_retry_attempts,
        )?;

        Ok(Self {
            api: CaseApiConfig {
                base_url: validate_base_url(&raw_url)?,
                token: optional_env("CASE_API_TOKEN")?.map(SecretString::from),
                timeout: Duration::from_secs(timeout_secs),
                update_method,
            },
            suggestions: SuggestionConfig {
                max_length: positive_usize(
                    "CASE_SUGGESTION_MAX_LENGTH",
                    parse_u64_env(
                        "CASE_SUGGESTION_MAX_LENGTH",
                        settings.suggestions.max_length,
                    )?,
                )?,
                ingest_retry_attempts: u32::try_from(attempts.max(1)).unwrap_or(u32::MAX),
                ingest_retry_backoff: Duration::from_millis(parse_u64_env(
                    "CASE_INGEST_RETRY_BACKOFF_MS",
                    settings.suggestions.ingest_retry_backoff_ms,
                )?),
            },
            audit: AuditConfig {
                enabled: parse_bool_env("CASE_AUDIT_ENABLED", settings.audit.enabled)?,
                path: {
                    let raw = parse_string_env("CASE_AUDIT_PATH", settings.audit.path.clone())?;
                    validate_audit_path(&raw)?
                },
                hash_chain: parse_bool_env("CASE_AUDIT_HASH_CHAIN", settings.audit.hash_chain)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::error::ConfigError;
    use crate::settings::Settings;

    use super::{ReconcileConfig, UpdateMethod};

    fn settings_with_url() -> Settings {
        let mut settings = Settings::default();
        settings.api.url = Some("https://cases.example.test/api".to_string());
        settings
    }

    #[test]
    fn resolve_uses_settings_defaults() {
        let config = ReconcileConfig::resolve(&settings_with_url()).expect("config");

        assert_eq!(
            config.api.base_url.as_str(),
            "https://cases.example.test/api/"
        );
        assert_eq!(config.api.update_method, UpdateMethod::Patch);
        assert_eq!(config.api.timeout.as_secs(), 30);
        assert_eq!(config.suggestions.max_length, 200);
        assert_eq!(config.suggestions.ingest_retry_attempts, 3);
        assert!(!config.audit.enabled);
        assert_eq!(config.audit.path, PathBuf::from("logs/case_audit.jsonl"));
    }

    #[test]
    fn resolve_rejects_non_http_base_url() {
        let mut settings = Settings::default();
        settings.api.url = Some("ftp://cases.example.test".to_string());
        let err = ReconcileConfig::resolve(&settings).expect_err("ftp must be rejected");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "CASE_API_URL");
        assert!(message.contains("ftp"), "unexpected message: {message}");
    }

    #[test]
    fn resolve_rejects_zero_max_length() {
        let mut settings = settings_with_url();
        settings.suggestions.max_length = 0;
        let err = ReconcileConfig::resolve(&settings).expect_err("zero must be rejected");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CASE_SUGGESTION_MAX_LENGTH"));
    }

    #[test]
    fn resolve_rejects_unknown_update_method() {
        let mut settings = settings_with_url();
        settings.api.update_method = "post".to_string();
        let err = ReconcileConfig::resolve(&settings).expect_err("post must be rejected");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CASE_API_UPDATE_METHOD"));
    }

    #[test]
    fn default_audit_path_is_accepted() {
        let default = Settings::default().audit.path;
        assert_eq!(
            super::validate_audit_path(&default).expect("default path"),
            PathBuf::from("logs/case_audit.jsonl")
        );
        assert_eq!(
            super::validate_audit_path("./logs//cases/./case_audit.jsonl/").expect("nested"),
            PathBuf::from("logs/cases/case_audit.jsonl")
        );
    }

    #[test]
    fn audit_paths_outside_logs_are_rejected() {
        for (raw, expected) in [
            ("", "must not be empty"),
            ("/var/log/case_audit.jsonl", "relative"),
            ("logs/../case_audit.jsonl", ".."),
            ("tmp/case_audit.jsonl", "under 'logs/'"),
            ("logs", "under 'logs/'"),
        ] {
            let err = super::validate_audit_path(raw).expect_err(raw);
            let ConfigError::InvalidValue { key, message } = err else {
                panic!("expected InvalidValue for {raw:?}");
            };
            assert_eq!(key, "CASE_AUDIT_PATH");
            assert!(message.contains(expected), "{raw:?}: unexpected message {message}");
        }
    }
}
