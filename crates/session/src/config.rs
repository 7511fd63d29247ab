//! Session configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tonegate_events::ActionTemplates;
use tonegate_permission::Capability;
use tonegate_router::{RouterConfig, DEFAULT_DROP_LOG_EVERY};

/// Request code the session uses for its permission prompt.
pub const DEFAULT_REQUEST_CODE: i32 = 302;

/// Configuration for a detection session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Code attached to the permission prompt; results carrying any other
    /// code belong to someone else and are ignored.
    pub request_code: i32,
    /// Capability requested before detection starts.
    pub capability: Capability,
    /// Log a warning every N tones dropped for lack of a listener.
    pub drop_log_every: u64,
    /// Text used when resolving SMS and mail actions.
    pub actions: ActionTemplates,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_code: DEFAULT_REQUEST_CODE,
            capability: Capability::listening(),
            drop_log_every: DEFAULT_DROP_LOG_EVERY,
            actions: ActionTemplates::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no session config, using defaults");
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        tracing::info!(path = %path.display(), "loaded session config");
        Ok(config)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            drop_log_every: self.drop_log_every,
        }
    }
}

/// Default config location: `<config dir>/tonegate/session.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tonegate")
        .join("session.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.request_code, 302);
        assert_eq!(config.capability.expected_grants(), 2);
        assert_eq!(config.router_config().drop_log_every, 10);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"request_code": 7, "actions": {"sms_body": "hey"}}"#).unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.request_code, 7);
        assert_eq!(config.actions.sms_body, "hey");
        assert_eq!(config.capability, Capability::listening());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = SessionConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SessionConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("session.json"));
    }

    #[test]
    fn test_default_path_ends_with_session_json() {
        assert!(default_config_path().ends_with("tonegate/session.json"));
    }
}
