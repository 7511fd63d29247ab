//! Error types for the session crate.

use std::path::PathBuf;
use thiserror::Error;
use tonegate_detect::StartError;
use tonegate_permission::PermissionError;

/// Logic errors surfaced while processing a session message.
///
/// None of these occur in correct usage; expected failures (denial, service
/// start failure) are session states, not errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("permission gate: {0}")]
    Permission(#[from] PermissionError),

    #[error("detection service: {0}")]
    Start(#[from] StartError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors loading a [`crate::SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
