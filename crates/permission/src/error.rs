//! Error types for the permission gate.

use crate::PermissionState;
use thiserror::Error;

/// Errors returned by [`crate::PermissionGate`].
#[derive(Debug, Error)]
pub enum PermissionError {
    /// A request was made while one is outstanding or after denial.
    #[error("permission request not allowed in state {state}")]
    InvalidState { state: PermissionState },
}

pub type Result<T> = std::result::Result<T, PermissionError>;
