//! Error types for the detection service handle.

use crate::ServiceState;
use thiserror::Error;
use tonegate_permission::PermissionState;

/// Errors returned by [`crate::DetectionServiceHandle::start`].
#[derive(Debug, Error)]
pub enum StartError {
    /// Starting requires a granted listening permission.
    #[error("listening permission not granted (permission: {permission})")]
    PermissionNotGranted { permission: PermissionState },

    /// A start is already in flight or the service is running.
    #[error("detection service already active (state: {state})")]
    AlreadyActive { state: ServiceState },
}

pub type Result<T> = std::result::Result<T, StartError>;
