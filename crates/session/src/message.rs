//! Inbound messages processed by the session controller.

use tonegate_detect::StartOutcome;

/// One input to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    /// The host is ready for detection to be activated.
    SessionReady,
    /// The host's permission subsystem answered a prompt.
    PermissionResult {
        request_code: i32,
        granted: Vec<bool>,
    },
    /// The detection service finished (or failed) starting.
    ServiceStart { attempt: u64, outcome: StartOutcome },
    /// The host is tearing the session down.
    Teardown,
}

impl SessionMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionReady => "session_ready",
            Self::PermissionResult { .. } => "permission_result",
            Self::ServiceStart { .. } => "service_start",
            Self::Teardown => "teardown",
        }
    }
}
