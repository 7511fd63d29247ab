//! Session state machine.

use serde::Serialize;

/// Where a detection session is in its lifecycle.
///
/// ```text
/// Idle ─▶ PermissionPending ─┬─▶ ServiceStarting ─┬─▶ ServiceRunning ──┐
///                            │                    └─▶ ServiceUnavailable┤
///                            └─▶ PermissionDenied ─────────────────────┤
///                                                                      ▼
///                           (any state) ──────────────────────────▶ Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Permission prompt issued, waiting for the host's answer.
    PermissionPending,
    /// Service start requested, waiting for its completion.
    ServiceStarting,
    ServiceRunning,
    PermissionDenied,
    /// The detection service failed to start.
    ServiceUnavailable,
    Terminated,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        match self {
            Idle => matches!(next, PermissionPending | Terminated),
            PermissionPending => matches!(next, ServiceStarting | PermissionDenied | Terminated),
            ServiceStarting => matches!(next, ServiceRunning | ServiceUnavailable | Terminated),
            ServiceRunning | PermissionDenied | ServiceUnavailable => next == Terminated,
            Terminated => false,
        }
    }

    /// No further progress is possible except teardown.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::ServiceUnavailable | Self::Terminated
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PermissionPending => "permission_pending",
            Self::ServiceStarting => "service_starting",
            Self::ServiceRunning => "service_running",
            Self::PermissionDenied => "permission_denied",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
