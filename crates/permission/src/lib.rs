//! Runtime permission gate for tone listening.
//!
//! A session asks the host for the listening capability at most once. The
//! host answers asynchronously with one grant flag per sub-permission; the
//! gate folds that vector into a terminal [`PermissionState`].
//!
//! ```text
//!   Unknown ──check_and_request──▶ Requested ──on_result──▶ Granted
//!                                      │                      (terminal)
//!                                      ├──on_result──────────▶ Denied
//!                                      └──resolve_unanswered─▶ (terminal)
//! ```

mod capability;
mod error;

pub use capability::{grants_from_codes, Capability, PERMISSION_GRANTED};
pub use error::{PermissionError, Result};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a session stands with the listening permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Nothing asked yet.
    Unknown,
    /// Prompt shown, waiting for the host's answer.
    Requested,
    Granted,
    Denied,
}

impl PermissionState {
    /// Granted and Denied never change for the rest of the session.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Granted | Self::Denied)
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Requested => "requested",
            Self::Granted => "granted",
            Self::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// Result of [`PermissionGate::check_and_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The session already holds the permission; nothing was asked.
    AlreadyGranted,
    /// The host was asked to prompt; the answer arrives later.
    RequestIssued,
}

/// Host permission subsystem that can show the system prompt.
///
/// The answer is delivered back through the session's permission-result
/// entry point, never through this trait.
pub trait PermissionPrompter: Send + Sync {
    fn request(&self, request_code: i32, capability: &Capability);
}

/// Type alias for shared prompter reference.
pub type PermissionPrompterRef = Arc<dyn PermissionPrompter>;

/// Fold a per-sub-permission grant vector into a decision.
///
/// Granted only when the vector is non-empty, carries at least `expected`
/// entries, and every entry is a grant. Short vectors come from malformed
/// host callbacks and an empty one from a dismissed prompt; both deny.
pub fn evaluate_grants(granted: &[bool], expected: usize) -> PermissionState {
    if granted.is_empty() || granted.len() < expected {
        tracing::warn!(
            received = granted.len(),
            expected,
            "incomplete permission result, treating as denied"
        );
        return PermissionState::Denied;
    }

    if granted.iter().all(|&g| g) {
        PermissionState::Granted
    } else {
        PermissionState::Denied
    }
}

/// Tracks the listening permission for one session.
#[derive(Debug)]
pub struct PermissionGate {
    state: PermissionState,
    request_code: i32,
    /// Capability of the outstanding request, used to size the result check.
    pending: Option<Capability>,
}

impl PermissionGate {
    pub fn new(request_code: i32) -> Self {
        Self {
            state: PermissionState::Unknown,
            request_code,
            pending: None,
        }
    }

    pub fn state(&self) -> PermissionState {
        self.state
    }

    pub fn request_code(&self) -> i32 {
        self.request_code
    }

    /// Ask the host for `capability` unless the session already holds it.
    ///
    /// # Errors
    ///
    /// `PermissionError::InvalidState` if a request is already outstanding or
    /// the session was denied. Both are caller bugs: the session controller
    /// asks exactly once.
    pub fn check_and_request(
        &mut self,
        capability: &Capability,
        prompter: &dyn PermissionPrompter,
    ) -> Result<RequestOutcome> {
        match self.state {
            PermissionState::Granted => Ok(RequestOutcome::AlreadyGranted),
            PermissionState::Requested | PermissionState::Denied => {
                Err(PermissionError::InvalidState { state: self.state })
            }
            PermissionState::Unknown => {
                tracing::info!(
                    capability = %capability.name,
                    request_code = self.request_code,
                    "requesting permission"
                );
                self.pending = Some(capability.clone());
                self.state = PermissionState::Requested;
                prompter.request(self.request_code, capability);
                Ok(RequestOutcome::RequestIssued)
            }
        }
    }

    /// Apply the host's answer to the outstanding request.
    ///
    /// Answers that arrive with no request outstanding are ignored and the
    /// current state is returned unchanged.
    pub fn on_result(&mut self, granted: &[bool]) -> PermissionState {
        match self.state {
            PermissionState::Requested => {
                let expected = self
                    .pending
                    .take()
                    .map(|c| c.expected_grants())
                    .unwrap_or(1);
                self.state = evaluate_grants(granted, expected);
                tracing::info!(state = %self.state, flags = ?granted, "permission resolved");
                self.state
            }
            PermissionState::Unknown | PermissionState::Granted | PermissionState::Denied => {
                tracing::warn!(state = %self.state, "ignoring unsolicited permission result");
                self.state
            }
        }
    }

    /// Resolve an unanswered request as denied.
    ///
    /// Called when the host tears the session down while the prompt is still
    /// up. Has no effect in any other state.
    pub fn resolve_unanswered(&mut self) -> PermissionState {
        if self.state == PermissionState::Requested {
            tracing::info!("permission request unanswered at teardown, treating as denied");
            self.pending = None;
            self.state = PermissionState::Denied;
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPrompter {
        requests: Mutex<Vec<(i32, String)>>,
    }

    impl RecordingPrompter {
        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl PermissionPrompter for RecordingPrompter {
        fn request(&self, request_code: i32, capability: &Capability) {
            self.requests
                .lock()
                .unwrap()
                .push((request_code, capability.name.clone()));
        }
    }

    fn requested_gate(prompter: &RecordingPrompter) -> PermissionGate {
        let mut gate = PermissionGate::new(302);
        let outcome = gate
            .check_and_request(&Capability::listening(), prompter)
            .unwrap();
        assert_eq!(outcome, RequestOutcome::RequestIssued);
        gate
    }

    #[test]
    fn test_first_request_issues_prompt() {
        let prompter = RecordingPrompter::default();
        let gate = requested_gate(&prompter);

        assert_eq!(gate.state(), PermissionState::Requested);
        assert_eq!(
            prompter.requests.lock().unwrap()[0],
            (302, "listening".to_string())
        );
    }

    #[test]
    fn test_duplicate_request_is_invalid_state() {
        let prompter = RecordingPrompter::default();
        let mut gate = requested_gate(&prompter);

        let err = gate
            .check_and_request(&Capability::listening(), &prompter)
            .unwrap_err();
        assert!(matches!(
            err,
            PermissionError::InvalidState {
                state: PermissionState::Requested
            }
        ));
        assert_eq!(prompter.count(), 1, "no second prompt");
    }

    #[test]
    fn test_already_granted_is_noop() {
        let prompter = RecordingPrompter::default();
        let mut gate = requested_gate(&prompter);
        assert_eq!(gate.on_result(&[true, true]), PermissionState::Granted);

        let outcome = gate
            .check_and_request(&Capability::listening(), &prompter)
            .unwrap();
        assert_eq!(outcome, RequestOutcome::AlreadyGranted);
        assert_eq!(prompter.count(), 1);
    }

    #[test]
    fn test_denied_session_cannot_rerequest() {
        let prompter = RecordingPrompter::default();
        let mut gate = requested_gate(&prompter);
        assert_eq!(gate.on_result(&[false, true]), PermissionState::Denied);

        assert!(gate
            .check_and_request(&Capability::listening(), &prompter)
            .is_err());
        assert_eq!(gate.state(), PermissionState::Denied);
    }

    #[test]
    fn test_grant_requires_every_flag() {
        let cases: &[(&[bool], PermissionState)] = &[
            (&[true, true], PermissionState::Granted),
            (&[true, true, true], PermissionState::Granted),
            (&[true, false], PermissionState::Denied),
            (&[false, true], PermissionState::Denied),
            (&[false, false], PermissionState::Denied),
            (&[true, true, false], PermissionState::Denied),
        ];

        for (flags, expected) in cases {
            assert_eq!(evaluate_grants(flags, 2), *expected, "flags {:?}", flags);
        }
    }

    #[test]
    fn test_short_result_vector_is_denied() {
        let prompter = RecordingPrompter::default();

        let mut gate = requested_gate(&prompter);
        assert_eq!(gate.on_result(&[true]), PermissionState::Denied);

        let mut gate = requested_gate(&prompter);
        assert_eq!(gate.on_result(&[]), PermissionState::Denied);
    }

    #[test]
    fn test_resolved_state_is_immutable() {
        let prompter = RecordingPrompter::default();
        let mut gate = requested_gate(&prompter);
        assert_eq!(gate.on_result(&[false, false]), PermissionState::Denied);

        // A later, contradicting answer does not flip the decision.
        assert_eq!(gate.on_result(&[true, true]), PermissionState::Denied);
        assert_eq!(gate.resolve_unanswered(), PermissionState::Denied);
    }

    #[test]
    fn test_unsolicited_result_ignored() {
        let mut gate = PermissionGate::new(302);
        assert_eq!(gate.on_result(&[true, true]), PermissionState::Unknown);
    }

    #[test]
    fn test_unanswered_request_resolves_denied() {
        let prompter = RecordingPrompter::default();
        let mut gate = requested_gate(&prompter);

        assert_eq!(gate.resolve_unanswered(), PermissionState::Denied);
        assert_eq!(gate.state(), PermissionState::Denied);
    }

    #[test]
    fn test_resolve_unanswered_without_request_is_noop() {
        let mut gate = PermissionGate::new(302);
        assert_eq!(gate.resolve_unanswered(), PermissionState::Unknown);
    }

    #[test]
    fn test_permission_state_serde() {
        let json = serde_json::to_string(&PermissionState::Granted).unwrap();
        assert_eq!(json, "\"granted\"");
    }
}
