//! Lifecycle handle around a [`DetectionService`].

use crate::error::{Result, StartError};
use crate::{DetectionServiceRef, ServiceState, StartOutcome, ToneEmitter};
use tonegate_permission::PermissionState;

/// Ticket for an accepted start request.
///
/// The service is only `Starting` at this point; the completion for this
/// `attempt` decides whether it becomes `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started {
    pub attempt: u64,
}

/// Owns the lifecycle of the external detection service.
///
/// Single-owner: the session controller drives it from its control thread
/// and feeds start completions back in through [`Self::complete`].
pub struct DetectionServiceHandle {
    service: DetectionServiceRef,
    state: ServiceState,
    /// Incremented on every accepted start; tags completions.
    attempt: u64,
    failure: Option<String>,
}

impl DetectionServiceHandle {
    pub fn new(service: DetectionServiceRef) -> Self {
        Self {
            service,
            state: ServiceState::NotStarted,
            attempt: 0,
            failure: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Reason reported by the last failed start.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Ask the service to start.
    ///
    /// `on_complete` receives the attempt number and the outcome when the
    /// service finishes initializing; route it back into [`Self::complete`].
    ///
    /// # Errors
    ///
    /// - `StartError::PermissionNotGranted` unless `permission` is Granted.
    ///   Nothing changes.
    /// - `StartError::AlreadyActive` while Starting or Running.
    pub fn start<F>(
        &mut self,
        permission: PermissionState,
        emitter: ToneEmitter,
        on_complete: F,
    ) -> Result<Started>
    where
        F: FnOnce(u64, StartOutcome) + Send + 'static,
    {
        if permission != PermissionState::Granted {
            tracing::warn!(%permission, "refusing to start detection service");
            return Err(StartError::PermissionNotGranted { permission });
        }

        if self.state.is_active() {
            return Err(StartError::AlreadyActive { state: self.state });
        }

        self.attempt += 1;
        self.failure = None;
        self.state = ServiceState::Starting;

        let attempt = self.attempt;
        tracing::info!(attempt, "starting detection service");
        self.service.start(
            emitter,
            Box::new(move |outcome| on_complete(attempt, outcome)),
        );

        Ok(Started { attempt })
    }

    /// Apply the completion of start `attempt`.
    ///
    /// Completions for an older attempt, or arriving after [`Self::stop`],
    /// never move the service back to Running.
    pub fn complete(&mut self, attempt: u64, outcome: StartOutcome) -> ServiceState {
        if attempt != self.attempt {
            tracing::warn!(
                attempt,
                current = self.attempt,
                ?outcome,
                "ignoring superseded start completion"
            );
            return self.state;
        }

        match (self.state, outcome) {
            (ServiceState::Starting, StartOutcome::Started) => {
                tracing::info!(attempt, "detection service running");
                self.state = ServiceState::Running;
            }
            (ServiceState::Starting, StartOutcome::StartFailed(reason)) => {
                tracing::warn!(attempt, %reason, "detection service failed to start");
                self.failure = Some(reason);
                self.state = ServiceState::Failed;
            }
            (ServiceState::Stopped, StartOutcome::Started) => {
                // Stopped while starting; the service came up anyway.
                tracing::info!(attempt, "late start after stop, stopping service again");
                self.service.stop();
            }
            (ServiceState::Stopped, StartOutcome::StartFailed(reason)) => {
                tracing::debug!(attempt, %reason, "start failed after stop");
            }
            (state, outcome) => {
                tracing::warn!(attempt, %state, ?outcome, "unexpected start completion");
            }
        }
        self.state
    }

    /// Stop the service. Legal in every state and idempotent.
    pub fn stop(&mut self) {
        match self.state {
            ServiceState::Stopped => {
                tracing::debug!("detection service already stopped");
            }
            ServiceState::NotStarted => {
                self.state = ServiceState::Stopped;
            }
            ServiceState::Starting | ServiceState::Running | ServiceState::Failed => {
                tracing::info!(from = %self.state, "stopping detection service");
                self.service.stop();
                self.state = ServiceState::Stopped;
            }
        }
    }
}

impl std::fmt::Debug for DetectionServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionServiceHandle")
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
