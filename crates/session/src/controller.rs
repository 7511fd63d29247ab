//! Session controller and the host-facing handle.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tonegate_detect::{
    new_emitter, DetectionServiceHandle, DetectionServiceRef, ServiceState, StartOutcome,
};
use tonegate_events::{Notice, NoticeSinkRef};
use tonegate_permission::{
    grants_from_codes, PermissionGate, PermissionPrompterRef, PermissionState, RequestOutcome,
};
use tonegate_router::{EventRouter, ListenerId, RouterStats, ToneListenerRef};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::message::SessionMessage;
use crate::state::SessionState;

/// External collaborators a session talks to.
pub struct Collaborators {
    /// Host permission subsystem.
    pub prompter: PermissionPrompterRef,
    /// External tone detection service.
    pub service: DetectionServiceRef,
    /// Listener registered once the service is running.
    pub listener: ToneListenerRef,
    /// Where user-visible notices go.
    pub notices: NoticeSinkRef,
}

/// Host entry points into a session.
///
/// Cheap to clone and safe to use from any thread. Each method enqueues a
/// message and returns `false` if the session has already shut down.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    /// The host is ready; activate detection.
    pub fn on_session_ready(&self) -> bool {
        self.send(SessionMessage::SessionReady)
    }

    /// Forward the host's answer to the permission prompt.
    pub fn on_permission_result(&self, request_code: i32, granted: Vec<bool>) -> bool {
        self.send(SessionMessage::PermissionResult {
            request_code,
            granted,
        })
    }

    /// Forward a permission answer expressed as host grant codes.
    pub fn on_permission_codes(&self, request_code: i32, codes: &[i32]) -> bool {
        self.on_permission_result(request_code, grants_from_codes(codes))
    }

    /// The host is going away; stop detection and detach the listener.
    pub fn on_session_teardown(&self) -> bool {
        self.send(SessionMessage::Teardown)
    }

    fn send(&self, message: SessionMessage) -> bool {
        let name = message.name();
        if self.tx.send(message).is_err() {
            tracing::debug!(message = name, "session closed, signal dropped");
            return false;
        }
        true
    }
}

/// Point-in-time view of a session for logging/display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub permission: PermissionState,
    pub service: ServiceState,
    pub router: RouterStats,
}

/// Orchestrates permission, service lifecycle and listener registration for
/// one detection session.
///
/// Owns the state machine exclusively. Inputs arrive as [`SessionMessage`]s
/// on an inbound queue and are processed one at a time, either by
/// [`Self::run`] on an async task or by [`Self::drain`] from the caller's
/// thread.
pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    gate: PermissionGate,
    service: DetectionServiceHandle,
    router: Arc<EventRouter>,
    collaborators: Collaborators,
    registration: Option<ListenerId>,
    /// Weak so the queue closes once every host handle is gone.
    tx: mpsc::WeakUnboundedSender<SessionMessage>,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
}

impl SessionController {
    /// Create a session and the first handle onto it.
    pub fn new(
        config: SessionConfig,
        router: Arc<EventRouter>,
        collaborators: Collaborators,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            gate: PermissionGate::new(config.request_code),
            service: DetectionServiceHandle::new(Arc::clone(&collaborators.service)),
            config,
            state: SessionState::Idle,
            router,
            collaborators,
            registration: None,
            tx: tx.downgrade(),
            rx,
        };
        (controller, SessionHandle { tx })
    }

    /// Another handle onto this session, if any handle is still alive.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.tx.upgrade().map(|tx| SessionHandle { tx })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn permission_state(&self) -> PermissionState {
        self.gate.state()
    }

    pub fn service_state(&self) -> ServiceState {
        self.service.state()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            permission: self.gate.state(),
            service: self.service.state(),
            router: self.router.stats(),
        }
    }

    /// Process queued messages until the session terminates or every handle
    /// is dropped. Dropping all handles without a teardown signal counts as a
    /// teardown.
    pub async fn run(mut self) -> SessionStatus {
        tracing::info!("session controller running");

        while let Some(message) = self.rx.recv().await {
            self.process_logged(message);
            if self.state == SessionState::Terminated {
                break;
            }
        }

        if self.state != SessionState::Terminated {
            tracing::info!("all session handles dropped, tearing down");
            self.teardown();
        }
        // Late start completions still need to reach the service handle.
        self.drain();

        let status = self.status();
        tracing::info!(?status, "session controller finished");
        status
    }

    /// Process every message already queued, without waiting.
    ///
    /// Returns the number of messages processed. Logic errors are logged.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.process_logged(message);
            processed += 1;
        }
        processed
    }

    /// Apply one message to the state machine.
    ///
    /// # Errors
    ///
    /// Only for logic errors (duplicate permission request, starting an
    /// already active service). The session stays in its current state.
    pub fn process(&mut self, message: SessionMessage) -> Result<()> {
        tracing::debug!(state = %self.state, message = message.name(), "processing");

        if self.state == SessionState::Terminated {
            // The service handle still decides what a late start means.
            match message {
                SessionMessage::ServiceStart { attempt, outcome } => {
                    self.service.complete(attempt, outcome);
                }
                other => {
                    tracing::debug!(message = other.name(), "session terminated, ignoring");
                }
            }
            return Ok(());
        }

        match message {
            SessionMessage::SessionReady => self.on_ready(),
            SessionMessage::PermissionResult {
                request_code,
                granted,
            } => self.on_permission_result(request_code, &granted),
            SessionMessage::ServiceStart { attempt, outcome } => {
                self.on_service_start(attempt, outcome);
                Ok(())
            }
            SessionMessage::Teardown => {
                self.teardown();
                Ok(())
            }
        }
    }

    fn process_logged(&mut self, message: SessionMessage) {
        let name = message.name();
        if let Err(e) = self.process(message) {
            tracing::error!(error = %e, message = name, state = %self.state, "session logic error");
        }
    }

    fn on_ready(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            tracing::warn!(state = %self.state, "session already activated, ignoring ready signal");
            return Ok(());
        }

        self.transition(SessionState::PermissionPending);
        let outcome = self
            .gate
            .check_and_request(&self.config.capability, &*self.collaborators.prompter)?;

        match outcome {
            RequestOutcome::AlreadyGranted => self.start_service(),
            RequestOutcome::RequestIssued => Ok(()),
        }
    }

    fn on_permission_result(&mut self, request_code: i32, granted: &[bool]) -> Result<()> {
        if request_code != self.gate.request_code() {
            tracing::debug!(
                request_code,
                expected = self.gate.request_code(),
                "ignoring permission result for another request"
            );
            return Ok(());
        }

        if self.state != SessionState::PermissionPending {
            tracing::warn!(state = %self.state, "permission result outside pending state, ignoring");
            return Ok(());
        }

        match self.gate.on_result(granted) {
            PermissionState::Granted => self.start_service(),
            PermissionState::Denied => {
                self.transition(SessionState::PermissionDenied);
                self.collaborators.notices.notify(Notice::PermissionDenied);
                Ok(())
            }
            PermissionState::Unknown | PermissionState::Requested => Ok(()),
        }
    }

    fn start_service(&mut self) -> Result<()> {
        if self.tx.upgrade().is_none() {
            tracing::warn!("no session handles left, not starting detection service");
            self.teardown();
            return Ok(());
        }

        let router = Arc::clone(&self.router);
        let emitter = new_emitter(move |tone| {
            router.dispatch(tone);
        });

        // Weak, so a pending start does not keep the queue open. A completion
        // that can no longer reach the session stops the service itself.
        let tx = self.tx.clone();
        let service = Arc::clone(&self.collaborators.service);
        let started = self
            .service
            .start(self.gate.state(), emitter, move |attempt, outcome| {
                let message = SessionMessage::ServiceStart { attempt, outcome };
                let undelivered = match tx.upgrade() {
                    Some(tx) => tx.send(message).err().map(|e| e.0),
                    None => Some(message),
                };
                if let Some(SessionMessage::ServiceStart {
                    outcome: StartOutcome::Started,
                    ..
                }) = undelivered
                {
                    tracing::info!(attempt, "session gone before start completed, stopping service");
                    service.stop();
                }
            })?;

        tracing::debug!(attempt = started.attempt, "awaiting service start completion");
        self.transition(SessionState::ServiceStarting);
        Ok(())
    }

    fn on_service_start(&mut self, attempt: u64, outcome: StartOutcome) {
        let service_state = self.service.complete(attempt, outcome);

        if self.state != SessionState::ServiceStarting {
            tracing::debug!(state = %self.state, "start completion outside starting state");
            return;
        }

        match service_state {
            ServiceState::Running => {
                let id = self.router.register(&self.collaborators.listener);
                self.registration = Some(id);
                self.transition(SessionState::ServiceRunning);
            }
            ServiceState::Failed => {
                let reason = self
                    .service
                    .failure_reason()
                    .unwrap_or("unknown error")
                    .to_string();
                self.transition(SessionState::ServiceUnavailable);
                self.collaborators
                    .notices
                    .notify(Notice::ServiceUnavailable { reason });
            }
            ServiceState::NotStarted
            | ServiceState::Starting
            | ServiceState::Stopped => {}
        }
    }

    /// Stop detection, detach the listener and end the session.
    ///
    /// Runs every step even when there is nothing to stop or unregister.
    fn teardown(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }

        if self.state == SessionState::PermissionPending {
            self.gate.resolve_unanswered();
        }

        self.service.stop();

        if let Some(id) = self.registration.take() {
            self.router.unregister(id);
        }

        self.transition(SessionState::Terminated);
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("permission", &self.gate.state())
            .field("service", &self.service.state())
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tonegate_detect::{DetectionService, StartCallback, ToneEmitter};
    use tonegate_events::{ActionType, InMemoryNoticeSink, ToneEvent};
    use tonegate_permission::{Capability, PermissionPrompter};
    use tonegate_router::{SequencedEvent, ToneListener};

    #[derive(Default)]
    struct CountingPrompter {
        requests: Mutex<Vec<i32>>,
    }

    impl PermissionPrompter for CountingPrompter {
        fn request(&self, request_code: i32, _capability: &Capability) {
            self.requests.lock().unwrap().push(request_code);
        }
    }

    #[derive(Default)]
    struct ManualService {
        pending: Mutex<Option<(ToneEmitter, StartCallback)>>,
        emitter: Mutex<Option<ToneEmitter>>,
        starts: Mutex<usize>,
        stops: Mutex<usize>,
    }

    impl ManualService {
        fn resolve(&self, outcome: StartOutcome) {
            let (emitter, callback) = self.pending.lock().unwrap().take().unwrap();
            if outcome == StartOutcome::Started {
                *self.emitter.lock().unwrap() = Some(emitter);
            }
            callback(outcome);
        }

        fn emit(&self, url: &str) {
            let emitter = self.emitter.lock().unwrap().clone().unwrap();
            emitter(ToneEvent::new(ActionType::Webpage, url));
        }
    }

    impl DetectionService for ManualService {
        fn start(&self, emitter: ToneEmitter, on_complete: StartCallback) {
            *self.starts.lock().unwrap() += 1;
            *self.pending.lock().unwrap() = Some((emitter, on_complete));
        }

        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        urls: Mutex<Vec<String>>,
    }

    impl ToneListener for RecordingListener {
        fn on_event(&self, event: &SequencedEvent) {
            self.urls.lock().unwrap().push(event.event.action_url.clone());
        }
    }

    struct Fixture {
        controller: SessionController,
        handle: SessionHandle,
        prompter: Arc<CountingPrompter>,
        service: Arc<ManualService>,
        listener: Arc<RecordingListener>,
        notices: Arc<InMemoryNoticeSink>,
    }

    fn fixture() -> Fixture {
        let prompter = Arc::new(CountingPrompter::default());
        let service = Arc::new(ManualService::default());
        let listener = Arc::new(RecordingListener::default());
        let notices = Arc::new(InMemoryNoticeSink::new());

        let (controller, handle) = SessionController::new(
            SessionConfig::default(),
            Arc::new(EventRouter::new()),
            Collaborators {
                prompter: prompter.clone(),
                service: service.clone(),
                listener: listener.clone(),
                notices: notices.clone(),
            },
        );

        Fixture {
            controller,
            handle,
            prompter,
            service,
            listener,
            notices,
        }
    }

    #[test]
    fn test_ready_requests_permission_once() {
        let mut f = fixture();
        f.handle.on_session_ready();
        f.handle.on_session_ready();
        assert_eq!(f.controller.drain(), 2);

        assert_eq!(f.controller.state(), SessionState::PermissionPending);
        assert_eq!(*f.prompter.requests.lock().unwrap(), vec![302]);
        assert_eq!(*f.service.starts.lock().unwrap(), 0);
    }

    #[test]
    fn test_grant_then_start_then_deliver() {
        let mut f = fixture();
        f.handle.on_session_ready();
        f.handle.on_permission_result(302, vec![true, true]);
        f.controller.drain();
        assert_eq!(f.controller.state(), SessionState::ServiceStarting);
        assert!(f.controller.router().current().is_none());

        f.service.resolve(StartOutcome::Started);
        f.controller.drain();
        assert_eq!(f.controller.state(), SessionState::ServiceRunning);

        f.service.emit("https://a");
        assert_eq!(*f.listener.urls.lock().unwrap(), vec!["https://a"]);
        assert!(f.notices.is_empty());
    }

    #[test]
    fn test_denial_notifies_and_never_starts() {
        let mut f = fixture();
        f.handle.on_session_ready();
        f.handle.on_permission_result(302, vec![true, false]);
        f.controller.drain();

        assert_eq!(f.controller.state(), SessionState::PermissionDenied);
        assert_eq!(f.notices.notices(), vec![Notice::PermissionDenied]);
        assert_eq!(*f.service.starts.lock().unwrap(), 0);
    }

    #[test]
    fn test_start_failure_is_service_unavailable() {
        let mut f = fixture();
        f.handle.on_session_ready();
        f.handle.on_permission_codes(302, &[0, 0]);
        f.controller.drain();

        f.service
            .resolve(StartOutcome::StartFailed("engine init".to_string()));
        f.controller.drain();

        assert_eq!(f.controller.state(), SessionState::ServiceUnavailable);
        assert_eq!(
            f.notices.notices(),
            vec![Notice::ServiceUnavailable {
                reason: "engine init".to_string()
            }]
        );
        assert!(f.controller.router().current().is_none());
    }

    #[test]
    fn test_teardown_unregisters_and_stops() {
        let mut f = fixture();
        f.handle.on_session_ready();
        f.handle.on_permission_result(302, vec![true, true]);
        f.controller.drain();
        f.service.resolve(StartOutcome::Started);
        f.controller.drain();

        f.handle.on_session_teardown();
        f.controller.drain();

        assert_eq!(f.controller.state(), SessionState::Terminated);
        assert_eq!(f.controller.service_state(), ServiceState::Stopped);
        assert!(f.controller.router().current().is_none());
        assert_eq!(*f.service.stops.lock().unwrap(), 1);

        f.service.emit("https://late");
        assert!(f.listener.urls.lock().unwrap().is_empty());
        assert_eq!(f.controller.status().router.dropped, 1);
    }

    #[test]
    fn test_messages_after_teardown_are_ignored() {
        let mut f = fixture();
        f.handle.on_session_teardown();
        f.handle.on_session_ready();
        f.handle.on_permission_result(302, vec![true, true]);
        f.controller.drain();

        assert_eq!(f.controller.state(), SessionState::Terminated);
        assert!(f.prompter.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handle_reports_closed_session() {
        let f = fixture();
        let handle = f.handle.clone();
        drop(f);
        assert!(!handle.on_session_ready());
    }

    #[test]
    fn test_direct_process_applies_messages() {
        let mut f = fixture();
        f.controller.process(SessionMessage::SessionReady).unwrap();
        f.controller
            .process(SessionMessage::PermissionResult {
                request_code: 302,
                granted: vec![true, true],
            })
            .unwrap();
        assert_eq!(f.controller.state(), SessionState::ServiceStarting);
        assert_eq!(f.controller.permission_state(), PermissionState::Granted);
    }

    #[test]
    fn test_grant_with_no_handles_left_terminates() {
        let mut f = fixture();
        f.controller.process(SessionMessage::SessionReady).unwrap();
        drop(f.handle);

        f.controller
            .process(SessionMessage::PermissionResult {
                request_code: 302,
                granted: vec![true, true],
            })
            .unwrap();

        assert_eq!(f.controller.state(), SessionState::Terminated);
        assert_eq!(f.controller.service_state(), ServiceState::Stopped);
        assert_eq!(*f.service.starts.lock().unwrap(), 0);
    }
}
