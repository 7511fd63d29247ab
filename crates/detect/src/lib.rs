//! Tone detection service lifecycle.
//!
//! The recognizer itself is an external collaborator behind
//! [`DetectionService`]. This crate owns its lifecycle: it refuses to start
//! without a granted permission, tracks the asynchronous start, and makes
//! sure a `stop()` issued while starting is not undone by a late completion.

mod error;
mod handle;
mod scripted;

pub use error::{Result, StartError};
pub use handle::{DetectionServiceHandle, Started};
pub use scripted::{DetectorScript, ScriptedDetector};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tonegate_events::ToneEvent;

/// Outcome of an asynchronous service start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    StartFailed(String),
}

/// Sink the service pushes detected tones into, from its own thread.
pub type ToneEmitter = Arc<dyn Fn(ToneEvent) + Send + Sync + 'static>;

pub fn new_emitter<F>(f: F) -> ToneEmitter
where
    F: Fn(ToneEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One-shot completion for a start request.
pub type StartCallback = Box<dyn FnOnce(StartOutcome) + Send + 'static>;

/// The external tone detection service.
///
/// `start` returns immediately; the service reports readiness (or failure)
/// exactly once through `on_complete`, possibly from another thread and
/// possibly before `start` returns. `stop` must be safe to call at any time,
/// including repeatedly.
pub trait DetectionService: Send + Sync {
    fn start(&self, emitter: ToneEmitter, on_complete: StartCallback);
    fn stop(&self);
}

/// Type alias for shared detection service reference.
pub type DetectionServiceRef = Arc<dyn DetectionService>;

/// Lifecycle of the detection service as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    NotStarted,
    /// Start requested, completion not yet received.
    Starting,
    Running,
    Stopped,
    /// The service reported that it could not start.
    Failed,
}

impl ServiceState {
    /// Whether a start request is in flight or has succeeded.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
