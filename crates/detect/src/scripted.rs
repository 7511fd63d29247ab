//! Scripted detection service.
//!
//! Replays a fixed list of tones on a background thread. Hosts without a
//! real recognizer (headless runs, tests) use it as the external service.

use crate::{DetectionService, StartCallback, StartOutcome, ToneEmitter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tonegate_events::ToneEvent;

/// What the scripted service does once started.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorScript {
    /// Simulated initialization time before the start completes.
    pub start_delay_ms: u64,
    /// Pause before each emitted tone.
    pub interval_ms: u64,
    /// Fail the start with this reason instead of running.
    pub fail_with: Option<String>,
    pub tones: Vec<ToneEvent>,
}

impl DetectorScript {
    pub fn new(tones: Vec<ToneEvent>) -> Self {
        Self {
            tones,
            ..Default::default()
        }
    }

    /// Load a script from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Detection service that plays back a [`DetectorScript`].
pub struct ScriptedDetector {
    script: DetectorScript,
    worker: Mutex<Option<Worker>>,
    start_calls: AtomicUsize,
}

/// One playback run. Each run gets its own flag so a stopped worker that is
/// still winding down never sees a later run's flag.
struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ScriptedDetector {
    pub fn new(script: DetectorScript) -> Self {
        Self {
            script,
            worker: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `start` has been called.
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::SeqCst))
    }
}

impl DetectionService for ScriptedDetector {
    fn start(&self, emitter: ToneEmitter, on_complete: StartCallback) {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::SeqCst))
        {
            drop(worker);
            tracing::warn!("ScriptedDetector already running");
            on_complete(StartOutcome::StartFailed("already running".to_string()));
            return;
        }

        let script = self.script.clone();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::spawn(move || {
            if script.start_delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(script.start_delay_ms));
            }

            if !flag.load(Ordering::SeqCst) {
                on_complete(StartOutcome::StartFailed("stopped during start".to_string()));
                return;
            }

            if let Some(reason) = script.fail_with {
                flag.store(false, Ordering::SeqCst);
                on_complete(StartOutcome::StartFailed(reason));
                return;
            }

            on_complete(StartOutcome::Started);
            tracing::info!(tones = script.tones.len(), "ScriptedDetector started");

            let interval = Duration::from_millis(script.interval_ms);
            for tone in script.tones {
                if !interval.is_zero() {
                    std::thread::sleep(interval);
                }
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                emitter(tone);
            }

            tracing::info!("ScriptedDetector finished");
        });

        // A previous, stopped run is left to finish on its own.
        *worker = Some(Worker { running, handle });
    }

    /// Signals the worker and returns without waiting for it; the worker
    /// exits at its next check. Callers may be on an async executor.
    fn stop(&self) {
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            worker.running.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedDetector {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.running.store(false, Ordering::SeqCst);
            // The last reference can be released by the worker itself, from
            // inside a start completion.
            if worker.handle.thread().id() != std::thread::current().id() {
                let _ = worker.handle.join();
            }
        }
    }
}
