//! Tone event router.
//!
//! Delivers events produced on the detection service's thread to at most one
//! listener registered from the control thread. Events that arrive with no
//! listener attached are dropped, never buffered.
//!
//! The registration slot is guarded by a mutex that is held only long enough
//! to swap or clone the slot. Delivery happens after the guard is released,
//! so a slow listener never blocks registration and registration never blocks
//! the producer for longer than a pointer copy.

mod listener;

pub use listener::{ChannelListener, ToneListener, ToneListenerRef};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, Weak};

use tonegate_events::ToneEvent;

/// Default number of drops between "no listener" warnings.
pub const DEFAULT_DROP_LOG_EVERY: u64 = 10;

/// A tone as delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedEvent {
    /// Monotonic arrival number assigned by the router.
    pub seq: u64,
    /// Wall clock time the router received the event, in milliseconds.
    pub received_at_ms: i64,
    pub event: ToneEvent,
}

/// Token identifying one registration.
///
/// Registering the same listener twice yields two different ids; only the
/// latest one can unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    listener: Weak<dyn ToneListener>,
}

/// Configuration for the event router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Log a warning every N dropped events.
    pub drop_log_every: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            drop_log_every: DEFAULT_DROP_LOG_EVERY,
        }
    }
}

/// Routes tone events to the currently registered listener.
pub struct EventRouter {
    slot: Mutex<Option<Registration>>,
    next_listener_id: AtomicU64,
    seq_counter: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    drop_log_every: u64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            slot: Mutex::new(None),
            next_listener_id: AtomicU64::new(1),
            seq_counter: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            drop_log_every: config.drop_log_every.max(1),
        }
    }

    /// Register `listener`, replacing whoever was registered.
    ///
    /// The replaced listener is not notified. The router keeps only a weak
    /// reference; dropping the listener's last `Arc` detaches it.
    pub fn register(&self, listener: &ToneListenerRef) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let registration = Registration {
            id,
            listener: std::sync::Arc::downgrade(listener),
        };

        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(registration);

        match previous {
            Some(prev) => tracing::debug!(%id, replaced = %prev.id, "listener replaced"),
            None => tracing::debug!(%id, "listener registered"),
        }
        id
    }

    /// Clear the registration if `id` is the current one.
    ///
    /// Returns false, leaving the slot untouched, for a stale id.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref().map(|r| r.id) {
            Some(current) if current == id => {
                *slot = None;
                drop(slot);
                tracing::debug!(%id, "listener unregistered");
                true
            }
            Some(current) => {
                tracing::debug!(%id, %current, "stale unregister ignored");
                false
            }
            None => false,
        }
    }

    /// Id of the current registration, if any.
    pub fn current(&self) -> Option<ListenerId> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.id)
    }

    /// Deliver `event` to the current listener.
    ///
    /// Safe to call from any thread. Returns the sequence number when the
    /// event reached a listener and `None` when it was dropped.
    pub fn dispatch(&self, event: ToneEvent) -> Option<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);

        let registration = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let listener = registration
            .as_ref()
            .and_then(|r| r.listener.upgrade().map(|l| (r.id, l)));

        let Some((id, listener)) = listener else {
            if let Some(stale) = registration {
                self.clear_dead(stale.id);
            }
            self.record_drop(seq);
            return None;
        };

        let sequenced = SequencedEvent {
            seq,
            received_at_ms: chrono::Utc::now().timestamp_millis(),
            event,
        };
        tracing::debug!(seq, %id, action_type = %sequenced.event.action_type, "dispatching tone");
        listener.on_event(&sequenced);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Some(seq)
    }

    /// Router counters.
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            dispatched: self.seq_counter.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn record_drop(&self, seq: u64) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        // Rate-limit logging: a detached UI can see a steady stream of tones
        if dropped % self.drop_log_every == 1 || self.drop_log_every == 1 {
            tracing::warn!(dropped, seq, "no listener attached, dropping tone");
        }
    }

    /// Forget a registration whose listener has been dropped.
    fn clear_dead(&self, id: ListenerId) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|r| r.id == id) {
            *slot = None;
            tracing::debug!(%id, "listener dropped without unregistering");
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("current", &self.current())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Snapshot of router counters for serialization/display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RouterStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub dropped: u64,
}
