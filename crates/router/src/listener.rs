//! Listener contract and a channel-backed adapter.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::SequencedEvent;

/// Consumer of routed tones.
///
/// `on_event` runs on the producer's thread. Implementations that need to
/// touch UI state must hand the event over to their own context and return.
pub trait ToneListener: Send + Sync {
    fn on_event(&self, event: &SequencedEvent);
}

/// Type alias for shared listener reference.
pub type ToneListenerRef = Arc<dyn ToneListener>;

/// Listener that forwards every tone into an unbounded channel.
///
/// Lets a consumer running on its own task or thread receive tones without
/// doing any work on the producer's thread.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SequencedEvent>,
}

impl ChannelListener {
    /// Create the listener and the receiving end of its channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SequencedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ToneListener for ChannelListener {
    fn on_event(&self, event: &SequencedEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(seq = event.seq, "listener channel closed, tone discarded");
        }
    }
}
