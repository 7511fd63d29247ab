//! User-visible notice sink.
//!
//! The bridge never renders anything itself. When a session ends without a
//! running detection service it hands a [`Notice`] to the host's sink, which
//! shows it however the platform does (toast, banner, log line).

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// A user-visible notice raised by a detection session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notice {
    /// The listening permission was refused or the prompt was dismissed.
    PermissionDenied,
    /// The detection service could not be started.
    ServiceUnavailable { reason: String },
}

impl Notice {
    /// Short text suitable for a toast.
    pub fn message(&self) -> String {
        match self {
            Self::PermissionDenied => "Permission Denied".to_string(),
            Self::ServiceUnavailable { reason } => {
                format!("Tone detection unavailable: {}", reason)
            }
        }
    }
}

/// Trait for surfacing notices to the user.
pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Type alias for shared notice sink reference.
pub type NoticeSinkRef = Arc<dyn NoticeSink>;

/// In-memory notice sink for testing.
///
/// Captures all notices for later inspection.
#[derive(Default)]
pub struct InMemoryNoticeSink {
    notices: Mutex<Vec<Notice>>,
}

impl InMemoryNoticeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured notices.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NoticeSink for InMemoryNoticeSink {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}

/// Notice sink that writes notices to the log.
///
/// Used by headless hosts that have no UI to show a toast on.
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn notify(&self, notice: Notice) {
        tracing::warn!(?notice, message = %notice.message(), "user notice");
    }
}

/// No-op notice sink that discards all notices.
pub struct NullNoticeSink;

impl NoticeSink for NullNoticeSink {
    fn notify(&self, _notice: Notice) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_notice_sink() {
        let sink = InMemoryNoticeSink::new();

        sink.notify(Notice::PermissionDenied);
        sink.notify(Notice::ServiceUnavailable {
            reason: "no microphone".to_string(),
        });

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.notices()[0], Notice::PermissionDenied);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_notice_messages() {
        assert_eq!(Notice::PermissionDenied.message(), "Permission Denied");
        let msg = Notice::ServiceUnavailable {
            reason: "init failed".to_string(),
        }
        .message();
        assert!(msg.contains("init failed"));
    }

    #[test]
    fn test_notice_serialization() {
        let value = serde_json::to_value(Notice::ServiceUnavailable {
            reason: "x".to_string(),
        })
        .unwrap();
        assert_eq!(value["type"], "serviceUnavailable");
        assert_eq!(value["reason"], "x");
    }

    #[test]
    fn test_null_notice_sink() {
        // Should not panic
        NullNoticeSink.notify(Notice::PermissionDenied);
    }
}
