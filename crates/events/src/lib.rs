//! Shared event contracts for the tone detection bridge.
//!
//! This crate defines the record produced by the detection service
//! ([`ToneEvent`]), the mapping from a tone to the action the consumer
//! layer should take, and the [`NoticeSink`] abstraction used to surface
//! user-visible notices (permission denied, service unavailable).
//!
//! Field names are serialized in camelCase so the consumer layer receives
//! `actionType` / `actionUrl` exactly as it reads them.

mod action;
mod notice;

pub use action::{resolve_action, ActionTarget, ActionTemplates};
pub use notice::{
    InMemoryNoticeSink, Notice, NoticeSink, NoticeSinkRef, NullNoticeSink, TracingNoticeSink,
};

use serde::{Deserialize, Serialize};

/// Kind of action attached to a detected tone.
///
/// Unknown kinds are preserved verbatim so a newer detection service does not
/// break deserialization on older consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Show an image full screen.
    Image,
    /// Open a web page.
    Webpage,
    /// Compose an SMS to the given number.
    Sms,
    /// Dial the given number.
    Tel,
    /// Compose an email to the given address.
    Mail,
    /// Any other action kind.
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Webpage => write!(f, "webpage"),
            Self::Sms => write!(f, "sms"),
            Self::Tel => write!(f, "tel"),
            Self::Mail => write!(f, "mail"),
            Self::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// A tone detected by the external detection service.
///
/// Producers: detection service
/// Consumers: event router, listener layer
///
/// The record is opaque to the router; ordering is assigned on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneEvent {
    /// Identifier the detection service attached to the tone, if any.
    #[serde(default)]
    pub tone_id: Option<String>,
    /// What the consumer should do with this tone.
    pub action_type: ActionType,
    /// Target of the action (URL, phone number, address).
    pub action_url: String,
    /// Producer timestamp in milliseconds since epoch.
    #[serde(default)]
    pub detected_at_ms: i64,
}

impl ToneEvent {
    /// Create a tone event stamped with the current time.
    pub fn new(action_type: ActionType, action_url: impl Into<String>) -> Self {
        Self {
            tone_id: None,
            action_type,
            action_url: action_url.into(),
            detected_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_tone_id(mut self, tone_id: impl Into<String>) -> Self {
        self.tone_id = Some(tone_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_event_deserialize() {
        let json = r#"{"toneId": "t-1", "actionType": "webpage", "actionUrl": "https://example.com", "detectedAtMs": 42}"#;
        let event: ToneEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.tone_id.as_deref(), Some("t-1"));
        assert_eq!(event.action_type, ActionType::Webpage);
        assert_eq!(event.action_url, "https://example.com");
        assert_eq!(event.detected_at_ms, 42);
    }

    #[test]
    fn test_tone_event_deserialize_minimal() {
        let json = r#"{"actionType": "tel", "actionUrl": "5551234"}"#;
        let event: ToneEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.action_type, ActionType::Tel);
        assert_eq!(event.tone_id, None);
        assert_eq!(event.detected_at_ms, 0);
    }

    #[test]
    fn test_unknown_action_type_preserved() {
        let json = r#"{"actionType": "coupon", "actionUrl": "X-10"}"#;
        let event: ToneEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.action_type, ActionType::Other("coupon".to_string()));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["actionType"], "coupon");
    }

    #[test]
    fn test_serializes_camel_case() {
        let event = ToneEvent::new(ActionType::Image, "https://img").with_tone_id("abc");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["actionType"], "image");
        assert_eq!(value["actionUrl"], "https://img");
        assert_eq!(value["toneId"], "abc");
        assert!(value["detectedAtMs"].as_i64().unwrap() > 0);
    }
}
