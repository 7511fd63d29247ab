//! Mapping from a detected tone to the action the consumer should perform.

use crate::{ActionType, ToneEvent};
use serde::{Deserialize, Serialize};

/// Text used when composing SMS and mail actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionTemplates {
    pub sms_body: String,
    pub mail_subject: String,
    pub mail_body: String,
}

impl Default for ActionTemplates {
    fn default() -> Self {
        Self {
            sms_body: "Use this coupon for 10% off in your next visit".to_string(),
            mail_subject: "COUPON".to_string(),
            mail_body: "Use this coupon for 10% off in your next visit".to_string(),
        }
    }
}

/// What the consumer layer should do for a tone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "camelCase")]
pub enum ActionTarget {
    /// Present the image at this URL.
    ShowImage(String),
    /// Hand this URI to the platform opener.
    OpenUrl(String),
}

/// Resolve the action for a tone.
///
/// Returns `None` for unknown action kinds and for tones without a target.
pub fn resolve_action(event: &ToneEvent, templates: &ActionTemplates) -> Option<ActionTarget> {
    let target = event.action_url.trim();
    if target.is_empty() {
        tracing::debug!(action_type = %event.action_type, "tone has no action target");
        return None;
    }

    let action = match &event.action_type {
        ActionType::Image => ActionTarget::ShowImage(target.to_string()),
        ActionType::Webpage => ActionTarget::OpenUrl(target.to_string()),
        ActionType::Sms => {
            ActionTarget::OpenUrl(format!("sms:{}?body={}", target, templates.sms_body))
        }
        ActionType::Tel => ActionTarget::OpenUrl(format!("tel:{}", target)),
        ActionType::Mail => ActionTarget::OpenUrl(format!(
            "mailto:{}?subject={}&body={}",
            target, templates.mail_subject, templates.mail_body
        )),
        ActionType::Other(kind) => {
            tracing::debug!(kind = %kind, "no action for tone kind");
            return None;
        }
    };

    Some(action)
}
