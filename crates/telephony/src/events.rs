//! Wire types for telephony vendor webhooks.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Envelope posted by the telephony vendor for every call event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallWebhookPayload {
    /// Event name, e.g. `call.answered`.
    pub event: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub data: CallEventData,
}

/// Call snapshot carried by an event. Everything is optional; vendors send
/// only what they know at the time of the event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CallEventData {
    /// Vendor call id, a string or a number.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub direction: Option<String>,
    /// Customer-side number.
    #[serde(default, alias = "raw_digits")]
    pub from: Option<String>,
    /// Line that was dialled or dialled out from.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub answered_at: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default, alias = "recording")]
    pub recording_url: Option<String>,
    #[serde(default, alias = "voicemail")]
    pub voicemail_url: Option<String>,
    #[serde(default, alias = "content")]
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CallEventData {
    /// External call id as a string, if the event carries one.
    pub fn external_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Recognized call events. Names may carry a `call.` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Created,
    Ringing,
    Answered,
    Transferred,
    Hungup,
    Ended,
    VoicemailLeft,
    Commented,
    Tagged,
    Unknown(String),
}

impl CallEvent {
    pub fn parse(raw: &str) -> Self {
        let name = raw.trim().to_ascii_lowercase();
        let name = name.strip_prefix("call.").unwrap_or(name.as_str());
        match name {
            "created" => CallEvent::Created,
            "ringing" | "ringing_on_agent" => CallEvent::Ringing,
            "answered" => CallEvent::Answered,
            "transferred" => CallEvent::Transferred,
            "hungup" => CallEvent::Hungup,
            "ended" => CallEvent::Ended,
            "voicemail_left" => CallEvent::VoicemailLeft,
            "commented" => CallEvent::Commented,
            "tagged" => CallEvent::Tagged,
            _ => CallEvent::Unknown(raw.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CallEvent::Created => "created",
            CallEvent::Ringing => "ringing",
            CallEvent::Answered => "answered",
            CallEvent::Transferred => "transferred",
            CallEvent::Hungup => "hungup",
            CallEvent::Ended => "ended",
            CallEvent::VoicemailLeft => "voicemail_left",
            CallEvent::Commented => "commented",
            CallEvent::Tagged => "tagged",
            CallEvent::Unknown(raw) => raw,
        }
    }
}

pub(crate) fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}
