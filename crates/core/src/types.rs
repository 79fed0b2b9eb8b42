use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ─── Lead ──────────────────────────────────────────────────────────────────

/// A prospective student record that campaigns act upon.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Lead {
    pub id: String,
    /// Counselor/admissions user that owns this lead.
    pub owner_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub custom_fields: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Applied,
    Enrolled,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Applied => "applied",
            LeadStatus::Enrolled => "enrolled",
            LeadStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Some(LeadStatus::New),
            "contacted" => Some(LeadStatus::Contacted),
            "qualified" => Some(LeadStatus::Qualified),
            "applied" => Some(LeadStatus::Applied),
            "enrolled" => Some(LeadStatus::Enrolled),
            "lost" => Some(LeadStatus::Lost),
            _ => None,
        }
    }
}

impl Lead {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            program: None,
            status: LeadStatus::New,
            custom_fields: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Full name if any part of it is on file.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Reads a named field as a JSON value. Built-in fields take precedence
    /// over custom fields of the same name.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        let text = |v: &Option<String>| v.clone().map(serde_json::Value::String);
        match name {
            "id" => Some(serde_json::Value::String(self.id.clone())),
            "owner_id" => Some(serde_json::Value::String(self.owner_id.clone())),
            "first_name" => text(&self.first_name),
            "last_name" => text(&self.last_name),
            "email" => text(&self.email),
            "phone" => text(&self.phone),
            "program" => text(&self.program),
            "status" => Some(serde_json::Value::String(self.status.as_str().to_string())),
            other => self.custom_fields.get(other).cloned(),
        }
    }

    /// Digits of the phone number, used to match telephony events.
    pub fn phone_digits(&self) -> Option<String> {
        self.phone
            .as_deref()
            .map(normalize_phone)
            .filter(|d| !d.is_empty())
    }
}

/// Strips everything but digits, keeping the last ten so that country code
/// prefixes do not prevent a match.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

// ─── Communication ─────────────────────────────────────────────────────────

/// An outbound message recorded against a lead.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Communication {
    pub id: Uuid,
    pub lead_id: String,
    pub campaign_id: Option<String>,
    pub execution_id: Option<Uuid>,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: CommunicationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    Sent,
    Test,
}

// ─── Task ──────────────────────────────────────────────────────────────────

/// A follow-up reminder assigned to a counselor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub lead_id: String,
    pub assigned_to: String,
    pub campaign_id: Option<String>,
    pub execution_id: Option<Uuid>,
    pub title: String,
    pub notes: Option<String>,
    pub due_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Done,
}

// ─── Call ──────────────────────────────────────────────────────────────────

/// A telephony call, keyed by the vendor's call id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Call {
    pub id: Uuid,
    pub external_id: String,
    pub lead_id: Option<String>,
    pub direction: Option<CallDirection>,
    pub status: CallStatus,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub agent_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<u64>,
    pub recording_url: Option<String>,
    pub voicemail_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    pub last_event: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Answered,
    Transferred,
    Completed,
    Missed,
    Voicemail,
}

impl Call {
    pub fn new(external_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            lead_id: None,
            direction: None,
            status: CallStatus::Initiated,
            from_number: None,
            to_number: None,
            agent_name: None,
            started_at: None,
            answered_at: None,
            ended_at: None,
            duration_secs: None,
            recording_url: None,
            voicemail_url: None,
            tags: Vec::new(),
            comments: Vec::new(),
            last_event: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ─── Workflow Events ───────────────────────────────────────────────────────

/// Kinds of events emitted while campaigns run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CampaignDispatched,
    CampaignActivated,
    ExecutionStarted,
    StepCompleted,
    StepSkipped,
    StepFailed,
    ExecutionWaiting,
    ExecutionCompleted,
    ExecutionFailed,
    CallEventIngested,
}

/// A workflow event handed to the configured [`crate::event_bus::EventSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub campaign_id: Option<String>,
    pub lead_id: Option<String>,
    pub execution_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
