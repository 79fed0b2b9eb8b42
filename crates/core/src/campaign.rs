//! Campaign, step, and execution records shared by the workflow engine, the
//! store, and the API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::LeadStatus;

// ─── Campaign ──────────────────────────────────────────────────────────────

/// A named automation: an ordered list of steps run against a set of leads.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Campaign {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: CampaignStatus,
    #[serde(default)]
    pub audience: AudienceFilter,
    pub steps: Vec<Step>,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// Which of the owner's leads a campaign targets when no explicit list is
/// given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AudienceFilter {
    #[serde(default = "default_eligible_statuses")]
    pub statuses: Vec<LeadStatus>,
}

fn default_eligible_statuses() -> Vec<LeadStatus> {
    vec![LeadStatus::New, LeadStatus::Contacted, LeadStatus::Qualified]
}

impl Default for AudienceFilter {
    fn default() -> Self {
        Self {
            statuses: default_eligible_statuses(),
        }
    }
}

impl Campaign {
    /// Steps in execution order.
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.position);
        steps
    }

    /// The step at `index` in execution order.
    pub fn step_at(&self, index: usize) -> Option<&Step> {
        self.ordered_steps().get(index).copied()
    }
}

// ─── Step ──────────────────────────────────────────────────────────────────

/// One typed action within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Step {
    pub id: Uuid,
    pub position: u32,
    #[serde(flatten)]
    pub kind: StepKind,
}

/// The kind of work a step performs, with its configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Email(EmailConfig),
    Sms(SmsConfig),
    Call(CallConfig),
    Wait(WaitConfig),
    Condition(ConditionConfig),
    Webhook(WebhookConfig),
    UpdateLead(UpdateLeadConfig),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Email(_) => "email",
            StepKind::Sms(_) => "sms",
            StepKind::Call(_) => "call",
            StepKind::Wait(_) => "wait",
            StepKind::Condition(_) => "condition",
            StepKind::Webhook(_) => "webhook",
            StepKind::UpdateLead(_) => "update_lead",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct EmailConfig {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SmsConfig {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CallConfig {
    #[serde(default = "default_call_title")]
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_due_in_hours")]
    pub due_in_hours: u32,
}

fn default_call_title() -> String {
    "Follow-up call with [Full Name]".to_string()
}
fn default_due_in_hours() -> u32 {
    24
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            title: default_call_title(),
            notes: None,
            due_in_hours: default_due_in_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WaitConfig {
    pub amount: u64,
    #[serde(default)]
    pub unit: DelayUnit,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Minutes,
    #[default]
    Hours,
    Days,
}

impl WaitConfig {
    pub fn duration(&self) -> Duration {
        let amount = i64::try_from(self.amount).unwrap_or(i64::MAX);
        match self.unit {
            DelayUnit::Minutes => Duration::minutes(amount.min(i64::MAX / 60_000)),
            DelayUnit::Hours => Duration::hours(amount.min(i64::MAX / 3_600_000)),
            DelayUnit::Days => Duration::days(amount.min(i64::MAX / 86_400_000)),
        }
    }
}

/// A predicate over one lead field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ConditionConfig {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    Exists,
    NotExists,
    In,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WebhookConfig {
    pub url: String,
    /// Extra fields merged into the delivered payload.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UpdateLeadConfig {
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

// ─── Execution ─────────────────────────────────────────────────────────────

/// One target's run through a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Execution {
    pub id: Uuid,
    pub campaign_id: String,
    pub lead_id: String,
    pub status: ExecutionStatus,
    /// Snapshot of the target's identity and run metadata.
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    /// Index (in execution order) of the next step to run.
    pub current_step: usize,
    /// When a parked execution becomes due again.
    pub next_run_at: Option<DateTime<Utc>>,
    pub history: Vec<StepRecord>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Test,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Test => "test",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a step that has been processed for an execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepRecord {
    pub step_id: Uuid,
    pub step_type: String,
    pub position: u32,
    pub outcome: StepOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// What a step handler did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Sent { communication_id: Uuid },
    TaskCreated { task_id: Uuid },
    Waiting { resume_at: DateTime<Utc> },
    ConditionMet,
    ConditionNotMet,
    WebhookDelivered { status: u16 },
    LeadUpdated { fields: Vec<String> },
    Skipped { reason: String },
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

// ─── Requests ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub audience: AudienceFilter,
    #[serde(default)]
    pub steps: Vec<StepKind>,
}

/// Builds positioned steps from kinds in the given order.
pub fn build_steps(kinds: Vec<StepKind>) -> Vec<Step> {
    kinds
        .into_iter()
        .enumerate()
        .map(|(i, kind)| Step {
            id: Uuid::new_v4(),
            position: i as u32,
            kind,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_wire_format() {
        let step: Step = serde_json::from_value(serde_json::json!({
            "id": "6f1c1a7e-2a53-4b57-9d0c-2f7e0f0a8b11",
            "position": 0,
            "type": "email",
            "subject": "Hi [First Name]",
            "body": "Welcome"
        }))
        .unwrap();
        assert_eq!(step.kind.label(), "email");

        let wait: StepKind =
            serde_json::from_value(serde_json::json!({"type": "wait", "amount": 2})).unwrap();
        match wait {
            StepKind::Wait(cfg) => assert_eq!(cfg.duration(), Duration::hours(2)),
            other => panic!("expected wait, got {:?}", other),
        }
    }

    #[test]
    fn test_call_defaults() {
        let kind: StepKind = serde_json::from_value(serde_json::json!({"type": "call"})).unwrap();
        match kind {
            StepKind::Call(cfg) => {
                assert_eq!(cfg.due_in_hours, 24);
                assert!(cfg.title.contains("[Full Name]"));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_ordered_steps_follow_position() {
        let now = Utc::now();
        let mut steps = build_steps(vec![
            StepKind::Sms(SmsConfig { body: "a".into() }),
            StepKind::Sms(SmsConfig { body: "b".into() }),
        ]);
        steps.reverse();
        let campaign = Campaign {
            id: "c1".into(),
            owner_id: "o1".into(),
            name: "Test".into(),
            description: None,
            status: CampaignStatus::Draft,
            audience: AudienceFilter::default(),
            steps,
            started_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(campaign.step_at(0).map(|s| s.position), Some(0));
        assert_eq!(campaign.step_at(1).map(|s| s.position), Some(1));
        assert!(campaign.step_at(2).is_none());
    }

    #[test]
    fn test_huge_wait_does_not_overflow() {
        let cfg = WaitConfig {
            amount: u64::MAX,
            unit: DelayUnit::Days,
        };
        assert!(cfg.duration() > Duration::days(1));
    }
}
