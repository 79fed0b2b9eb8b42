use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crm_core::campaign::{Execution, ExecutionStatus};

/// Request to fan a campaign out across its targets.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub campaign_id: String,
    /// Explicit targets. When absent or empty, the campaign's audience
    /// filter selects the owner's eligible leads.
    #[serde(default)]
    pub lead_ids: Option<Vec<String>>,
    #[serde(default)]
    pub test_mode: bool,
}

/// Aggregate result of a dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub total_leads: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub details: Vec<TargetOutcome>,
}

impl DispatchSummary {
    pub fn from_details(details: Vec<TargetOutcome>) -> Self {
        let failed_executions = details.iter().filter(|d| d.error.is_some()).count();
        Self {
            total_leads: details.len(),
            successful_executions: details.len() - failed_executions,
            failed_executions,
            details,
        }
    }
}

/// Per-target line of a dispatch summary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutcome {
    pub lead_id: String,
    pub status: TargetStatus,
    pub execution_id: Option<Uuid>,
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn from_execution(execution: &Execution) -> Self {
        Self {
            lead_id: execution.lead_id.clone(),
            status: execution.status.into(),
            execution_id: Some(execution.id),
            error: execution.error.clone(),
        }
    }

    pub fn error(lead_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            lead_id: lead_id.into(),
            status: TargetStatus::Error,
            execution_id: None,
            error: Some(error.into()),
        }
    }
}

/// Resulting status of one target: its execution status, or `error` when
/// no execution could be run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Test,
    Completed,
    Failed,
    Error,
}

impl From<ExecutionStatus> for TargetStatus {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Pending => TargetStatus::Pending,
            ExecutionStatus::Test => TargetStatus::Test,
            ExecutionStatus::Completed => TargetStatus::Completed,
            ExecutionStatus::Failed => TargetStatus::Failed,
        }
    }
}

/// Execution counts for one campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CampaignStats {
    pub campaign_id: String,
    pub total: u64,
    pub pending: u64,
    /// Pending executions parked on a wait step.
    pub waiting: u64,
    pub test: u64,
    pub completed: u64,
    pub failed: u64,
    pub communications_sent: u64,
    pub tasks_created: u64,
}

/// What one scheduler pass did.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TickReport {
    pub due: usize,
    pub resumed: usize,
    pub completed: usize,
    pub failed: usize,
    pub waiting: usize,
    /// Due executions another pass claimed first.
    pub skipped: usize,
    pub errors: usize,
}
