//! Campaign dispatcher: fans a campaign out across its targets.
//!
//! Each target runs as its own tokio task. A semaphore bounds how many run
//! at once and every unit has a timeout; one target's failure never affects
//! the others. A unit that times out keeps the steps it already saved and is
//! marked failed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crm_core::campaign::Campaign;
use crm_core::config::WorkflowConfig;
use crm_core::error::{CrmError, CrmResult};
use crm_core::store::LeadFilter;
use crm_core::types::EventType;

use crate::engine::WorkflowEngine;
use crate::types::{DispatchRequest, DispatchSummary, TargetOutcome};

pub struct CampaignDispatcher {
    engine: Arc<WorkflowEngine>,
    permits: Arc<Semaphore>,
    unit_timeout: Duration,
}

impl CampaignDispatcher {
    pub fn new(engine: Arc<WorkflowEngine>, config: &WorkflowConfig) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            unit_timeout: Duration::from_millis(config.step_timeout_ms),
        }
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// Runs the campaign for every resolved target and reports per-target
    /// results. Outside test mode the campaign is marked active once all
    /// targets have been processed.
    pub async fn dispatch(&self, req: DispatchRequest) -> CrmResult<DispatchSummary> {
        let campaign_id = req.campaign_id.trim();
        if campaign_id.is_empty() {
            return Err(CrmError::Validation("campaignId is required".into()));
        }

        let campaign = self.engine.get_campaign(campaign_id)?;
        if campaign.steps.is_empty() {
            return Err(CrmError::Validation(format!(
                "campaign {} has no steps",
                campaign_id
            )));
        }

        let targets = self.resolve_targets(&campaign, req.lead_ids)?;
        info!(
            campaign_id = %campaign.id,
            targets = targets.len(),
            test_mode = req.test_mode,
            "Dispatching campaign"
        );
        metrics::counter!("workflow.dispatches").increment(1);

        let campaign = Arc::new(campaign);
        let handles: Vec<(String, JoinHandle<TargetOutcome>)> = targets
            .into_iter()
            .map(|lead_id| {
                let handle = self.spawn_unit(campaign.clone(), lead_id.clone(), req.test_mode);
                (lead_id, handle)
            })
            .collect();

        let mut details = Vec::with_capacity(handles.len());
        for (lead_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(lead_id = %lead_id, error = %e, "Execution task panicked");
                    TargetOutcome::error(lead_id, format!("execution task aborted: {}", e))
                }
            };
            details.push(outcome);
        }

        if !req.test_mode {
            self.engine.activate_campaign(&campaign.id)?;
        }

        let summary = DispatchSummary::from_details(details);
        info!(
            campaign_id = %campaign.id,
            total = summary.total_leads,
            successful = summary.successful_executions,
            failed = summary.failed_executions,
            "Campaign dispatch finished"
        );
        self.engine.emit(
            EventType::CampaignDispatched,
            &campaign.id,
            None,
            None,
            serde_json::json!({
                "total": summary.total_leads,
                "successful": summary.successful_executions,
                "failed": summary.failed_executions,
                "test_mode": req.test_mode,
            }),
        );
        Ok(summary)
    }

    /// Explicit ids (trimmed, deduplicated, order kept) or, when none are
    /// usable, the owner's eligible leads.
    fn resolve_targets(
        &self,
        campaign: &Campaign,
        lead_ids: Option<Vec<String>>,
    ) -> CrmResult<Vec<String>> {
        let mut seen = HashSet::new();
        let explicit: Vec<String> = lead_ids
            .unwrap_or_default()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let filter = LeadFilter {
            owner_id: Some(campaign.owner_id.clone()),
            statuses: campaign.audience.statuses.clone(),
        };
        Ok(self
            .engine
            .store()
            .find_leads(&filter)?
            .into_iter()
            .map(|lead| lead.id)
            .collect())
    }

    fn spawn_unit(
        &self,
        campaign: Arc<Campaign>,
        lead_id: String,
        test_mode: bool,
    ) -> JoinHandle<TargetOutcome> {
        let engine = self.engine.clone();
        let permits = self.permits.clone();
        let unit_timeout = self.unit_timeout;

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return TargetOutcome::error(lead_id, format!("dispatcher closed: {}", e));
                }
            };

            let (execution, lead) = match engine.create_execution(&campaign, &lead_id, test_mode) {
                Ok(created) => created,
                Err(e) => {
                    warn!(
                        campaign_id = %campaign.id,
                        lead_id = %lead_id,
                        error = %e,
                        "Execution failed to start"
                    );
                    metrics::counter!("workflow.executions.errors").increment(1);
                    return TargetOutcome::error(lead_id, e.to_string());
                }
            };

            let execution_id = execution.id;
            let run = engine.run(execution, &campaign, lead);
            let result = match tokio::time::timeout(unit_timeout, run).await {
                Ok(result) => result,
                Err(_) => {
                    let timeout = CrmError::Timeout(unit_timeout.as_millis() as u64);
                    warn!(execution_id = %execution_id, lead_id = %lead_id, "Execution timed out");
                    metrics::counter!("workflow.executions.timeouts").increment(1);
                    engine.fail_execution(execution_id, &timeout)
                }
            };

            match result {
                Ok(execution) => TargetOutcome::from_execution(&execution),
                Err(e) => {
                    warn!(
                        execution_id = %execution_id,
                        lead_id = %lead_id,
                        error = %e,
                        "Execution could not be recorded"
                    );
                    metrics::counter!("workflow.executions.errors").increment(1);
                    TargetOutcome {
                        execution_id: Some(execution_id),
                        ..TargetOutcome::error(lead_id, e.to_string())
                    }
                }
            }
        })
    }
}
