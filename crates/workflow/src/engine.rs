use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crm_core::campaign::{
    build_steps, Campaign, CampaignStatus, CreateCampaignRequest, Execution, ExecutionStatus,
    StepKind, StepOutcome, StepRecord,
};
use crm_core::error::{CrmError, CrmResult};
use crm_core::event_bus::{make_event, noop_sink, EventSink};
use crm_core::store::CrmStore;
use crm_core::types::{EventType, Lead};

use crate::processor::{StepContext, StepProcessor};
use crate::state_machine::ExecutionStateMachine;
use crate::types::CampaignStats;
use crate::webhook::validate_url;

/// Orchestration engine. Manages campaign definitions and drives
/// executions through their steps.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn CrmStore>,
    processor: Arc<StepProcessor>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine").finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn CrmStore>, processor: Arc<StepProcessor>) -> Self {
        Self {
            store,
            processor,
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting workflow events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn store(&self) -> &Arc<dyn CrmStore> {
        &self.store
    }

    pub(crate) fn emit(
        &self,
        event_type: EventType,
        campaign_id: &str,
        lead_id: Option<&str>,
        execution_id: Option<Uuid>,
        detail: serde_json::Value,
    ) {
        let mut event = make_event(event_type, Some(campaign_id), lead_id, execution_id);
        event.detail = detail;
        self.event_sink.emit(event);
    }

    // ─── Campaigns ─────────────────────────────────────────────────────────

    /// Validates and stores a new draft campaign.
    pub fn create_campaign(&self, req: CreateCampaignRequest) -> CrmResult<Campaign> {
        if req.name.trim().is_empty() {
            return Err(CrmError::Validation("campaign name must not be empty".into()));
        }
        if req.owner_id.trim().is_empty() {
            return Err(CrmError::Validation("campaign owner_id must not be empty".into()));
        }
        validate_steps(&req.steps)?;

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            owner_id: req.owner_id,
            name: req.name,
            description: req.description,
            status: CampaignStatus::Draft,
            audience: req.audience,
            steps: build_steps(req.steps),
            started_at: None,
            created_at: now,
            updated_at: now,
        };
        info!(
            campaign_id = %campaign.id,
            name = %campaign.name,
            steps = campaign.steps.len(),
            "Creating campaign"
        );
        self.store.insert_campaign(campaign)
    }

    pub fn get_campaign(&self, id: &str) -> CrmResult<Campaign> {
        self.store
            .get_campaign(id)?
            .ok_or_else(|| CrmError::not_found("Campaign", id))
    }

    pub fn list_campaigns(&self) -> CrmResult<Vec<Campaign>> {
        self.store.list_campaigns()
    }

    /// Replaces the step list. Steps are frozen once a campaign leaves draft.
    pub fn replace_steps(&self, id: &str, kinds: Vec<StepKind>) -> CrmResult<Campaign> {
        let mut campaign = self.get_campaign(id)?;
        if campaign.status != CampaignStatus::Draft {
            return Err(CrmError::Validation(format!(
                "steps of campaign {} can only change while it is a draft",
                id
            )));
        }
        validate_steps(&kinds)?;
        campaign.steps = build_steps(kinds);
        campaign.updated_at = Utc::now();
        info!(campaign_id = %id, steps = campaign.steps.len(), "Campaign steps replaced");
        self.store.update_campaign(campaign)
    }

    /// Marks a campaign active. The first start timestamp is kept.
    pub fn activate_campaign(&self, id: &str) -> CrmResult<Campaign> {
        let mut campaign = self.get_campaign(id)?;
        let now = Utc::now();
        campaign.status = CampaignStatus::Active;
        campaign.started_at.get_or_insert(now);
        campaign.updated_at = now;
        info!(campaign_id = %id, "Campaign activated");
        self.emit(
            EventType::CampaignActivated,
            id,
            None,
            None,
            serde_json::Value::Null,
        );
        self.store.update_campaign(campaign)
    }

    /// Pauses an active campaign; parked executions stay parked until it is
    /// dispatched again.
    pub fn pause_campaign(&self, id: &str) -> CrmResult<Campaign> {
        let mut campaign = self.get_campaign(id)?;
        if campaign.status != CampaignStatus::Active {
            return Err(CrmError::InvalidTransition {
                from: format!("{:?}", campaign.status).to_lowercase(),
                to: "paused".into(),
            });
        }
        campaign.status = CampaignStatus::Paused;
        campaign.updated_at = Utc::now();
        info!(campaign_id = %id, "Campaign paused");
        self.store.update_campaign(campaign)
    }

    /// Execution counts for a campaign.
    pub fn campaign_stats(&self, id: &str) -> CrmResult<CampaignStats> {
        self.get_campaign(id)?;
        let mut stats = CampaignStats {
            campaign_id: id.to_string(),
            ..CampaignStats::default()
        };
        for execution in self.store.list_executions(id)? {
            stats.total += 1;
            match execution.status {
                ExecutionStatus::Pending => {
                    stats.pending += 1;
                    if execution.next_run_at.is_some() {
                        stats.waiting += 1;
                    }
                }
                ExecutionStatus::Test => stats.test += 1,
                ExecutionStatus::Completed => stats.completed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
            }
            for record in &execution.history {
                match record.outcome {
                    StepOutcome::Sent { .. } => stats.communications_sent += 1,
                    StepOutcome::TaskCreated { .. } => stats.tasks_created += 1,
                    _ => {}
                }
            }
        }
        Ok(stats)
    }

    // ─── Executions ────────────────────────────────────────────────────────

    /// Creates the execution for one lead and runs it. In test mode only the
    /// first step is processed.
    pub async fn start_execution(
        &self,
        campaign: &Campaign,
        lead_id: &str,
        test_mode: bool,
    ) -> CrmResult<Execution> {
        let (execution, lead) = self.create_execution(campaign, lead_id, test_mode)?;
        self.run(execution, campaign, lead).await
    }

    /// Stores a fresh execution for one lead without running any step.
    pub fn create_execution(
        &self,
        campaign: &Campaign,
        lead_id: &str,
        test_mode: bool,
    ) -> CrmResult<(Execution, Lead)> {
        let lead = self
            .store
            .get_lead(lead_id)?
            .ok_or_else(|| CrmError::not_found("Lead", lead_id))?;

        let now = Utc::now();
        let execution = Execution {
            id: Uuid::new_v4(),
            campaign_id: campaign.id.clone(),
            lead_id: lead.id.clone(),
            status: if test_mode {
                ExecutionStatus::Test
            } else {
                ExecutionStatus::Pending
            },
            data: serde_json::json!({
                "lead_name": lead.full_name(),
                "lead_email": lead.email,
                "lead_phone": lead.phone,
                "program": lead.program,
                "campaign_name": campaign.name,
                "test_mode": test_mode,
                "started_at": now,
            }),
            current_step: 0,
            next_run_at: None,
            history: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let execution = self.store.insert_execution(execution)?;

        info!(
            execution_id = %execution.id,
            campaign_id = %campaign.id,
            lead_id = %lead.id,
            test_mode,
            "Execution started"
        );
        metrics::counter!("workflow.executions.started").increment(1);
        self.emit(
            EventType::ExecutionStarted,
            &campaign.id,
            Some(&lead.id),
            Some(execution.id),
            serde_json::json!({ "test_mode": test_mode }),
        );

        Ok((execution, lead))
    }

    /// Records `err` on a stored execution that was cut short. Pending
    /// executions become failed; test executions keep their status.
    /// Executions that already finished are returned unchanged.
    pub fn fail_execution(&self, id: Uuid, err: &CrmError) -> CrmResult<Execution> {
        let mut execution = self
            .store
            .get_execution(id)?
            .ok_or_else(|| CrmError::not_found("Execution", id.to_string()))?;
        if execution.status.is_terminal() {
            return Ok(execution);
        }
        execution.error = Some(err.to_string());
        if execution.status == ExecutionStatus::Test {
            execution.updated_at = Utc::now();
            return self.store.update_execution(execution);
        }
        let mut machine = ExecutionStateMachine::new(execution.status);
        self.finish(execution, &mut machine, ExecutionStatus::Failed)
    }

    /// Continues a parked execution from its current step.
    pub async fn resume_execution(&self, mut execution: Execution) -> CrmResult<Execution> {
        if execution.status != ExecutionStatus::Pending {
            return Err(CrmError::InvalidTransition {
                from: execution.status.to_string(),
                to: ExecutionStatus::Pending.to_string(),
            });
        }
        let campaign = self.get_campaign(&execution.campaign_id)?;
        let lead = self
            .store
            .get_lead(&execution.lead_id)?
            .ok_or_else(|| CrmError::not_found("Lead", execution.lead_id.clone()))?;

        info!(
            execution_id = %execution.id,
            campaign_id = %campaign.id,
            step = execution.current_step,
            "Resuming execution"
        );
        execution.next_run_at = None;
        self.run(execution, &campaign, lead).await
    }

    /// Processes steps from `execution.current_step` until the sequence ends,
    /// a wait parks the execution, a condition exits, or a step fails. Test
    /// executions process a single step. Progress is persisted after every
    /// step.
    pub(crate) async fn run(
        &self,
        mut execution: Execution,
        campaign: &Campaign,
        mut lead: Lead,
    ) -> CrmResult<Execution> {
        let steps = campaign.ordered_steps();
        let test_mode = execution.status == ExecutionStatus::Test;
        let mut machine = ExecutionStateMachine::new(execution.status);

        while let Some(step) = steps.get(execution.current_step).copied() {
            let started_at = Utc::now();
            let outcome = {
                let ctx = StepContext {
                    campaign,
                    execution: &execution,
                    lead: &lead,
                    test_mode,
                };
                self.processor.process(step, &ctx).await
            };

            execution.history.push(StepRecord {
                step_id: step.id,
                step_type: step.kind.label().to_string(),
                position: step.position,
                outcome: outcome.clone(),
                started_at,
                completed_at: Utc::now(),
            });
            execution.current_step += 1;
            machine.transition(execution.status)?;
            execution.updated_at = Utc::now();
            execution = self.store.update_execution(execution)?;

            let campaign_id = campaign.id.as_str();
            let lead_id = Some(lead.id.as_str());
            let execution_id = Some(execution.id);
            let detail = serde_json::json!({
                "step_id": step.id,
                "step_type": step.kind.label(),
            });
            match &outcome {
                StepOutcome::Failed { error } => {
                    execution.error = Some(format!(
                        "step {} ({}) failed: {}",
                        step.position,
                        step.kind.label(),
                        error
                    ));
                    self.emit(EventType::StepFailed, campaign_id, lead_id, execution_id, detail);
                    if !test_mode {
                        return self.finish(execution, &mut machine, ExecutionStatus::Failed);
                    }
                    break;
                }
                StepOutcome::Waiting { resume_at } => {
                    self.emit(EventType::StepCompleted, campaign_id, lead_id, execution_id, detail);
                    if !test_mode {
                        execution.next_run_at = Some(*resume_at);
                        execution.updated_at = Utc::now();
                        self.emit(
                            EventType::ExecutionWaiting,
                            campaign_id,
                            lead_id,
                            execution_id,
                            serde_json::json!({ "resume_at": resume_at }),
                        );
                        return self.store.update_execution(execution);
                    }
                    break;
                }
                StepOutcome::ConditionNotMet => {
                    self.emit(EventType::StepCompleted, campaign_id, lead_id, execution_id, detail);
                    if !test_mode {
                        if let Some(data) = execution.data.as_object_mut() {
                            let reason = format!("condition at step {} not met", step.position);
                            data.insert("exit_reason".into(), serde_json::Value::String(reason));
                        }
                        return self.finish(execution, &mut machine, ExecutionStatus::Completed);
                    }
                    break;
                }
                StepOutcome::Skipped { .. } => {
                    self.emit(EventType::StepSkipped, campaign_id, lead_id, execution_id, detail);
                }
                StepOutcome::LeadUpdated { .. } => {
                    self.emit(EventType::StepCompleted, campaign_id, lead_id, execution_id, detail);
                    if let Some(updated) = self.store.get_lead(&lead.id)? {
                        lead = updated;
                    }
                }
                _ => {
                    self.emit(EventType::StepCompleted, campaign_id, lead_id, execution_id, detail);
                }
            }

            if test_mode {
                break;
            }
        }

        if test_mode {
            execution.updated_at = Utc::now();
            return self.store.update_execution(execution);
        }
        self.finish(execution, &mut machine, ExecutionStatus::Completed)
    }

    fn finish(
        &self,
        mut execution: Execution,
        machine: &mut ExecutionStateMachine,
        status: ExecutionStatus,
    ) -> CrmResult<Execution> {
        machine.transition(status)?;
        let now = Utc::now();
        execution.status = status;
        execution.next_run_at = None;
        execution.updated_at = now;
        execution.completed_at = Some(now);

        let event_type = if status == ExecutionStatus::Failed {
            warn!(execution_id = %execution.id, error = ?execution.error, "Execution failed");
            metrics::counter!("workflow.executions.failed").increment(1);
            EventType::ExecutionFailed
        } else {
            info!(
                execution_id = %execution.id,
                steps = execution.history.len(),
                "Execution completed"
            );
            metrics::counter!("workflow.executions.completed").increment(1);
            EventType::ExecutionCompleted
        };
        self.emit(
            event_type,
            &execution.campaign_id,
            Some(&execution.lead_id),
            Some(execution.id),
            serde_json::Value::Null,
        );
        self.store.update_execution(execution)
    }
}

/// Rejects step configurations that could never succeed.
pub fn validate_steps(kinds: &[StepKind]) -> CrmResult<()> {
    for (i, kind) in kinds.iter().enumerate() {
        let problem = match kind {
            StepKind::Email(cfg) if cfg.subject.trim().is_empty() => {
                Some("subject must not be empty")
            }
            StepKind::Email(cfg) if cfg.body.trim().is_empty() => Some("body must not be empty"),
            StepKind::Sms(cfg) if cfg.body.trim().is_empty() => Some("body must not be empty"),
            StepKind::Wait(cfg) if cfg.amount == 0 => Some("wait amount must be positive"),
            StepKind::Condition(cfg) if cfg.field.trim().is_empty() => {
                Some("field must not be empty")
            }
            StepKind::Webhook(cfg) => {
                validate_url(&cfg.url)?;
                None
            }
            _ => None,
        };
        if let Some(msg) = problem {
            return Err(CrmError::Validation(format!(
                "step {} ({}): {}",
                i,
                kind.label(),
                msg
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::campaign::{
        AudienceFilter, ConditionConfig, ConditionOperator, DelayUnit, EmailConfig, SmsConfig,
        UpdateLeadConfig, WaitConfig,
    };
    use crm_core::event_bus::capture_sink;
    use crm_core::store::InMemoryStore;
    use crm_core::types::LeadStatus;
    use crate::webhook::WebhookClient;

    fn engine() -> (WorkflowEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let processor = Arc::new(StepProcessor::new(
            store.clone(),
            WebhookClient::new(std::time::Duration::from_secs(2)).unwrap(),
        ));
        (WorkflowEngine::new(store.clone(), processor), store)
    }

    fn email(subject: &str) -> StepKind {
        StepKind::Email(EmailConfig {
            subject: subject.into(),
            body: "Hi [First Name]".into(),
        })
    }

    fn request(steps: Vec<StepKind>) -> CreateCampaignRequest {
        CreateCampaignRequest {
            name: "Spring open house".into(),
            owner_id: "o1".into(),
            description: None,
            audience: AudienceFilter::default(),
            steps,
        }
    }

    fn seed_lead(store: &InMemoryStore, id: &str) -> Lead {
        let mut lead = Lead::new(id, "o1");
        lead.first_name = Some("Riley".into());
        lead.email = Some(format!("{}@example.com", id));
        store.insert_lead(lead).unwrap()
    }

    #[test]
    fn test_create_campaign_validates() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.create_campaign(CreateCampaignRequest {
                name: " ".into(),
                ..request(vec![])
            }),
            Err(CrmError::Validation(_))
        ));
        assert!(engine.create_campaign(request(vec![email("")])).is_err());
        assert!(engine
            .create_campaign(request(vec![StepKind::Wait(WaitConfig {
                amount: 0,
                unit: DelayUnit::Hours
            })]))
            .is_err());

        let campaign = engine.create_campaign(request(vec![email("Hello")])).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.steps.len(), 1);
        assert_eq!(engine.get_campaign(&campaign.id).unwrap().name, "Spring open house");
    }

    #[test]
    fn test_steps_are_frozen_after_activation() {
        let (engine, _) = engine();
        let campaign = engine.create_campaign(request(vec![email("a")])).unwrap();
        let updated = engine
            .replace_steps(&campaign.id, vec![email("a"), email("b")])
            .unwrap();
        assert_eq!(updated.steps.len(), 2);

        let active = engine.activate_campaign(&campaign.id).unwrap();
        let started = active.started_at.unwrap();
        assert!(engine.replace_steps(&campaign.id, vec![email("c")]).is_err());

        // Re-activation keeps the original start timestamp.
        let again = engine.activate_campaign(&campaign.id).unwrap();
        assert_eq!(again.started_at, Some(started));

        assert_eq!(
            engine.pause_campaign(&campaign.id).unwrap().status,
            CampaignStatus::Paused
        );
        assert!(engine.pause_campaign(&campaign.id).is_err());
    }

    #[tokio::test]
    async fn test_runs_until_wait_then_resumes() {
        let (engine, store) = engine();
        let sink = capture_sink();
        let engine = engine.with_event_sink(sink.clone());
        let campaign = engine
            .create_campaign(request(vec![
                email("first"),
                StepKind::Wait(WaitConfig {
                    amount: 2,
                    unit: DelayUnit::Days,
                }),
                StepKind::Sms(SmsConfig { body: "Hi".into() }),
                email("last"),
            ]))
            .unwrap();
        seed_lead(&store, "l1");

        let parked = engine.start_execution(&campaign, "l1", false).await.unwrap();
        assert_eq!(parked.status, ExecutionStatus::Pending);
        assert_eq!(parked.current_step, 2);
        assert!(parked.next_run_at.is_some());
        assert_eq!(store.list_communications("l1").unwrap().len(), 1);
        assert_eq!(sink.count_type(EventType::ExecutionWaiting), 1);

        let done = engine.resume_execution(parked).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert!(done.next_run_at.is_none());
        assert!(done.completed_at.is_some());
        assert_eq!(done.history.len(), 4);
        // The SMS step was skipped for lack of a phone number.
        assert!(matches!(done.history[2].outcome, StepOutcome::Skipped { .. }));
        assert_eq!(store.list_communications("l1").unwrap().len(), 2);
        assert_eq!(sink.count_type(EventType::ExecutionCompleted), 1);

        // Terminal executions cannot be resumed.
        assert!(matches!(
            engine.resume_execution(done).await,
            Err(CrmError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_test_mode_processes_only_first_step() {
        let (engine, store) = engine();
        let campaign = engine
            .create_campaign(request(vec![email("one"), email("two")]))
            .unwrap();
        seed_lead(&store, "l1");

        let execution = engine.start_execution(&campaign, "l1", true).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Test);
        assert_eq!(execution.history.len(), 1);
        assert_eq!(execution.data["test_mode"], true);
        assert_eq!(store.list_communications("l1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_condition_not_met_exits() {
        let (engine, store) = engine();
        let campaign = engine
            .create_campaign(request(vec![
                StepKind::Condition(ConditionConfig {
                    field: "status".into(),
                    operator: ConditionOperator::Equals,
                    value: serde_json::json!("qualified"),
                }),
                email("never"),
            ]))
            .unwrap();
        seed_lead(&store, "l1");

        let execution = engine.start_execution(&campaign, "l1", false).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.history.len(), 1);
        assert!(execution.data["exit_reason"].is_string());
        assert!(store.list_communications("l1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_lead_is_visible_to_later_steps() {
        let (engine, store) = engine();
        let mut fields = serde_json::Map::new();
        fields.insert("program".into(), serde_json::json!("Robotics"));
        let campaign = engine
            .create_campaign(request(vec![
                StepKind::UpdateLead(UpdateLeadConfig {
                    status: Some(LeadStatus::Contacted),
                    fields,
                }),
                StepKind::Email(EmailConfig {
                    subject: "About [Program]".into(),
                    body: "b".into(),
                }),
            ]))
            .unwrap();
        seed_lead(&store, "l1");

        let execution = engine.start_execution(&campaign, "l1", false).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let comms = store.list_communications("l1").unwrap();
        assert_eq!(comms[0].subject.as_deref(), Some("About Robotics"));
    }

    #[tokio::test]
    async fn test_failed_step_fails_execution() {
        let (engine, store) = engine();
        let campaign = engine
            .create_campaign(request(vec![
                StepKind::Webhook(crm_core::campaign::WebhookConfig {
                    url: "http://127.0.0.1:9/unreachable".into(),
                    payload: None,
                }),
                email("after"),
            ]))
            .unwrap();
        seed_lead(&store, "l1");

        let execution = engine.start_execution(&campaign, "l1", false).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.as_deref().unwrap_or("").contains("webhook"));
        assert_eq!(execution.history.len(), 1);
        assert!(store.list_communications("l1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_count_statuses() {
        let (engine, store) = engine();
        let campaign = engine.create_campaign(request(vec![email("x")])).unwrap();
        seed_lead(&store, "l1");
        seed_lead(&store, "l2");
        engine.start_execution(&campaign, "l1", false).await.unwrap();
        engine.start_execution(&campaign, "l2", true).await.unwrap();

        let stats = engine.campaign_stats(&campaign.id).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.test, 1);
        assert_eq!(stats.communications_sent, 2);
    }

    #[test]
    fn test_fail_execution_records_error() {
        let (engine, store) = engine();
        let campaign = engine.create_campaign(request(vec![email("x")])).unwrap();
        seed_lead(&store, "l1");
        seed_lead(&store, "l2");

        let (pending, _) = engine.create_execution(&campaign, "l1", false).unwrap();
        let failed = engine.fail_execution(pending.id, &CrmError::Timeout(100)).unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Timed out after 100 ms"));
        assert!(failed.completed_at.is_some());
        let stored = store.get_execution(pending.id).unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);

        // Finished executions are left alone.
        let again = engine.fail_execution(pending.id, &CrmError::Timeout(5)).unwrap();
        assert_eq!(again.error.as_deref(), Some("Timed out after 100 ms"));

        let (test_run, _) = engine.create_execution(&campaign, "l2", true).unwrap();
        let marked = engine.fail_execution(test_run.id, &CrmError::Timeout(100)).unwrap();
        assert_eq!(marked.status, ExecutionStatus::Test);
        assert!(marked.error.is_some());
    }

    #[tokio::test]
    async fn test_progress_is_saved_after_each_step() {
        let (engine, store) = engine();
        let campaign = engine
            .create_campaign(request(vec![
                email("first"),
                StepKind::Wait(WaitConfig {
                    amount: 1,
                    unit: DelayUnit::Hours,
                }),
            ]))
            .unwrap();
        seed_lead(&store, "l1");

        let (created, lead) = engine.create_execution(&campaign, "l1", false).unwrap();
        let parked = engine.run(created, &campaign, lead).await.unwrap();
        let stored = store.get_execution(parked.id).unwrap().unwrap();
        assert_eq!(stored.current_step, 2);
        assert_eq!(stored.history.len(), 2);
        assert_eq!(stored.next_run_at, parked.next_run_at);
    }

    #[tokio::test]
    async fn test_missing_lead_is_an_error() {
        let (engine, _) = engine();
        let campaign = engine.create_campaign(request(vec![email("x")])).unwrap();
        assert!(matches!(
            engine.start_execution(&campaign, "ghost", false).await,
            Err(CrmError::NotFound { .. })
        ));
    }
}
