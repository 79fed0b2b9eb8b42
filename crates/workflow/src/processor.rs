//! Step processor: performs one step's side effect for one lead.
//!
//! Every handler returns a `CrmResult<StepOutcome>`; the processor catches
//! handler errors, logs them, and reports them as `StepOutcome::Failed` so
//! the caller can record the failure on the execution.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crm_core::campaign::{
    CallConfig, Campaign, EmailConfig, Execution, SmsConfig, Step, StepKind, StepOutcome,
    UpdateLeadConfig, WaitConfig, WebhookConfig,
};
use crm_core::error::{CrmError, CrmResult};
use crm_core::store::CrmStore;
use crm_core::types::{Channel, Communication, CommunicationStatus, Lead, Task, TaskStatus};

use crate::evaluator::ConditionEvaluator;
use crate::personalize::personalize;
use crate::webhook::WebhookClient;

/// Everything a handler needs to know about the run it is part of.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub campaign: &'a Campaign,
    pub execution: &'a Execution,
    pub lead: &'a Lead,
    pub test_mode: bool,
}

pub struct StepProcessor {
    store: Arc<dyn CrmStore>,
    webhooks: WebhookClient,
    evaluator: ConditionEvaluator,
}

impl StepProcessor {
    pub fn new(store: Arc<dyn CrmStore>, webhooks: WebhookClient) -> Self {
        Self {
            store,
            webhooks,
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// Runs the handler for `step` and returns what it did. Never fails:
    /// handler errors become `StepOutcome::Failed`.
    pub async fn process(&self, step: &Step, ctx: &StepContext<'_>) -> StepOutcome {
        info!(
            execution_id = %ctx.execution.id,
            lead_id = %ctx.lead.id,
            step_id = %step.id,
            step_type = step.kind.label(),
            test_mode = ctx.test_mode,
            "Processing step"
        );

        let result = match &step.kind {
            StepKind::Email(cfg) => self.send_email(cfg, ctx),
            StepKind::Sms(cfg) => self.send_sms(cfg, ctx),
            StepKind::Call(cfg) => self.create_call_task(cfg, ctx),
            StepKind::Wait(cfg) => Ok(Self::schedule_wait(cfg, Utc::now())),
            StepKind::Condition(cfg) => Ok(if self.evaluator.evaluate(cfg, ctx.lead) {
                StepOutcome::ConditionMet
            } else {
                StepOutcome::ConditionNotMet
            }),
            StepKind::Webhook(cfg) => self.deliver_webhook(cfg, ctx).await,
            StepKind::UpdateLead(cfg) => self.update_lead(cfg, ctx),
        };

        let outcome = result.unwrap_or_else(|e| {
            error!(
                execution_id = %ctx.execution.id,
                lead_id = %ctx.lead.id,
                step_type = step.kind.label(),
                error = %e,
                "Step handler failed"
            );
            StepOutcome::Failed {
                error: e.to_string(),
            }
        });

        metrics::counter!(
            "workflow.steps",
            "type" => step.kind.label(),
            "outcome" => outcome_label(&outcome)
        )
        .increment(1);

        outcome
    }

    fn send_email(&self, cfg: &EmailConfig, ctx: &StepContext<'_>) -> CrmResult<StepOutcome> {
        let Some(to) = present(ctx.lead.email.as_deref()) else {
            info!(lead_id = %ctx.lead.id, "Lead has no email address, skipping email step");
            return Ok(StepOutcome::Skipped {
                reason: "lead has no email address".to_string(),
            });
        };

        let communication = self.store.insert_communication(Communication {
            id: Uuid::new_v4(),
            lead_id: ctx.lead.id.clone(),
            campaign_id: Some(ctx.campaign.id.clone()),
            execution_id: Some(ctx.execution.id),
            channel: Channel::Email,
            recipient: to.to_string(),
            subject: Some(personalize(&cfg.subject, ctx.lead)),
            body: personalize(&cfg.body, ctx.lead),
            status: communication_status(ctx.test_mode),
            created_at: Utc::now(),
        })?;

        info!(communication_id = %communication.id, to = %to, "Email recorded");
        Ok(StepOutcome::Sent {
            communication_id: communication.id,
        })
    }

    fn send_sms(&self, cfg: &SmsConfig, ctx: &StepContext<'_>) -> CrmResult<StepOutcome> {
        let Some(to) = present(ctx.lead.phone.as_deref()) else {
            info!(lead_id = %ctx.lead.id, "Lead has no phone number, skipping SMS step");
            return Ok(StepOutcome::Skipped {
                reason: "lead has no phone number".to_string(),
            });
        };

        let communication = self.store.insert_communication(Communication {
            id: Uuid::new_v4(),
            lead_id: ctx.lead.id.clone(),
            campaign_id: Some(ctx.campaign.id.clone()),
            execution_id: Some(ctx.execution.id),
            channel: Channel::Sms,
            recipient: to.to_string(),
            subject: None,
            body: personalize(&cfg.body, ctx.lead),
            status: communication_status(ctx.test_mode),
            created_at: Utc::now(),
        })?;

        info!(communication_id = %communication.id, to = %to, "SMS recorded");
        Ok(StepOutcome::Sent {
            communication_id: communication.id,
        })
    }

    fn create_call_task(&self, cfg: &CallConfig, ctx: &StepContext<'_>) -> CrmResult<StepOutcome> {
        let now = Utc::now();
        let mut title = personalize(&cfg.title, ctx.lead);
        if ctx.test_mode {
            title = format!("TEST: {}", title);
        }

        let task = self.store.insert_task(Task {
            id: Uuid::new_v4(),
            lead_id: ctx.lead.id.clone(),
            assigned_to: ctx.lead.owner_id.clone(),
            campaign_id: Some(ctx.campaign.id.clone()),
            execution_id: Some(ctx.execution.id),
            title,
            notes: cfg.notes.as_deref().map(|n| personalize(n, ctx.lead)),
            due_at: add_or_max(now, Duration::hours(i64::from(cfg.due_in_hours))),
            status: TaskStatus::Open,
            created_at: now,
        })?;

        info!(task_id = %task.id, assigned_to = %task.assigned_to, "Call task created");
        Ok(StepOutcome::TaskCreated { task_id: task.id })
    }

    fn schedule_wait(cfg: &WaitConfig, now: DateTime<Utc>) -> StepOutcome {
        let resume_at = add_or_max(now, cfg.duration());
        info!(amount = cfg.amount, unit = ?cfg.unit, %resume_at, "Wait step scheduled");
        StepOutcome::Waiting { resume_at }
    }

    async fn deliver_webhook(
        &self,
        cfg: &WebhookConfig,
        ctx: &StepContext<'_>,
    ) -> CrmResult<StepOutcome> {
        if ctx.test_mode {
            return Ok(StepOutcome::Skipped {
                reason: "webhooks are not delivered in test mode".to_string(),
            });
        }

        let mut payload = serde_json::json!({
            "event": "campaign.step",
            "campaign_id": ctx.campaign.id,
            "campaign_name": ctx.campaign.name,
            "execution_id": ctx.execution.id,
            "lead_id": ctx.lead.id,
            "lead": serde_json::to_value(ctx.lead)?,
            "sent_at": Utc::now(),
        });
        if let (Some(extra), Some(obj)) = (
            cfg.payload.as_ref().and_then(|p| p.as_object()),
            payload.as_object_mut(),
        ) {
            for (key, value) in extra {
                obj.insert(key.clone(), value.clone());
            }
        }

        let status = self.webhooks.deliver(&cfg.url, &payload).await?;
        Ok(StepOutcome::WebhookDelivered { status })
    }

    fn update_lead(&self, cfg: &UpdateLeadConfig, ctx: &StepContext<'_>) -> CrmResult<StepOutcome> {
        if ctx.test_mode {
            return Ok(StepOutcome::Skipped {
                reason: "leads are not modified in test mode".to_string(),
            });
        }

        let mut lead = self
            .store
            .get_lead(&ctx.lead.id)?
            .ok_or_else(|| CrmError::not_found("Lead", ctx.lead.id.clone()))?;
        let mut changed = Vec::new();

        if let Some(status) = cfg.status {
            lead.status = status;
            changed.push("status".to_string());
        }
        for (name, value) in &cfg.fields {
            apply_field(&mut lead, name, value)?;
            changed.push(name.clone());
        }
        lead.updated_at = Utc::now();
        self.store.update_lead(lead)?;

        info!(lead_id = %ctx.lead.id, fields = ?changed, "Lead updated by campaign");
        Ok(StepOutcome::LeadUpdated { fields: changed })
    }
}

fn apply_field(lead: &mut Lead, name: &str, value: &serde_json::Value) -> CrmResult<()> {
    let text = || match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        other => Err(CrmError::Validation(format!(
            "field {} expects a string, got {}",
            name, other
        ))),
    };
    match name {
        "first_name" => lead.first_name = text()?,
        "last_name" => lead.last_name = text()?,
        "email" => lead.email = text()?,
        "phone" => lead.phone = text()?,
        "program" => lead.program = text()?,
        "id" | "owner_id" | "status" => {
            return Err(CrmError::Validation(format!(
                "field {} cannot be set through the fields map",
                name
            )))
        }
        custom => {
            lead.custom_fields.insert(custom.to_string(), value.clone());
        }
    }
    Ok(())
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn communication_status(test_mode: bool) -> CommunicationStatus {
    if test_mode {
        CommunicationStatus::Test
    } else {
        CommunicationStatus::Sent
    }
}

fn add_or_max(now: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn outcome_label(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Sent { .. } => "sent",
        StepOutcome::TaskCreated { .. } => "task_created",
        StepOutcome::Waiting { .. } => "waiting",
        StepOutcome::ConditionMet => "condition_met",
        StepOutcome::ConditionNotMet => "condition_not_met",
        StepOutcome::WebhookDelivered { .. } => "webhook_delivered",
        StepOutcome::LeadUpdated { .. } => "lead_updated",
        StepOutcome::Skipped { .. } => "skipped",
        StepOutcome::Failed { .. } => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::campaign::{
        build_steps, AudienceFilter, CampaignStatus, ConditionConfig, ConditionOperator,
        DelayUnit, ExecutionStatus,
    };
    use crm_core::store::InMemoryStore;
    use crm_core::types::LeadStatus;

    struct Fixture {
        store: Arc<InMemoryStore>,
        processor: StepProcessor,
        campaign: Campaign,
        execution: Execution,
    }

    fn fixture(kinds: Vec<StepKind>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let processor = StepProcessor::new(
            store.clone(),
            WebhookClient::new(std::time::Duration::from_secs(2)).unwrap(),
        );
        let now = Utc::now();
        let campaign = Campaign {
            id: "c1".into(),
            owner_id: "o1".into(),
            name: "Fall intake".into(),
            description: None,
            status: CampaignStatus::Draft,
            audience: AudienceFilter::default(),
            steps: build_steps(kinds),
            started_at: None,
            created_at: now,
            updated_at: now,
        };
        let execution = Execution {
            id: Uuid::new_v4(),
            campaign_id: "c1".into(),
            lead_id: "l1".into(),
            status: ExecutionStatus::Pending,
            data: serde_json::json!({}),
            current_step: 0,
            next_run_at: None,
            history: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        Fixture {
            store,
            processor,
            campaign,
            execution,
        }
    }

    fn lead() -> Lead {
        let mut lead = Lead::new("l1", "o1");
        lead.first_name = Some("Sam".into());
        lead.email = Some("sam@example.com".into());
        lead.phone = Some("+15551112222".into());
        lead.program = Some("Data Science".into());
        lead
    }

    async fn run_first(f: &Fixture, lead: &Lead, test_mode: bool) -> StepOutcome {
        let ctx = StepContext {
            campaign: &f.campaign,
            execution: &f.execution,
            lead,
            test_mode,
        };
        f.processor.process(&f.campaign.steps[0], &ctx).await
    }

    #[tokio::test]
    async fn test_email_is_personalized_and_recorded() {
        let f = fixture(vec![StepKind::Email(EmailConfig {
            subject: "[First Name], about [Program]".into(),
            body: "Hi [First Name]!".into(),
        })]);
        let outcome = run_first(&f, &lead(), false).await;
        assert!(matches!(outcome, StepOutcome::Sent { .. }));

        let comms = f.store.list_communications("l1").unwrap();
        assert_eq!(comms.len(), 1);
        assert_eq!(comms[0].channel, Channel::Email);
        assert_eq!(comms[0].status, CommunicationStatus::Sent);
        assert_eq!(comms[0].subject.as_deref(), Some("Sam, about Data Science"));
        assert_eq!(comms[0].body, "Hi Sam!");
        assert_eq!(comms[0].execution_id, Some(f.execution.id));
    }

    #[tokio::test]
    async fn test_test_mode_marks_communications() {
        let f = fixture(vec![StepKind::Sms(SmsConfig {
            body: "Hello [First Name]".into(),
        })]);
        run_first(&f, &lead(), true).await;
        let comms = f.store.list_communications("l1").unwrap();
        assert_eq!(comms[0].status, CommunicationStatus::Test);
        assert_eq!(comms[0].channel, Channel::Sms);
    }

    #[tokio::test]
    async fn test_sms_without_phone_is_skipped() {
        let f = fixture(vec![StepKind::Sms(SmsConfig { body: "Hi".into() })]);
        let mut no_phone = lead();
        no_phone.phone = None;
        let outcome = run_first(&f, &no_phone, false).await;
        assert!(matches!(outcome, StepOutcome::Skipped { .. }));
        assert!(f.store.list_communications("l1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_creates_task_for_owner() {
        let f = fixture(vec![StepKind::Call(CallConfig {
            title: "Call [Full Name]".into(),
            notes: Some("Ask about [Program]".into()),
            due_in_hours: 24,
        })]);
        let before = Utc::now();
        let outcome = run_first(&f, &lead(), false).await;
        assert!(matches!(outcome, StepOutcome::TaskCreated { .. }));

        let tasks = f.store.list_tasks("l1").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].assigned_to, "o1");
        assert_eq!(tasks[0].title, "Call Sam");
        assert_eq!(tasks[0].notes.as_deref(), Some("Ask about Data Science"));
        assert!(tasks[0].due_at >= before + Duration::hours(24));
        assert!(tasks[0].due_at <= Utc::now() + Duration::hours(24));
    }

    #[tokio::test]
    async fn test_wait_reports_resume_time() {
        let f = fixture(vec![StepKind::Wait(WaitConfig {
            amount: 3,
            unit: DelayUnit::Days,
        })]);
        let outcome = run_first(&f, &lead(), false).await;
        match outcome {
            StepOutcome::Waiting { resume_at } => {
                assert!(resume_at > Utc::now() + Duration::days(2));
            }
            other => panic!("expected waiting, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_condition_outcomes() {
        let f = fixture(vec![StepKind::Condition(ConditionConfig {
            field: "program".into(),
            operator: ConditionOperator::Equals,
            value: serde_json::json!("data science"),
        })]);
        assert_eq!(run_first(&f, &lead(), false).await, StepOutcome::ConditionMet);
        let mut other = lead();
        other.program = Some("Law".into());
        assert_eq!(run_first(&f, &other, false).await, StepOutcome::ConditionNotMet);
    }

    #[tokio::test]
    async fn test_update_lead_applies_fields() {
        let mut fields = serde_json::Map::new();
        fields.insert("program".into(), serde_json::json!("Nursing"));
        fields.insert("source".into(), serde_json::json!("campaign"));
        let f = fixture(vec![StepKind::UpdateLead(UpdateLeadConfig {
            status: Some(LeadStatus::Contacted),
            fields,
        })]);
        f.store.insert_lead(lead()).unwrap();

        let outcome = run_first(&f, &lead(), false).await;
        assert!(matches!(outcome, StepOutcome::LeadUpdated { .. }));
        let stored = f.store.get_lead("l1").unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Contacted);
        assert_eq!(stored.program.as_deref(), Some("Nursing"));
        assert_eq!(
            stored.custom_fields.get("source"),
            Some(&serde_json::json!("campaign"))
        );
    }

    #[tokio::test]
    async fn test_handler_errors_become_failed_outcomes() {
        // The lead was never stored, so the update handler cannot load it.
        let f = fixture(vec![StepKind::UpdateLead(UpdateLeadConfig {
            status: Some(LeadStatus::Lost),
            fields: serde_json::Map::new(),
        })]);
        let outcome = run_first(&f, &lead(), false).await;
        match outcome {
            StepOutcome::Failed { error } => assert!(error.contains("not found")),
            other => panic!("expected failure, got {:?}", other),
        }

        let f = fixture(vec![StepKind::Webhook(WebhookConfig {
            url: "ftp://example.com/hook".into(),
            payload: None,
        })]);
        assert!(run_first(&f, &lead(), false).await.is_failure());
        assert!(matches!(
            run_first(&f, &lead(), true).await,
            StepOutcome::Skipped { .. }
        ));
    }
}
