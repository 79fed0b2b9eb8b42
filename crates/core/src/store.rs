//! Persistence boundary for campaigns, leads, executions, and the records
//! steps produce.
//!
//! `InMemoryStore` is backed by DashMap for development and tests; a
//! relational implementation only has to satisfy the same trait.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::campaign::{Campaign, Execution, ExecutionStatus};
use crate::error::{CrmError, CrmResult};
use crate::types::{normalize_phone, Call, Communication, Lead, LeadStatus, Task};

/// Equality filters for lead lookups. Empty `statuses` matches every status.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub owner_id: Option<String>,
    pub statuses: Vec<LeadStatus>,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        self.owner_id.as_ref().map_or(true, |o| &lead.owner_id == o)
            && (self.statuses.is_empty() || self.statuses.contains(&lead.status))
    }
}

/// Storage contract used by the workflow engine and ingestion adapters.
/// Inserts return the created row; updates replace the stored row.
pub trait CrmStore: Send + Sync {
    // Campaigns
    fn insert_campaign(&self, campaign: Campaign) -> CrmResult<Campaign>;
    fn get_campaign(&self, id: &str) -> CrmResult<Option<Campaign>>;
    fn list_campaigns(&self) -> CrmResult<Vec<Campaign>>;
    fn update_campaign(&self, campaign: Campaign) -> CrmResult<Campaign>;

    // Leads
    fn insert_lead(&self, lead: Lead) -> CrmResult<Lead>;
    fn get_lead(&self, id: &str) -> CrmResult<Option<Lead>>;
    fn update_lead(&self, lead: Lead) -> CrmResult<Lead>;
    fn find_leads(&self, filter: &LeadFilter) -> CrmResult<Vec<Lead>>;
    fn find_lead_by_phone(&self, phone: &str) -> CrmResult<Option<Lead>>;

    // Executions
    fn insert_execution(&self, execution: Execution) -> CrmResult<Execution>;
    fn get_execution(&self, id: Uuid) -> CrmResult<Option<Execution>>;
    fn update_execution(&self, execution: Execution) -> CrmResult<Execution>;
    fn list_executions(&self, campaign_id: &str) -> CrmResult<Vec<Execution>>;
    /// Pending executions whose `next_run_at` is at or before `now`, oldest
    /// first. Executions of campaigns in `exclude_campaigns` are not returned
    /// and do not count toward `limit`.
    fn due_executions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        exclude_campaigns: &[String],
    ) -> CrmResult<Vec<Execution>>;
    /// Atomically takes a parked execution for resumption: clears
    /// `next_run_at` only if the row is still pending with the expected
    /// resume time. Returns `None` when another caller got there first.
    fn claim_due_execution(
        &self,
        id: Uuid,
        expected_next_run_at: DateTime<Utc>,
    ) -> CrmResult<Option<Execution>>;

    // Step side effects
    fn insert_communication(&self, communication: Communication) -> CrmResult<Communication>;
    fn list_communications(&self, lead_id: &str) -> CrmResult<Vec<Communication>>;
    fn insert_task(&self, task: Task) -> CrmResult<Task>;
    fn list_tasks(&self, lead_id: &str) -> CrmResult<Vec<Task>>;

    // Calls
    fn get_call(&self, external_id: &str) -> CrmResult<Option<Call>>;
    fn upsert_call(&self, call: Call) -> CrmResult<Call>;
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    campaigns: DashMap<String, Campaign>,
    leads: DashMap<String, Lead>,
    executions: DashMap<Uuid, Execution>,
    communications: DashMap<Uuid, Communication>,
    tasks: DashMap<Uuid, Task>,
    calls: DashMap<String, Call>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        info!("CRM store initialized (in-memory)");
        Self::default()
    }
}

impl CrmStore for InMemoryStore {
    fn insert_campaign(&self, campaign: Campaign) -> CrmResult<Campaign> {
        if self.campaigns.contains_key(&campaign.id) {
            return Err(CrmError::Storage(format!(
                "campaign {} already exists",
                campaign.id
            )));
        }
        self.campaigns.insert(campaign.id.clone(), campaign.clone());
        Ok(campaign)
    }

    fn get_campaign(&self, id: &str) -> CrmResult<Option<Campaign>> {
        Ok(self.campaigns.get(id).map(|r| r.value().clone()))
    }

    fn list_campaigns(&self) -> CrmResult<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> =
            self.campaigns.iter().map(|r| r.value().clone()).collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    fn update_campaign(&self, campaign: Campaign) -> CrmResult<Campaign> {
        let mut entry = self
            .campaigns
            .get_mut(&campaign.id)
            .ok_or_else(|| CrmError::not_found("Campaign", campaign.id.clone()))?;
        *entry = campaign.clone();
        Ok(campaign)
    }

    fn insert_lead(&self, lead: Lead) -> CrmResult<Lead> {
        if self.leads.contains_key(&lead.id) {
            return Err(CrmError::Storage(format!("lead {} already exists", lead.id)));
        }
        self.leads.insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    fn get_lead(&self, id: &str) -> CrmResult<Option<Lead>> {
        Ok(self.leads.get(id).map(|r| r.value().clone()))
    }

    fn update_lead(&self, lead: Lead) -> CrmResult<Lead> {
        let mut entry = self
            .leads
            .get_mut(&lead.id)
            .ok_or_else(|| CrmError::not_found("Lead", lead.id.clone()))?;
        *entry = lead.clone();
        Ok(lead)
    }

    fn find_leads(&self, filter: &LeadFilter) -> CrmResult<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(leads)
    }

    fn find_lead_by_phone(&self, phone: &str) -> CrmResult<Option<Lead>> {
        let wanted = normalize_phone(phone);
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self
            .leads
            .iter()
            .find(|r| r.value().phone_digits().as_deref() == Some(wanted.as_str()))
            .map(|r| r.value().clone()))
    }

    fn insert_execution(&self, execution: Execution) -> CrmResult<Execution> {
        self.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    fn get_execution(&self, id: Uuid) -> CrmResult<Option<Execution>> {
        Ok(self.executions.get(&id).map(|r| r.value().clone()))
    }

    fn update_execution(&self, execution: Execution) -> CrmResult<Execution> {
        let mut entry = self
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| CrmError::not_found("Execution", execution.id.to_string()))?;
        *entry = execution.clone();
        Ok(execution)
    }

    fn list_executions(&self, campaign_id: &str) -> CrmResult<Vec<Execution>> {
        let mut executions: Vec<Execution> = self
            .executions
            .iter()
            .filter(|r| r.value().campaign_id == campaign_id)
            .map(|r| r.value().clone())
            .collect();
        executions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(executions)
    }

    fn due_executions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        exclude_campaigns: &[String],
    ) -> CrmResult<Vec<Execution>> {
        let mut due: Vec<Execution> = self
            .executions
            .iter()
            .filter(|r| {
                let e = r.value();
                e.status == ExecutionStatus::Pending
                    && e.next_run_at.is_some_and(|t| t <= now)
                    && !exclude_campaigns.contains(&e.campaign_id)
            })
            .map(|r| r.value().clone())
            .collect();
        due.sort_by_key(|e| e.next_run_at);
        due.truncate(limit);
        Ok(due)
    }

    fn claim_due_execution(
        &self,
        id: Uuid,
        expected_next_run_at: DateTime<Utc>,
    ) -> CrmResult<Option<Execution>> {
        let Some(mut entry) = self.executions.get_mut(&id) else {
            return Ok(None);
        };
        if entry.status != ExecutionStatus::Pending
            || entry.next_run_at != Some(expected_next_run_at)
        {
            return Ok(None);
        }
        entry.next_run_at = None;
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }

    fn insert_communication(&self, communication: Communication) -> CrmResult<Communication> {
        self.communications
            .insert(communication.id, communication.clone());
        Ok(communication)
    }

    fn list_communications(&self, lead_id: &str) -> CrmResult<Vec<Communication>> {
        let mut comms: Vec<Communication> = self
            .communications
            .iter()
            .filter(|r| r.value().lead_id == lead_id)
            .map(|r| r.value().clone())
            .collect();
        comms.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comms)
    }

    fn insert_task(&self, task: Task) -> CrmResult<Task> {
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn list_tasks(&self, lead_id: &str) -> CrmResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|r| r.value().lead_id == lead_id)
            .map(|r| r.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        Ok(tasks)
    }

    fn get_call(&self, external_id: &str) -> CrmResult<Option<Call>> {
        Ok(self.calls.get(external_id).map(|r| r.value().clone()))
    }

    fn upsert_call(&self, call: Call) -> CrmResult<Call> {
        self.calls.insert(call.external_id.clone(), call.clone());
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{AudienceFilter, CampaignStatus};
    use chrono::Duration;

    fn lead(id: &str, owner: &str, status: LeadStatus) -> Lead {
        let mut lead = Lead::new(id, owner);
        lead.status = status;
        lead
    }

    fn execution(campaign_id: &str, next_run_at: Option<DateTime<Utc>>) -> Execution {
        let now = Utc::now();
        Execution {
            id: Uuid::new_v4(),
            campaign_id: campaign_id.to_string(),
            lead_id: "l1".to_string(),
            status: ExecutionStatus::Pending,
            data: serde_json::json!({}),
            current_step: 1,
            next_run_at,
            history: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_find_leads_by_owner_and_status() {
        let store = InMemoryStore::new();
        store.insert_lead(lead("a", "o1", LeadStatus::New)).unwrap();
        store.insert_lead(lead("b", "o1", LeadStatus::Enrolled)).unwrap();
        store.insert_lead(lead("c", "o2", LeadStatus::New)).unwrap();

        let found = store
            .find_leads(&LeadFilter {
                owner_id: Some("o1".into()),
                statuses: AudienceFilter::default().statuses,
            })
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        let all = store.find_leads(&LeadFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_lead(lead("a", "o1", LeadStatus::New)).unwrap();
        let err = store.insert_lead(lead("a", "o1", LeadStatus::New)).unwrap_err();
        assert!(matches!(err, CrmError::Storage(_)));
    }

    #[test]
    fn test_update_missing_campaign_is_not_found() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let campaign = Campaign {
            id: "missing".into(),
            owner_id: "o1".into(),
            name: "x".into(),
            description: None,
            status: CampaignStatus::Draft,
            audience: AudienceFilter::default(),
            steps: Vec::new(),
            started_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            store.update_campaign(campaign),
            Err(CrmError::NotFound { .. })
        ));
    }

    #[test]
    fn test_due_executions_only_returns_elapsed_pending() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let due = store
            .insert_execution(execution("c1", Some(now - Duration::minutes(5))))
            .unwrap();
        store
            .insert_execution(execution("c1", Some(now + Duration::minutes(5))))
            .unwrap();
        store.insert_execution(execution("c1", None)).unwrap();
        let mut finished = execution("c1", Some(now - Duration::minutes(10)));
        finished.status = ExecutionStatus::Completed;
        store.insert_execution(finished).unwrap();

        let found = store.due_executions(now, 10, &[]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
        assert!(store.due_executions(now, 0, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_excluded_campaigns_do_not_fill_the_batch() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for _ in 0..3 {
            store
                .insert_execution(execution("paused", Some(now - Duration::minutes(30))))
                .unwrap();
        }
        let active = store
            .insert_execution(execution("active", Some(now - Duration::minutes(1))))
            .unwrap();

        let found = store.due_executions(now, 2, &["paused".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, active.id);
    }

    #[test]
    fn test_claim_due_execution_succeeds_once() {
        let store = InMemoryStore::new();
        let resume_at = Utc::now() - Duration::minutes(1);
        let parked = store.insert_execution(execution("c1", Some(resume_at))).unwrap();

        let stale = resume_at - Duration::minutes(1);
        assert!(store.claim_due_execution(parked.id, stale).unwrap().is_none());

        let claimed = store.claim_due_execution(parked.id, resume_at).unwrap().unwrap();
        assert!(claimed.next_run_at.is_none());
        assert!(store.claim_due_execution(parked.id, resume_at).unwrap().is_none());
        assert!(store.due_executions(Utc::now(), 10, &[]).unwrap().is_empty());
        assert!(store
            .claim_due_execution(Uuid::new_v4(), resume_at)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_lead_by_phone_normalizes() {
        let store = InMemoryStore::new();
        let mut l = lead("a", "o1", LeadStatus::New);
        l.phone = Some("(555) 123-4567".into());
        store.insert_lead(l).unwrap();

        let found = store.find_lead_by_phone("+1 555 123 4567").unwrap();
        assert_eq!(found.map(|l| l.id), Some("a".to_string()));
        assert!(store.find_lead_by_phone("").unwrap().is_none());
    }
}
