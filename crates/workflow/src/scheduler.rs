//! Continuation scheduler: resumes executions parked on a wait step once
//! their `next_run_at` has passed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crm_core::campaign::{CampaignStatus, ExecutionStatus};
use crm_core::config::WorkflowConfig;
use crm_core::error::CrmResult;

use crate::engine::WorkflowEngine;
use crate::types::TickReport;

pub struct ContinuationScheduler {
    engine: Arc<WorkflowEngine>,
    batch_size: usize,
    interval: Duration,
    tick_lock: Mutex<()>,
}

impl ContinuationScheduler {
    pub fn new(engine: Arc<WorkflowEngine>, config: &WorkflowConfig) -> Self {
        Self {
            engine,
            batch_size: config.scheduler_batch_size.max(1),
            interval: Duration::from_secs(config.scheduler_interval_secs.max(1)),
            tick_lock: Mutex::new(()),
        }
    }

    /// One pass over due executions. Executions of paused campaigns stay
    /// parked until the campaign is running again. Passes never overlap,
    /// and each execution is claimed in the store before it resumes.
    pub async fn tick(&self) -> CrmResult<TickReport> {
        let _guard = self.tick_lock.lock().await;
        let store = self.engine.store();

        let paused: Vec<String> = store
            .list_campaigns()?
            .into_iter()
            .filter(|c| c.status == CampaignStatus::Paused)
            .map(|c| c.id)
            .collect();
        let due = store.due_executions(Utc::now(), self.batch_size, &paused)?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        for execution in due {
            let execution_id = execution.id;
            let claimed = match execution.next_run_at {
                Some(expected) => store.claim_due_execution(execution_id, expected)?,
                None => None,
            };
            let Some(claimed) = claimed else {
                debug!(execution_id = %execution_id, "Execution already claimed");
                report.skipped += 1;
                continue;
            };

            match self.engine.resume_execution(claimed).await {
                Ok(resumed) => {
                    report.resumed += 1;
                    match resumed.status {
                        ExecutionStatus::Completed => report.completed += 1,
                        ExecutionStatus::Failed => report.failed += 1,
                        _ => report.waiting += 1,
                    }
                }
                Err(e) => {
                    warn!(execution_id = %execution_id, error = %e, "Failed to resume execution");
                    report.errors += 1;
                    if let Err(e) = self.engine.fail_execution(execution_id, &e) {
                        error!(
                            execution_id = %execution_id,
                            error = %e,
                            "Failed to record resume error"
                        );
                    }
                }
            }
        }

        metrics::counter!("workflow.scheduler.resumed").increment(report.resumed as u64);
        info!(
            due = report.due,
            resumed = report.resumed,
            skipped = report.skipped,
            errors = report.errors,
            "Scheduler tick complete"
        );
        Ok(report)
    }

    /// Runs `tick` on a fixed interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "Continuation scheduler started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.tick().await {
                    error!(error = %e, "Scheduler tick failed");
                }
            }
        })
    }
}
