//! Campaign workflows: step processing, per-lead executions, campaign
//! dispatch, and the scheduler that resumes executions parked on waits.

pub mod dispatcher;
pub mod engine;
pub mod evaluator;
pub mod personalize;
pub mod processor;
pub mod scheduler;
pub mod state_machine;
pub mod types;
pub mod webhook;

pub use dispatcher::CampaignDispatcher;
pub use engine::WorkflowEngine;
pub use personalize::personalize;
pub use processor::StepProcessor;
pub use scheduler::ContinuationScheduler;
pub use webhook::WebhookClient;
