//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Admissions CRM API",
        version = "0.1.0",
        description = "Campaign workflows for admissions teams.\n\nDispatches multi-step outreach campaigns to leads and ingests telephony call events.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Campaigns", description = "Campaign definitions and dispatch"),
        (name = "Leads", description = "Leads and the records campaigns create for them"),
        (name = "Scheduler", description = "Continuation of parked executions"),
        (name = "Telephony", description = "Call event webhooks and call records"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        crate::rest::execute_campaign,
        crate::rest::handle_call_webhook,
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
        crate::management::list_campaigns,
        crate::management::create_campaign,
        crate::management::get_campaign,
        crate::management::replace_steps,
        crate::management::pause_campaign,
        crate::management::list_executions,
        crate::management::campaign_stats,
        crate::management::create_lead,
        crate::management::get_lead,
        crate::management::lead_communications,
        crate::management::lead_tasks,
        crate::management::run_scheduler_tick,
        crate::management::get_call,
    ),
    components(schemas(
        crm_core::campaign::Campaign,
        crm_core::campaign::CampaignStatus,
        crm_core::campaign::AudienceFilter,
        crm_core::campaign::CreateCampaignRequest,
        crm_core::campaign::Step,
        crm_core::campaign::StepKind,
        crm_core::campaign::EmailConfig,
        crm_core::campaign::SmsConfig,
        crm_core::campaign::CallConfig,
        crm_core::campaign::WaitConfig,
        crm_core::campaign::DelayUnit,
        crm_core::campaign::ConditionConfig,
        crm_core::campaign::ConditionOperator,
        crm_core::campaign::WebhookConfig,
        crm_core::campaign::UpdateLeadConfig,
        crm_core::campaign::Execution,
        crm_core::campaign::ExecutionStatus,
        crm_core::campaign::StepRecord,
        crm_core::campaign::StepOutcome,
        crm_core::types::Lead,
        crm_core::types::LeadStatus,
        crm_core::types::Communication,
        crm_core::types::Channel,
        crm_core::types::CommunicationStatus,
        crm_core::types::Task,
        crm_core::types::TaskStatus,
        crm_core::types::Call,
        crm_core::types::CallDirection,
        crm_core::types::CallStatus,
        crm_workflow::types::DispatchRequest,
        crm_workflow::types::DispatchSummary,
        crm_workflow::types::TargetOutcome,
        crm_workflow::types::TargetStatus,
        crm_workflow::types::CampaignStats,
        crm_workflow::types::TickReport,
        crm_telephony::CallWebhookPayload,
        crm_telephony::CallEventData,
        crate::management::ReplaceStepsRequest,
        crate::management::CreateLeadRequest,
        crate::rest::ExecuteResponse,
        crate::rest::WebhookAck,
        crate::rest::HealthResponse,
        crate::error::ErrorResponse,
    ))
)]
pub struct ApiDoc;
