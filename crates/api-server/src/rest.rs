//! REST handlers for campaign dispatch, telephony webhooks, and operational
//! endpoints.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crm_core::config::AppConfig;
use crm_core::error::CrmResult;
use crm_core::event_bus::EventSink;
use crm_core::store::CrmStore;
use crm_telephony::{CallEventIngestor, CallWebhookPayload, IngestOutcome};
use crm_workflow::types::{DispatchRequest, DispatchSummary};
use crm_workflow::{
    CampaignDispatcher, ContinuationScheduler, StepProcessor, WebhookClient, WorkflowEngine,
};

use crate::error::{ApiError, ErrorResponse};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CrmStore>,
    pub engine: Arc<WorkflowEngine>,
    pub dispatcher: Arc<CampaignDispatcher>,
    pub scheduler: Arc<ContinuationScheduler>,
    pub ingestor: Arc<CallEventIngestor>,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    /// Wires the workflow and telephony components over one store.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn CrmStore>,
        event_sink: Arc<dyn EventSink>,
    ) -> CrmResult<Self> {
        let webhooks =
            WebhookClient::new(Duration::from_millis(config.workflow.webhook_timeout_ms))?;
        let processor = Arc::new(StepProcessor::new(store.clone(), webhooks));
        let engine = Arc::new(
            WorkflowEngine::new(store.clone(), processor).with_event_sink(event_sink.clone()),
        );
        let dispatcher = Arc::new(CampaignDispatcher::new(engine.clone(), &config.workflow));
        let scheduler = Arc::new(ContinuationScheduler::new(engine.clone(), &config.workflow));
        let ingestor = Arc::new(
            CallEventIngestor::new(store.clone(), config.telephony.webhook_token.clone())
                .with_event_sink(event_sink),
        );

        Ok(Self {
            store,
            engine,
            dispatcher,
            scheduler,
            ingestor,
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecuteResponse {
    pub success: bool,
    pub results: DispatchSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// POST /api/v1/campaigns/execute: run a campaign for its targets.
///
/// Per-target failures are reported in `results.details`; the request as a
/// whole still succeeds.
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/execute",
    tag = "Campaigns",
    request_body = DispatchRequest,
    responses(
        (status = 200, description = "Campaign dispatched", body = ExecuteResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
        (status = 500, description = "Dispatch failed", body = ErrorResponse),
    )
)]
pub async fn execute_campaign(
    State(state): State<AppState>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = body?;
    let campaign_id = request.campaign_id.clone();
    let results = state.dispatcher.dispatch(request).await?;
    info!(
        campaign_id = %campaign_id,
        total = results.total_leads,
        failed = results.failed_executions,
        "Execute request served"
    );
    Ok(Json(ExecuteResponse {
        success: true,
        results,
    }))
}

/// POST /api/v1/webhooks/calls: telephony vendor call events.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/calls",
    tag = "Telephony",
    request_body = CallWebhookPayload,
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
        (status = 401, description = "Webhook token mismatch", body = ErrorResponse),
        (status = 500, description = "Event could not be stored", body = ErrorResponse),
    )
)]
pub async fn handle_call_webhook(
    State(state): State<AppState>,
    body: Result<Json<CallWebhookPayload>, JsonRejection>,
) -> Result<Json<WebhookAck>, ApiError> {
    let Json(payload) = body?;
    match state.ingestor.ingest(payload)? {
        IngestOutcome::Recorded(_) => {}
        IngestOutcome::Ignored { event, reason } => {
            warn!(event = %event, reason, "Call webhook ignored");
        }
    }
    Ok(Json(WebhookAck { success: true }))
}

/// GET /health: health check.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: readiness probe. Ready once the store answers.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Ready"),
        (status = 503, description = "Store unavailable"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store.list_campaigns() {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live: liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
