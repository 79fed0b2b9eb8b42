//! Campaign, lead, and call management handlers.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crm_core::campaign::{Campaign, CreateCampaignRequest, Execution, StepKind};
use crm_core::error::CrmError;
use crm_core::types::{Call, Communication, Lead, LeadStatus, Task};
use crm_workflow::types::{CampaignStats, TickReport};

use crate::error::{ApiError, ErrorResponse};
use crate::rest::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceStepsRequest {
    pub steps: Vec<StepKind>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeadRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub custom_fields: HashMap<String, serde_json::Value>,
}

// ─── Campaigns ─────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/v1/campaigns",
    tag = "Campaigns",
    responses((status = 200, description = "All campaigns, newest first", body = [Campaign]))
)]
pub async fn list_campaigns(State(state): State<AppState>) -> ApiResult<Vec<Campaign>> {
    Ok(Json(state.engine.list_campaigns()?))
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    tag = "Campaigns",
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "Draft campaign created", body = Campaign),
        (status = 400, description = "Invalid campaign", body = ErrorResponse),
    )
)]
pub async fn create_campaign(
    State(state): State<AppState>,
    body: Result<Json<CreateCampaignRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let Json(req) = body?;
    let campaign = state.engine.create_campaign(req)?;
    metrics::counter!("api.campaigns.created").increment(1);
    Ok((StatusCode::CREATED, Json(campaign)))
}

#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign", body = Campaign),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
    )
)]
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Campaign> {
    Ok(Json(state.engine.get_campaign(&id)?))
}

/// Steps can only be replaced while the campaign is a draft.
#[utoipa::path(
    put,
    path = "/api/v1/campaigns/{id}/steps",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    request_body = ReplaceStepsRequest,
    responses(
        (status = 200, description = "Steps replaced", body = Campaign),
        (status = 400, description = "Invalid steps or campaign not a draft", body = ErrorResponse),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
    )
)]
pub async fn replace_steps(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ReplaceStepsRequest>, JsonRejection>,
) -> ApiResult<Campaign> {
    let Json(req) = body?;
    Ok(Json(state.engine.replace_steps(&id, req.steps)?))
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/pause",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign paused", body = Campaign),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
        (status = 409, description = "Campaign is not active", body = ErrorResponse),
    )
)]
pub async fn pause_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Campaign> {
    Ok(Json(state.engine.pause_campaign(&id)?))
}

#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}/executions",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Executions, oldest first", body = [Execution]),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
    )
)]
pub async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Execution>> {
    state.engine.get_campaign(&id)?;
    Ok(Json(state.store.list_executions(&id)?))
}

#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}/stats",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Execution counts", body = CampaignStats),
        (status = 404, description = "Campaign not found", body = ErrorResponse),
    )
)]
pub async fn campaign_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CampaignStats> {
    Ok(Json(state.engine.campaign_stats(&id)?))
}

// ─── Leads ─────────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/v1/leads",
    tag = "Leads",
    request_body = CreateLeadRequest,
    responses(
        (status = 201, description = "Lead created", body = Lead),
        (status = 400, description = "Invalid lead", body = ErrorResponse),
    )
)]
pub async fn create_lead(
    State(state): State<AppState>,
    body: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    let Json(req) = body?;
    if req.owner_id.trim().is_empty() {
        return Err(CrmError::Validation("owner_id is required".into()).into());
    }
    let id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut lead = Lead::new(id, req.owner_id);
    lead.first_name = req.first_name;
    lead.last_name = req.last_name;
    lead.email = req.email;
    lead.phone = req.phone;
    lead.program = req.program;
    lead.custom_fields = req.custom_fields;
    if let Some(status) = req.status {
        lead.status = status;
    }
    lead.updated_at = Utc::now();

    let lead = state.store.insert_lead(lead)?;
    metrics::counter!("api.leads.created").increment(1);
    Ok((StatusCode::CREATED, Json(lead)))
}

#[utoipa::path(
    get,
    path = "/api/v1/leads/{id}",
    tag = "Leads",
    params(("id" = String, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Lead", body = Lead),
        (status = 404, description = "Lead not found", body = ErrorResponse),
    )
)]
pub async fn get_lead(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Lead> {
    state
        .store
        .get_lead(&id)?
        .map(Json)
        .ok_or_else(|| CrmError::not_found("Lead", id).into())
}

#[utoipa::path(
    get,
    path = "/api/v1/leads/{id}/communications",
    tag = "Leads",
    params(("id" = String, Path, description = "Lead id")),
    responses((status = 200, description = "Messages sent to the lead", body = [Communication]))
)]
pub async fn lead_communications(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Communication>> {
    Ok(Json(state.store.list_communications(&id)?))
}

#[utoipa::path(
    get,
    path = "/api/v1/leads/{id}/tasks",
    tag = "Leads",
    params(("id" = String, Path, description = "Lead id")),
    responses((status = 200, description = "Follow-up tasks, soonest first", body = [Task]))
)]
pub async fn lead_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Task>> {
    Ok(Json(state.store.list_tasks(&id)?))
}

// ─── Workflows & calls ─────────────────────────────────────────────────────

/// Runs one continuation pass immediately.
#[utoipa::path(
    post,
    path = "/api/v1/workflows/tick",
    tag = "Scheduler",
    responses(
        (status = 200, description = "Pass finished", body = TickReport),
        (status = 500, description = "Pass failed", body = ErrorResponse),
    )
)]
pub async fn run_scheduler_tick(State(state): State<AppState>) -> ApiResult<TickReport> {
    Ok(Json(state.scheduler.tick().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/calls/{external_id}",
    tag = "Telephony",
    params(("external_id" = String, Path, description = "Vendor call id")),
    responses(
        (status = 200, description = "Call record", body = Call),
        (status = 404, description = "Call not found", body = ErrorResponse),
    )
)]
pub async fn get_call(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<Call> {
    state
        .store
        .get_call(&external_id)?
        .map(Json)
        .ok_or_else(|| CrmError::not_found("Call", external_id).into())
}
