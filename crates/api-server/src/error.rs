//! Maps `CrmError` onto HTTP responses of the form
//! `{ "success": false, "error": "..." }`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crm_core::error::CrmError;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Handler error wrapper so handlers can use `?` on `CrmResult`.
#[derive(Debug)]
pub struct ApiError(pub CrmError);

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        ApiError(err)
    }
}

/// Body extraction failures are caller errors.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(CrmError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CrmError::Validation(_) => StatusCode::BAD_REQUEST,
            CrmError::NotFound { .. } => StatusCode::NOT_FOUND,
            CrmError::InvalidTransition { .. } => StatusCode::CONFLICT,
            CrmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CrmError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
            metrics::counter!("api.errors").increment(1);
        } else {
            metrics::counter!("api.client_errors", "status" => status.as_u16().to_string())
                .increment(1);
        }
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
