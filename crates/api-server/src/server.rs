//! API server: HTTP routes plus the Prometheus exporter.

use std::net::SocketAddr;

use axum::routing::{get, post, put};
use axum::Router;
use crm_core::config::AppConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::management;
use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;

/// Builds the full application router over `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Campaign dispatch
        .route("/api/v1/campaigns/execute", post(rest::execute_campaign))
        // Telephony
        .route("/api/v1/webhooks/calls", post(rest::handle_call_webhook))
        .route("/api/v1/calls/:external_id", get(management::get_call))
        // Campaign management
        .route(
            "/api/v1/campaigns",
            get(management::list_campaigns).post(management::create_campaign),
        )
        .route("/api/v1/campaigns/:id", get(management::get_campaign))
        .route("/api/v1/campaigns/:id/steps", put(management::replace_steps))
        .route("/api/v1/campaigns/:id/pause", post(management::pause_campaign))
        .route("/api/v1/campaigns/:id/executions", get(management::list_executions))
        .route("/api/v1/campaigns/:id/stats", get(management::campaign_stats))
        // Leads
        .route("/api/v1/leads", post(management::create_lead))
        .route("/api/v1/leads/:id", get(management::get_lead))
        .route("/api/v1/leads/:id/communications", get(management::lead_communications))
        .route("/api/v1/leads/:id/tasks", get(management::lead_tasks))
        // Scheduler
        .route("/api/v1/workflows/tick", post(management::run_scheduler_tick))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = build_router(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }

        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
