//! Admissions CRM: campaign workflow dispatcher and telephony webhook
//! ingestion.
//!
//! Main entry point that wires the store, workflow engine, scheduler, and
//! HTTP server.

mod demo;

use std::sync::Arc;

use clap::Parser;
use crm_api::{ApiServer, AppState};
use crm_core::config::AppConfig;
use crm_core::event_bus::tracing_sink;
use crm_core::store::{CrmStore, InMemoryStore};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "admissions-crm")]
#[command(about = "Campaign workflows and call tracking for admissions teams")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ADMISSIONS_CRM__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ADMISSIONS_CRM__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "ADMISSIONS_CRM__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Do not run the continuation scheduler in the background
    #[arg(long, default_value_t = false)]
    no_scheduler: bool,

    /// Seed demo leads and a draft campaign on startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

const DEFAULT_LOG_FILTER: &str =
    "admissions_crm=info,crm_workflow=info,crm_telephony=info,crm_api=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Admissions CRM starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if cli.no_scheduler {
        config.workflow.scheduler_enabled = false;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        max_concurrency = config.workflow.max_concurrency,
        scheduler = config.workflow.scheduler_enabled,
        "Configuration loaded"
    );

    let store: Arc<dyn CrmStore> = Arc::new(InMemoryStore::new());
    let state = AppState::new(&config, store, tracing_sink())?;

    if cli.seed_demo {
        let campaign_id = demo::seed(&state.engine)?;
        info!(campaign_id = %campaign_id, "Demo campaign ready");
    }

    let api_server = ApiServer::new(config.clone(), state.clone());

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    if config.workflow.scheduler_enabled {
        state.scheduler.clone().spawn();
    } else {
        info!("Continuation scheduler disabled");
    }

    info!("Admissions CRM is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
