use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ADMISSIONS_CRM__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub telephony: TelephonyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// ─── Workflow Config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Upper bound on per-target units running at once during a dispatch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Budget for one target's unit of work (execution creation plus steps).
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_scheduler_enabled")]
    pub scheduler_enabled: bool,
    #[serde(default = "default_scheduler_interval_secs")]
    pub scheduler_interval_secs: u64,
    /// Maximum due executions resumed per scheduler tick.
    #[serde(default = "default_scheduler_batch_size")]
    pub scheduler_batch_size: usize,
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

fn default_max_concurrency() -> usize {
    16
}
fn default_step_timeout_ms() -> u64 {
    30_000
}
fn default_scheduler_enabled() -> bool {
    true
}
fn default_scheduler_interval_secs() -> u64 {
    60
}
fn default_scheduler_batch_size() -> usize {
    500
}
fn default_webhook_timeout_ms() -> u64 {
    10_000
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            step_timeout_ms: default_step_timeout_ms(),
            scheduler_enabled: default_scheduler_enabled(),
            scheduler_interval_secs: default_scheduler_interval_secs(),
            scheduler_batch_size: default_scheduler_batch_size(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

// ─── Telephony Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelephonyConfig {
    /// Shared token the telephony vendor sends with every webhook. When
    /// unset, tokens are not checked.
    #[serde(default)]
    pub webhook_token: Option<String>,
}

// Default functions
fn default_node_id() -> String {
    "crm-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            workflow: WorkflowConfig::default(),
            telephony: TelephonyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ADMISSIONS_CRM")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.workflow.max_concurrency, 16);
        assert!(config.workflow.scheduler_enabled);
        assert!(config.telephony.webhook_token.is_none());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "workflow": { "max_concurrency": 4 },
            "telephony": { "webhook_token": "secret" }
        }))
        .unwrap();
        assert_eq!(config.workflow.max_concurrency, 4);
        assert_eq!(config.workflow.step_timeout_ms, 30_000);
        assert_eq!(config.telephony.webhook_token.as_deref(), Some("secret"));
        assert_eq!(config.node_id, "crm-01");
    }
}
