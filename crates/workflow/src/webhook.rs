//! Outbound webhook delivery for `webhook` steps.

use std::time::Duration;

use tracing::{debug, warn};

use crm_core::error::{CrmError, CrmResult};

/// Posts JSON payloads to customer-configured endpoints.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> CrmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("admissions-crm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CrmError::Config(format!("webhook client: {}", e)))?;
        Ok(Self { client })
    }

    /// Delivers `payload` to `url`. Any non-2xx response is an error.
    pub async fn deliver(&self, url: &str, payload: &serde_json::Value) -> CrmResult<u16> {
        let target = validate_url(url)?;

        debug!(url = %target, "Delivering webhook");
        let response = self
            .client
            .post(target)
            .json(payload)
            .send()
            .await
            .map_err(|e| CrmError::Webhook(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        metrics::counter!("workflow.webhooks", "status" => status.as_u16().to_string())
            .increment(1);

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            warn!(url = %url, status = status.as_u16(), "Webhook endpoint rejected delivery");
            Err(CrmError::Webhook(format!(
                "{} responded with status {}",
                url,
                status.as_u16()
            )))
        }
    }
}

/// Parses a webhook URL, accepting only http and https.
pub fn validate_url(raw: &str) -> CrmResult<url::Url> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| CrmError::Validation(format!("invalid webhook url {:?}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(CrmError::Validation(format!(
            "webhook url must use http or https, got {}",
            other
        ))),
    }
}
