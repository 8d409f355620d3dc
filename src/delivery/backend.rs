use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::{extract_error_message, DeliveryError, DeliveryStrategy};
use crate::config::BackendConfig;
use crate::lead::NormalizedLead;

/// Inserts the lead as a row through the backend's REST interface.
pub struct BackendStrategy {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl BackendStrategy {
    pub fn new(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lead-funnel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: Self::collection_url(&config.base_url, &config.table),
            api_key: config.api_key.clone(),
        })
    }

    /// `https://x.supabase.co/` + `leads` -> `https://x.supabase.co/rest/v1/leads`
    pub fn collection_url(base_url: &str, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            base_url.trim_end_matches('/'),
            table.trim_matches('/')
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
        let detail = extract_error_message(body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

        let message = match status {
            StatusCode::UNAUTHORIZED => format!("Invalid API credential: {detail}"),
            StatusCode::FORBIDDEN => format!("Rejected by access policy: {detail}"),
            _ => detail,
        };

        DeliveryError::Application {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl DeliveryStrategy for BackendStrategy {
    fn channel(&self) -> &'static str {
        "backend"
    }

    async fn deliver(&self, lead: &NormalizedLead) -> Result<Option<Value>, DeliveryError> {
        let payload = lead.to_payload();
        log::debug!("POST {} ({} fields)", self.endpoint, payload.len());

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        // The row is written once the status says so; an unreadable body only loses the echo
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let record = serde_json::from_str::<Value>(&body).ok();
        log::debug!("Backend accepted lead with HTTP {}", status.as_u16());
        Ok(record)
    }
}
