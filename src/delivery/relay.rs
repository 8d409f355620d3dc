use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{extract_error_message, DeliveryError, DeliveryStrategy};
use crate::config::RelayConfig;
use crate::lead::NormalizedLead;

// Fields that only make sense as database columns
const RECORD_ONLY_FIELDS: &[&str] = &["status", "priority"];

/// Posts the lead to a form-to-email relay that mails it to a fixed inbox.
///
/// Nothing comes back that could be queried later; the lead reaches a person
/// and has to be entered into the system of record by hand.
pub struct RelayStrategy {
    client: Client,
    endpoint: String,
    cc: Option<String>,
    redirect_url: Option<String>,
    template: Option<String>,
}

impl RelayStrategy {
    pub fn new(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lead-funnel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}",
                config.endpoint.trim_end_matches('/'),
                config.recipient.trim()
            ),
            cc: config.cc.clone().filter(|cc| !cc.trim().is_empty()),
            redirect_url: config.redirect_url.clone(),
            template: config.template.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn subject_line(lead: &NormalizedLead) -> String {
        format!("Novo Lead: {} - {}", lead.operator, lead.name)
    }

    /// Lead fields plus the relay's underscore-prefixed control fields.
    pub fn form_fields(&self, lead: &NormalizedLead) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = lead
            .to_payload()
            .into_iter()
            .filter(|(key, _)| !RECORD_ONLY_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect();

        fields.push(("_subject".to_string(), Self::subject_line(lead)));
        fields.push(("_captcha".to_string(), "false".to_string()));
        if let Some(cc) = &self.cc {
            fields.push(("_cc".to_string(), cc.clone()));
        }
        if let Some(template) = &self.template {
            fields.push(("_template".to_string(), template.clone()));
        }
        if let Some(next) = &self.redirect_url {
            fields.push(("_next".to_string(), next.clone()));
        }

        fields
    }
}

#[async_trait]
impl DeliveryStrategy for RelayStrategy {
    fn channel(&self) -> &'static str {
        "relay"
    }

    async fn deliver(&self, lead: &NormalizedLead) -> Result<Option<Value>, DeliveryError> {
        let form = self
            .form_fields(lead)
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value));

        log::debug!("POST {} (multipart relay)", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("relay rejected the submission")
                    .to_string()
            });
            return Err(DeliveryError::Application {
                status: status.as_u16(),
                message,
            });
        }

        log::debug!("Relay accepted lead with HTTP {}", status.as_u16());
        Ok(None)
    }
}
