//! Transports that hand a normalized lead to somewhere a human will see it.
//!
//! Each strategy classifies its own failures. `Network` means no HTTP response
//! was ever obtained, which is the only case where trying another transport
//! can help. `Application` means the server answered and said no.

pub mod backend;
pub mod relay;

use async_trait::async_trait;
use serde_json::Value;

use crate::lead::NormalizedLead;

pub use backend::BackendStrategy;
pub use relay::RelayStrategy;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("{message} (HTTP {status})")]
    Application { status: u16, message: String },
}

impl DeliveryError {
    pub fn is_network(&self) -> bool {
        matches!(self, DeliveryError::Network(_))
    }

    /// Server-supplied message without the status suffix.
    pub fn detail(&self) -> &str {
        match self {
            DeliveryError::Network(message) => message,
            DeliveryError::Application { message, .. } => message,
        }
    }
}

#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    /// Short identifier used in logs and results, e.g. `"backend"`.
    fn channel(&self) -> &'static str;

    /// Deliver the lead. On success returns whatever the destination echoed back.
    async fn deliver(&self, lead: &NormalizedLead) -> Result<Option<Value>, DeliveryError>;
}

/// Pull a human-readable message out of an error body. Structured bodies
/// commonly carry `message`, `error_description`, `error` or `hint`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error_description", "error", "hint", "details"] {
            if let Some(Value::String(text)) = map.get(key) {
                if !text.trim().is_empty() {
                    return Some(text.trim().to_string());
                }
            }
        }
    }

    let text = body.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.chars().take(500).collect())
    }
}
