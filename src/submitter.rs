//! Lead submission pipeline.
//!
//! A submission goes through validation, the rate-limit gate and enrichment,
//! then walks the configured delivery strategies in priority order. Only a
//! network-level failure moves on to the next strategy; a rejection from a
//! server that did answer is final.

use anyhow::anyhow;
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::config::{Config, DeliveryMode, LeadDefaults};
use crate::delivery::{BackendStrategy, DeliveryError, DeliveryStrategy, RelayStrategy};
use crate::enrichment::{enrich, IpLookup};
use crate::lead::{LeadSubmission, LeadTemplate, NormalizedLead, PageContext};
use crate::normalization::{is_valid_email, is_valid_phone, normalize_email};
use crate::rate_limiter::RateLimiter;

const MSG_SUCCESS: &str = "Obrigado! Recebemos seus dados e entraremos em contato em breve.";
const MSG_FALLBACK_WARNING: &str =
    "Seus dados foram enviados por e-mail e podem não aparecer imediatamente em nosso sistema.";
const MSG_INVALID_EMAIL: &str = "Por favor, informe um e-mail válido.";
const MSG_INVALID_PHONE: &str = "Por favor, informe um telefone válido com DDD.";
const MSG_ALREADY_REGISTERED: &str =
    "Este e-mail já está cadastrado. Nossa equipe entrará em contato em breve.";
const MSG_DELIVERY_FAILED: &str = "Não foi possível enviar seus dados no momento.";
const MSG_INTERNAL: &str = "Ocorreu um erro inesperado ao enviar seus dados.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// First strategy in the list accepted the lead
    Primary,
    /// A later strategy accepted it after the earlier ones were unreachable
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    RateLimited,
    /// The destination answered and refused the lead
    Application,
    /// Every strategy was tried and none delivered
    Delivery,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryResult {
    Success {
        method: DeliveryMethod,
        channel: String,
        message: String,
        warning: Option<String>,
        record: Option<Value>,
    },
    Failure {
        kind: FailureKind,
        message: String,
        technical: Option<String>,
        action: Option<String>,
    },
}

impl DeliveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryResult::Success { .. })
    }

    /// Text meant for the visitor.
    pub fn message(&self) -> &str {
        match self {
            DeliveryResult::Success { message, .. } => message,
            DeliveryResult::Failure { message, .. } => message,
        }
    }

    pub fn method(&self) -> Option<DeliveryMethod> {
        match self {
            DeliveryResult::Success { method, .. } => Some(*method),
            DeliveryResult::Failure { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            DeliveryResult::Success { warning, .. } => warning.as_deref(),
            DeliveryResult::Failure { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            DeliveryResult::Success { .. } => None,
            DeliveryResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            DeliveryResult::Success { .. } => None,
            DeliveryResult::Failure { action, .. } => action.as_deref(),
        }
    }

    pub fn technical(&self) -> Option<&str> {
        match self {
            DeliveryResult::Success { .. } => None,
            DeliveryResult::Failure { technical, .. } => technical.as_deref(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        DeliveryResult::Failure {
            kind: FailureKind::Validation,
            message: message.into(),
            technical: None,
            action: None,
        }
    }
}

pub struct LeadSubmitter {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
    rate_limiter: RateLimiter,
    ip_lookup: Option<IpLookup>,
    template: LeadTemplate,
    contact_action: String,
}

impl LeadSubmitter {
    /// Strategies are tried in the order given.
    pub fn new(
        strategies: Vec<Box<dyn DeliveryStrategy>>,
        rate_limiter: RateLimiter,
        defaults: &LeadDefaults,
    ) -> Self {
        Self {
            strategies,
            rate_limiter,
            ip_lookup: None,
            template: LeadTemplate {
                default_subject: defaults.default_subject.clone(),
                status: defaults.status.clone(),
                priority: defaults.priority.clone(),
            },
            contact_action: defaults.contact_action.clone(),
        }
    }

    pub fn with_ip_lookup(mut self, ip_lookup: IpLookup) -> Self {
        self.ip_lookup = Some(ip_lookup);
        self
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut strategies: Vec<Box<dyn DeliveryStrategy>> = Vec::new();
        if config.mode == DeliveryMode::Full {
            strategies.push(Box::new(BackendStrategy::new(&config.backend)?));
        }
        strategies.push(Box::new(RelayStrategy::new(&config.relay)?));

        let rate_limiter = RateLimiter::new(
            config.rate_limit.max_attempts,
            Duration::from_secs(config.rate_limit.window_seconds),
        );

        let mut submitter = Self::new(strategies, rate_limiter, &config.lead);
        if let Some(lookup) = IpLookup::from_config(&config.ip_lookup)? {
            submitter = submitter.with_ip_lookup(lookup);
        }

        log::info!(
            "Lead submitter ready: mode={:?}, strategies=[{}]",
            config.mode,
            submitter.channels().join(", ")
        );
        Ok(submitter)
    }

    pub fn channels(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.channel()).collect()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Run one submission to completion. Every outcome, including internal
    /// errors and panics inside a strategy, comes back as a [`DeliveryResult`].
    pub async fn submit_lead(
        &self,
        submission: &LeadSubmission,
        page: &PageContext,
    ) -> DeliveryResult {
        match AssertUnwindSafe(self.run(submission, page)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("Lead submission aborted: {e:#}");
                self.internal_failure(format!("{e:#}"))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                log::error!("Lead submission panicked: {reason}");
                self.internal_failure(format!("panic: {reason}"))
            }
        }
    }

    fn internal_failure(&self, technical: String) -> DeliveryResult {
        DeliveryResult::Failure {
            kind: FailureKind::Internal,
            message: MSG_INTERNAL.to_string(),
            technical: Some(technical),
            action: Some(self.contact_action.clone()),
        }
    }

    async fn run(
        &self,
        submission: &LeadSubmission,
        page: &PageContext,
    ) -> anyhow::Result<DeliveryResult> {
        if let Some(failure) = validate(submission) {
            log::info!("Lead rejected by validation: {}", failure.message());
            return Ok(failure);
        }

        let email = normalize_email(submission.email.as_deref().unwrap_or_default());
        if !self.rate_limiter.check_rate_limit(&email) {
            log::warn!("Rate limit exceeded for {email}");
            return Ok(DeliveryResult::Failure {
                kind: FailureKind::RateLimited,
                message: format!(
                    "Muitas tentativas. Aguarde {} antes de tentar novamente.",
                    describe_wait(self.rate_limiter.window())
                ),
                technical: None,
                action: None,
            });
        }

        if self.strategies.is_empty() {
            return Err(anyhow!("no delivery strategies configured"));
        }

        let enrichment = enrich(&page.url, self.ip_lookup.as_ref()).await;
        let lead = NormalizedLead::build(submission, page, enrichment, &self.template, Utc::now());

        Ok(self.deliver(&lead).await)
    }

    async fn deliver(&self, lead: &NormalizedLead) -> DeliveryResult {
        let mut errors: Vec<(&'static str, DeliveryError)> = Vec::new();

        for (position, strategy) in self.strategies.iter().enumerate() {
            let channel = strategy.channel();
            log::debug!("Attempting delivery via {channel}");

            match strategy.deliver(lead).await {
                Ok(record) => {
                    let (method, warning) = if position == 0 {
                        (DeliveryMethod::Primary, None)
                    } else {
                        log::warn!(
                            "Lead for {} delivered through fallback channel {channel}",
                            lead.email
                        );
                        (DeliveryMethod::Fallback, Some(MSG_FALLBACK_WARNING.to_string()))
                    };
                    log::info!("Lead for {} delivered via {channel}", lead.email);
                    return DeliveryResult::Success {
                        method,
                        channel: channel.to_string(),
                        message: MSG_SUCCESS.to_string(),
                        warning,
                        record,
                    };
                }
                Err(err) if position == 0 && !err.is_network() => {
                    log::warn!("Lead for {} rejected by {channel}: {err}", lead.email);
                    return self.application_failure(err);
                }
                Err(err) => {
                    log::warn!("Delivery via {channel} failed: {err}");
                    let retryable = err.is_network();
                    errors.push((channel, err));
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let technical = errors
            .iter()
            .map(|(channel, err)| format!("{channel}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        log::error!("Lead for {} could not be delivered: {technical}", lead.email);

        DeliveryResult::Failure {
            kind: FailureKind::Delivery,
            message: MSG_DELIVERY_FAILED.to_string(),
            technical: Some(technical),
            action: Some(self.contact_action.clone()),
        }
    }

    fn application_failure(&self, err: DeliveryError) -> DeliveryResult {
        let detail = err.detail().to_lowercase();
        let message = if detail.contains("duplicate") || detail.contains("unique") {
            MSG_ALREADY_REGISTERED.to_string()
        } else {
            format!("Não foi possível enviar seus dados: {}", err.detail())
        };

        DeliveryResult::Failure {
            kind: FailureKind::Application,
            message,
            technical: Some(err.to_string()),
            action: Some(self.contact_action.clone()),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

/// Presence then format checks. `None` means the submission may proceed.
fn validate(submission: &LeadSubmission) -> Option<DeliveryResult> {
    let required = [
        ("nome", &submission.name),
        ("e-mail", &submission.email),
        ("telefone", &submission.phone),
        ("operadora", &submission.operator),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| is_blank(value))
        .map(|(label, _)| *label)
        .collect();
    if !missing.is_empty() {
        return Some(DeliveryResult::validation(format!(
            "Por favor, preencha os campos obrigatórios: {}.",
            missing.join(", ")
        )));
    }

    let email = submission.email.as_deref().unwrap_or_default().trim();
    if !is_valid_email(email) {
        return Some(DeliveryResult::validation(MSG_INVALID_EMAIL));
    }

    let phone = submission.phone.as_deref().unwrap_or_default();
    if !is_valid_phone(phone) {
        return Some(DeliveryResult::validation(MSG_INVALID_PHONE));
    }

    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn describe_wait(window: Duration) -> String {
    let secs = window.as_secs();
    match secs {
        60 => "1 minuto".to_string(),
        s if s >= 60 && s % 60 == 0 => format!("{} minutos", s / 60),
        1 => "1 segundo".to_string(),
        s => format!("{s} segundos"),
    }
}
