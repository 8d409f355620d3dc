use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalization::{normalize_email, normalize_name, normalize_operator, normalize_phone};

/// Raw lead fields exactly as the form produced them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub operator: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

/// Where the submission came from.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    pub user_agent: Option<String>,
}

impl PageContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
}

/// Values attached to a lead on top of what the visitor typed.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub utm: UtmParams,
    pub ip_address: Option<String>,
}

/// Fixed values the primary record carries.
#[derive(Debug, Clone)]
pub struct LeadTemplate {
    pub default_subject: String,
    pub status: String,
    pub priority: String,
}

/// Canonical lead record. Only built from a submission that passed validation.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedLead {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub operator: String,
    pub subject: String,
    pub message: String,
    pub source_page: String,
    pub user_agent: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub ip_address: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_at: DateTime<Utc>,
}

impl NormalizedLead {
    pub(crate) fn build(
        submission: &LeadSubmission,
        page: &PageContext,
        enrichment: Enrichment,
        template: &LeadTemplate,
        now: DateTime<Utc>,
    ) -> Self {
        let field = |value: &Option<String>| value.as_deref().unwrap_or_default().to_string();

        let subject = submission
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(template.default_subject.as_str())
            .to_string();

        Self {
            name: normalize_name(&field(&submission.name)),
            email: normalize_email(&field(&submission.email)),
            phone: normalize_phone(&field(&submission.phone)),
            operator: normalize_operator(field(&submission.operator).trim()),
            subject,
            message: field(&submission.message).trim().to_string(),
            source_page: page.url.clone(),
            user_agent: page.user_agent.clone(),
            utm_source: enrichment.utm.source,
            utm_medium: enrichment.utm.medium,
            utm_campaign: enrichment.utm.campaign,
            ip_address: enrichment.ip_address,
            status: template.status.clone(),
            priority: template.priority.clone(),
            created_at: now,
        }
    }

    /// JSON body for transmission, with null and empty-string fields removed.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        payload.retain(|_, value| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        });
        payload
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> LeadTemplate {
        LeadTemplate {
            default_subject: "Lead do site".to_string(),
            status: "novo".to_string(),
            priority: "media".to_string(),
        }
    }

    fn submission() -> LeadSubmission {
        LeadSubmission {
            name: Some("  Ana Silva ".to_string()),
            email: Some(" Ana@Test.com".to_string()),
            phone: Some("11999999999 ".to_string()),
            operator: Some("SulAmérica".to_string()),
            subject: None,
            message: Some(String::new()),
        }
    }

    #[test]
    fn test_build_normalizes_fields() {
        let page = PageContext::new("https://site.example/planos");
        let lead = NormalizedLead::build(
            &submission(),
            &page,
            Enrichment::default(),
            &template(),
            Utc::now(),
        );

        assert_eq!(lead.name, "Ana Silva");
        assert_eq!(lead.email, "ana@test.com");
        assert_eq!(lead.phone, "11999999999");
        assert_eq!(lead.operator, "sulamerica");
        assert_eq!(lead.subject, "Lead do site");
        assert_eq!(lead.status, "novo");
    }

    #[test]
    fn test_payload_prunes_empty_fields() {
        let page = PageContext::new("https://site.example/");
        let lead = NormalizedLead::build(
            &submission(),
            &page,
            Enrichment::default(),
            &template(),
            Utc::now(),
        );
        let payload = lead.to_payload();

        for key in [
            "message",
            "utm_source",
            "utm_medium",
            "utm_campaign",
            "ip_address",
            "user_agent",
        ] {
            assert!(!payload.contains_key(key), "{key} should have been pruned");
        }
        assert_eq!(payload["operator"], "sulamerica");
        assert_eq!(payload["priority"], "media");
        assert!(payload.contains_key("created_at"));
    }

    #[test]
    fn test_payload_keeps_enrichment() {
        let page = PageContext::new("https://site.example/").with_user_agent("Mozilla/5.0");
        let enrichment = Enrichment {
            utm: UtmParams {
                source: Some("google".to_string()),
                medium: Some("cpc".to_string()),
                campaign: None,
            },
            ip_address: Some("203.0.113.7".to_string()),
        };
        let lead = NormalizedLead::build(&submission(), &page, enrichment, &template(), Utc::now());
        let payload = lead.to_payload();

        assert_eq!(payload["utm_source"], "google");
        assert_eq!(payload["utm_medium"], "cpc");
        assert!(!payload.contains_key("utm_campaign"));
        assert_eq!(payload["ip_address"], "203.0.113.7");
        assert_eq!(payload["user_agent"], "Mozilla/5.0");
    }

    #[test]
    fn test_blank_subject_falls_back_to_default() {
        let mut raw = submission();
        raw.subject = Some("   ".to_string());
        let lead = NormalizedLead::build(
            &raw,
            &PageContext::default(),
            Enrichment::default(),
            &template(),
            Utc::now(),
        );
        assert_eq!(lead.subject, "Lead do site");
    }
}
