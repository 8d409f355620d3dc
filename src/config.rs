use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use url::Url;

pub const API_KEY_ENV: &str = "LEAD_FUNNEL_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: DeliveryMode,
    pub backend: BackendConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub ip_lookup: IpLookupConfig,
    #[serde(default)]
    pub lead: LeadDefaults,
}

/// Which delivery strategies a deployment uses, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Backend write first, email relay when the backend is unreachable
    #[default]
    Full,
    /// Email relay only, for hosts whose egress policy blocks the backend
    RelayOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub table: String,
    #[serde(default)]
    pub api_key: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub endpoint: String,
    pub recipient: String,
    pub cc: Option<String>,
    pub redirect_url: Option<String>,
    // Email layout selector understood by the relay, e.g. "table"
    pub template: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_attempts: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpLookupConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDefaults {
    pub default_subject: String,
    pub status: String,
    pub priority: String,
    /// Remediation shown to the visitor whenever delivery could not be completed
    pub contact_action: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window_seconds: 60,
        }
    }
}

impl Default for IpLookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://api.ipify.org?format=json".to_string(),
            timeout_seconds: 3,
        }
    }
}

impl Default for LeadDefaults {
    fn default() -> Self {
        Self {
            default_subject: "Lead do site".to_string(),
            status: "novo".to_string(),
            priority: "media".to_string(),
            contact_action: "Entre em contato diretamente pelo WhatsApp ou telefone.".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: DeliveryMode::Full,
            backend: BackendConfig {
                base_url: "https://your-project.supabase.co".to_string(),
                table: "leads".to_string(),
                api_key: String::new(),
                timeout_seconds: Some(30),
            },
            relay: RelayConfig {
                endpoint: "https://formsubmit.co".to_string(),
                recipient: "contato@example.com".to_string(),
                cc: Some("comercial@example.com".to_string()),
                redirect_url: Some("https://www.example.com/obrigado".to_string()),
                template: Some("table".to_string()),
                timeout_seconds: Some(30),
            },
            rate_limit: RateLimitConfig::default(),
            ip_lookup: IpLookupConfig::default(),
            lead: LeadDefaults::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Pick up the API key from the environment so it never has to live in the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                log::debug!("Using backend API key from {API_KEY_ENV}");
                self.backend.api_key = key.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode == DeliveryMode::Full {
            Url::parse(&self.backend.base_url)
                .with_context(|| format!("Invalid backend.base_url: {}", self.backend.base_url))?;
            if self.backend.table.trim().is_empty() {
                return Err(anyhow!("backend.table must not be empty"));
            }
            if self.backend.api_key.trim().is_empty() {
                return Err(anyhow!(
                    "backend.api_key is empty (set it in the file or via {API_KEY_ENV})"
                ));
            }
        }

        Url::parse(&self.relay.endpoint)
            .with_context(|| format!("Invalid relay.endpoint: {}", self.relay.endpoint))?;
        if !crate::normalization::is_valid_email(&self.relay.recipient) {
            return Err(anyhow!("relay.recipient is not an email address"));
        }
        // The relay drops the copy and the thank-you redirect when these are absent
        match self.relay.cc.as_deref().map(str::trim) {
            Some(cc) if crate::normalization::is_valid_email(cc) => {}
            Some(cc) if !cc.is_empty() => {
                return Err(anyhow!("relay.cc is not an email address: {cc}"));
            }
            _ => return Err(anyhow!("relay.cc must be set")),
        }
        match self.relay.redirect_url.as_deref().map(str::trim) {
            Some(redirect) if !redirect.is_empty() => {
                Url::parse(redirect)
                    .with_context(|| format!("Invalid relay.redirect_url: {redirect}"))?;
            }
            _ => return Err(anyhow!("relay.redirect_url must be set")),
        }

        if self.rate_limit.max_attempts == 0 {
            return Err(anyhow!("rate_limit.max_attempts must be at least 1"));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(anyhow!("rate_limit.window_seconds must be at least 1"));
        }

        if self.ip_lookup.enabled {
            Url::parse(&self.ip_lookup.url)
                .with_context(|| format!("Invalid ip_lookup.url: {}", self.ip_lookup.url))?;
        }

        Ok(())
    }
}
