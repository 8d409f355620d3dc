use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::IpLookupConfig;
use crate::lead::{Enrichment, UtmParams};

/// Pull `utm_source`, `utm_medium` and `utm_campaign` out of a page URL.
/// Unparseable URLs and blank values yield `None`.
pub fn parse_utm(page_url: &str) -> UtmParams {
    let mut utm = UtmParams::default();
    let parsed = match Url::parse(page_url) {
        Ok(url) => url,
        Err(_) => return utm,
    };

    for (key, value) in parsed.query_pairs() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = match &*key {
            "utm_source" => &mut utm.source,
            "utm_medium" => &mut utm.medium,
            "utm_campaign" => &mut utm.campaign,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    utm
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Best-effort lookup of the public address this process egresses from.
pub struct IpLookup {
    client: Client,
    url: String,
}

impl IpLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &IpLookupConfig) -> Result<Option<Self>, reqwest::Error> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
        .map(Some)
    }

    /// Never fails: timeouts, blocked egress and odd bodies all come back as `None`.
    pub async fn lookup(&self) -> Option<String> {
        match self.try_lookup().await {
            Ok(ip) => ip,
            Err(e) => {
                log::debug!("Client IP lookup failed: {e}");
                None
            }
        }
    }

    async fn try_lookup(&self) -> Result<Option<String>, reqwest::Error> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let body = response.text().await?;

        let ip = match serde_json::from_str::<IpResponse>(&body) {
            Ok(parsed) => parsed.ip,
            Err(_) => body.trim().to_string(),
        };

        if ip.is_empty() || ip.parse::<std::net::IpAddr>().is_err() {
            log::debug!("Ignoring unexpected IP lookup body: {body:?}");
            return Ok(None);
        }
        Ok(Some(ip))
    }
}

/// Resolve UTM tags and the client address concurrently.
pub async fn enrich(page_url: &str, ip_lookup: Option<&IpLookup>) -> Enrichment {
    let (utm, ip_address) = tokio::join!(async { parse_utm(page_url) }, async {
        match ip_lookup {
            Some(lookup) => lookup.lookup().await,
            None => None,
        }
    });

    Enrichment { utm, ip_address }
}
