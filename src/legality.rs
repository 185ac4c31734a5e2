//! Format legality from the public card database.

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use wreq::Client;

/// Whether a card may be played in at least one format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Legality {
    Legal,
    NotLegal,
    #[default]
    Unknown,
}

impl std::fmt::Display for Legality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Legality::Legal => write!(f, "legal"),
            Legality::NotLegal => write!(f, "not legal"),
            Legality::Unknown => write!(f, "unknown"),
        }
    }
}

/// Looks up legality by exact card name. Never fails: problems yield `Unknown`.
#[async_trait]
pub trait LegalityLookup: Send + Sync {
    async fn lookup(&self, card_name: &str) -> Legality;
}

#[derive(Debug, Deserialize)]
struct CardResponse {
    #[serde(default)]
    legalities: HashMap<String, String>,
}

/// Collapses per-format statuses into one verdict.
///
/// "legal" and "restricted" both allow play; no formats at all is unknown.
pub fn classify(legalities: &HashMap<String, String>) -> Legality {
    if legalities.is_empty() {
        return Legality::Unknown;
    }
    if legalities.values().any(|status| matches!(status.as_str(), "legal" | "restricted")) {
        Legality::Legal
    } else {
        Legality::NotLegal
    }
}

/// HTTP client for the Scryfall API.
pub struct ScryfallClient {
    client: Client,
    base_url: String,
}

impl ScryfallClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.legality_api_url.clone())
    }

    /// Fetches the per-format statuses of a card.
    pub async fn legalities(&self, card_name: &str) -> Result<HashMap<String, String>> {
        let url =
            format!("{}/cards/named?exact={}", self.base_url, urlencoding::encode(card_name.trim()));
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("tcg-pricer/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Request failed with status: {}", status);
        }

        let body = response.text().await.context("Failed to read response body")?;
        let card: CardResponse =
            serde_json::from_str(&body).context("Failed to parse card response")?;
        Ok(card.legalities)
    }
}

#[async_trait]
impl LegalityLookup for ScryfallClient {
    async fn lookup(&self, card_name: &str) -> Legality {
        match self.legalities(card_name).await {
            Ok(legalities) => classify(&legalities),
            Err(e) => {
                warn!("Legality lookup for '{}' failed: {:#}", card_name, e);
                Legality::Unknown
            }
        }
    }
}
