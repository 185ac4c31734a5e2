//! Legality command implementation.

use crate::config::Config;
use crate::format::Formatter;
use crate::legality::{LegalityLookup, ScryfallClient};
use anyhow::{Context, Result};
use tracing::info;

/// Prints whether a card is legal in any format, without touching the store.
pub struct LegalityCommand {
    config: Config,
}

impl LegalityCommand {
    /// Creates a new legality command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Looks up the card and returns formatted output.
    pub async fn execute(&self, card_name: &str) -> Result<String> {
        let client =
            ScryfallClient::from_config(&self.config).context("Failed to create legality client")?;

        self.execute_with(&client, card_name).await
    }

    /// Looks up the card with a provided collaborator (for testing).
    pub async fn execute_with(&self, lookup: &dyn LegalityLookup, card_name: &str) -> Result<String> {
        let card_name = card_name.trim();
        if card_name.is_empty() {
            anyhow::bail!("Card name is empty");
        }

        info!("Checking legality of: {}", card_name);
        let legality = lookup.lookup(card_name).await;

        Ok(Formatter::new(self.config.format).format_legality(card_name, legality))
    }
}
