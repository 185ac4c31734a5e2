//! Price command implementation.

use crate::browser::{BrowserSettings, ChromeLauncher, SessionManager};
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorSettings};
use crate::format::Formatter;
use crate::legality::ScryfallClient;
use crate::scrape::{PipelineSettings, RateLimitGuard, ScrapePipeline};
use crate::tcgplayer::Site;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Looks up prices for one or more cards through a shared browser.
pub struct PriceCommand {
    config: Config,
}

impl PriceCommand {
    /// Creates a new price command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Wires up the browser, the scrape pipeline and the coordinator, then
    /// resolves every card and returns formatted output.
    pub async fn execute(&self, cards: &[String]) -> Result<String> {
        let launcher = Arc::new(ChromeLauncher::new(BrowserSettings::from_config(&self.config)));
        let sessions = Arc::new(SessionManager::new(launcher, self.config.session_idle()));
        let reaper = sessions.spawn_reaper(self.config.reap_interval());

        let site = Site::new(self.config.base_url.clone(), self.config.product_line.clone());
        let pipeline = ScrapePipeline::new(
            sessions.clone(),
            RateLimitGuard::from_config(&self.config),
            site,
            PipelineSettings::from_config(&self.config),
        );
        let legality =
            ScryfallClient::from_config(&self.config).context("Failed to create legality client")?;

        let coordinator = Arc::new(Coordinator::new(
            Arc::new(pipeline),
            Arc::new(legality),
            CoordinatorSettings::from_config(&self.config),
        ));
        let sweeper = coordinator.spawn_sweeper(self.config.sweep_interval());

        let output = self.execute_with(&coordinator, cards).await;

        sweeper.abort();
        reaper.abort();
        sessions.shutdown().await;
        debug!("Browser launched {} time(s)", sessions.launch_count());

        output
    }

    /// Resolves the cards through a provided coordinator (for testing).
    pub async fn execute_with(&self, coordinator: &Coordinator, cards: &[String]) -> Result<String> {
        if cards.is_empty() {
            anyhow::bail!("No card names given");
        }

        info!("Pricing {} card(s)", cards.len());
        let outcomes =
            futures::future::join_all(cards.iter().map(|card| coordinator.resolve(card))).await;

        for failure in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            warn!("{}", failure);
        }

        let formatter = Formatter::new(self.config.format);
        Ok(match outcomes.as_slice() {
            [single] => formatter.format_outcome(single),
            _ => formatter.format_outcomes(&outcomes),
        })
    }
}
