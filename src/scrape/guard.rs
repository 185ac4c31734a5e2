//! Rate-limit and block-page detection with bounded recovery.

use crate::browser::BrowserPage;
use crate::config::Config;
use crate::error::ScrapeError;
use crate::tcgplayer::parser::visible_text;
use crate::tcgplayer::selectors::errors;
use rand::RngExt;
use std::time::Duration;
use tracing::{debug, warn};

/// Detects error and rate-limit pages and backs off before reloading.
#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    blocked_url_pattern: String,
    fragments: Vec<String>,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl RateLimitGuard {
    pub fn new(
        blocked_url_pattern: impl Into<String>,
        fragments: impl IntoIterator<Item = String>,
        backoff_min: Duration,
        backoff_max: Duration,
    ) -> Self {
        Self {
            blocked_url_pattern: blocked_url_pattern.into(),
            fragments: fragments
                .into_iter()
                .map(|f| f.trim().to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
            backoff_min: backoff_min.min(backoff_max),
            backoff_max: backoff_max.max(backoff_min),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let (min, max) = config.backoff_range();
        Self::new(config.blocked_url_pattern.clone(), config.error_fragments.clone(), min, max)
    }

    /// True if the page is the store's error page or shows a block message.
    pub fn detect(&self, url: Option<&str>, html: &str) -> bool {
        if let Some(url) = url {
            if !self.blocked_url_pattern.is_empty() && url.contains(&self.blocked_url_pattern) {
                debug!("Blocked URL pattern in {}", url);
                return true;
            }
        }

        if self.fragments.is_empty() {
            return false;
        }

        let text = visible_text(html);
        self.fragments.iter().any(|fragment| text.contains(fragment))
    }

    /// A random wait within the configured bounds.
    pub fn backoff_duration(&self) -> Duration {
        let min = u64::try_from(self.backoff_min.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.backoff_max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Sleeps for a randomized backoff.
    pub async fn backoff(&self) {
        let delay = self.backoff_duration();
        debug!("Backing off for {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }

    /// Inspects the page; on a block, backs off and forces a full reload.
    ///
    /// Returns `Ok(true)` when recovery ran and the caller should retry its
    /// navigation once, `Ok(false)` with no delay when the page is clean.
    pub async fn check_and_recover(&self, page: &dyn BrowserPage) -> Result<bool, ScrapeError> {
        let url = page.url().await?;
        let html = page.content().await?;

        if !self.detect(url.as_deref(), &html) {
            return Ok(false);
        }

        let url = url.unwrap_or_default();
        warn!("Rate limited or blocked at {}", url);
        self.recover(page, &url).await?;
        Ok(true)
    }

    /// Backs off, then reloads the page.
    pub async fn recover(&self, page: &dyn BrowserPage, url: &str) -> Result<(), ScrapeError> {
        self.backoff().await;
        page.reload().await.map_err(|e| ScrapeError::navigation(url, e))
    }
}

impl Default for RateLimitGuard {
    fn default() -> Self {
        Self::new(
            errors::BLOCKED_URL_PATTERN,
            errors::TEXT_FRAGMENTS.iter().map(|f| f.to_string()),
            Duration::from_secs(10),
            Duration::from_secs(15),
        )
    }
}
