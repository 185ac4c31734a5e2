//! End-to-end scrape of one card: search, pick the product, price each condition.
//!
//! The pipeline is an explicit state machine:
//!
//! ```text
//! SearchNavigate -> CandidateSelect -> ConditionLoop -> Aggregate -> Done
//!        \                 \                 \              \
//!         +-----------------+-----------------+--------------+--> Failed
//! ```
//!
//! Every navigation is followed by a rate-limit check. The request's browsing
//! session is released whatever the outcome.

use super::guard::RateLimitGuard;
use crate::browser::{wait, BrowserPage, Session, SessionManager};
use crate::config::Config;
use crate::error::{ScrapeError, ScrapeFailure};
use crate::filters::{select_best, FilterChainBuilder};
use crate::request::{LookupRequest, RequestId};
use crate::tcgplayer::models::{Condition, ConditionListing, PriceReport, ProductCandidate};
use crate::tcgplayer::{Parser, Site};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Conditions priced per card; the loop stops once this many resolve.
const MAX_CONDITIONS: usize = 2;

/// Something that can price a card.
#[async_trait]
pub trait PriceScraper: Send + Sync {
    async fn scrape(&self, request: &LookupRequest) -> Result<PriceReport, ScrapeFailure>;
}

/// Timing and selection knobs of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub render_timeout: Duration,
    pub poll_interval: Duration,
    pub conditions: Vec<Condition>,
    pub variant_markers: Vec<String>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            render_timeout: config.render_timeout(),
            poll_interval: config.poll_interval(),
            conditions: config.conditions.iter().fold(Vec::new(), |mut seen, condition| {
                if !seen.contains(condition) {
                    seen.push(*condition);
                }
                seen
            }),
            variant_markers: config.variant_markers.clone(),
        }
    }
}

enum Stage {
    SearchNavigate,
    CandidateSelect { html: String },
    ConditionLoop { product: ProductCandidate },
    Aggregate { product: ProductCandidate, listings: Vec<ConditionListing> },
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::SearchNavigate => "search-navigate",
            Stage::CandidateSelect { .. } => "candidate-select",
            Stage::ConditionLoop { .. } => "condition-loop",
            Stage::Aggregate { .. } => "aggregate",
        }
    }
}

/// Browser-driven [`PriceScraper`] for the store.
pub struct ScrapePipeline {
    sessions: Arc<SessionManager>,
    guard: RateLimitGuard,
    parser: Parser,
    site: Site,
    settings: PipelineSettings,
}

impl ScrapePipeline {
    pub fn new(
        sessions: Arc<SessionManager>,
        guard: RateLimitGuard,
        site: Site,
        settings: PipelineSettings,
    ) -> Self {
        Self { sessions, guard, parser: Parser::new(site.clone()), site, settings }
    }

    async fn run(&self, session: &Session, request: &LookupRequest) -> Result<PriceReport, ScrapeFailure> {
        let mut stage = Stage::SearchNavigate;

        loop {
            trace!("{} {}", request.id, stage.name());
            stage = match stage {
                Stage::SearchNavigate => {
                    let page = self.sessions.new_page(session).await?;
                    let url = self.site.search_url(&request.card_name);
                    self.navigate(request.id, page.as_ref(), &url).await?;
                    let html = self.await_search_results(request.id, page.as_ref()).await?;
                    Stage::CandidateSelect { html }
                }
                Stage::CandidateSelect { html } => {
                    let product = self.select_candidate(&request.card_name, &html)?;
                    Stage::ConditionLoop { product }
                }
                Stage::ConditionLoop { product } => {
                    let listings = self.price_conditions(session, request, &product).await?;
                    Stage::Aggregate { product, listings }
                }
                Stage::Aggregate { product, listings } => {
                    if listings.is_empty() {
                        return Err(ScrapeError::NoValidPrices(request.card_name.clone()).into());
                    }
                    return Ok(PriceReport {
                        card_name: request.card_name.clone(),
                        product,
                        listings,
                    });
                }
            };
        }
    }

    /// Loads `url`, retrying once after a failed load or a detected block.
    ///
    /// The session is touched before every load so a slow page never looks
    /// idle to the reaper.
    async fn navigate(
        &self,
        request_id: RequestId,
        page: &dyn BrowserPage,
        url: &str,
    ) -> Result<(), ScrapeError> {
        self.sessions.touch(request_id).await?;
        debug!("{} navigating to {}", request_id, url);

        if let Err(e) = page.goto(url).await {
            warn!("Navigation to {} failed ({}), retrying after backoff", url, e);
            self.guard.backoff().await;
            self.sessions.touch(request_id).await?;
            page.goto(url).await.map_err(|e| ScrapeError::navigation(url, e))?;
        }

        self.sessions.touch(request_id).await?;
        if self.guard.check_and_recover(page).await? {
            self.sessions.touch(request_id).await?;
            page.goto(url).await.map_err(|e| ScrapeError::navigation(url, e))?;

            let current = page.url().await?;
            let html = page.content().await?;
            if self.guard.detect(current.as_deref(), &html) {
                return Err(ScrapeError::RateLimited(url.to_string()));
            }
        }

        Ok(())
    }

    /// Keeps the session alive while a render wait polls.
    async fn keep_alive(&self, request_id: RequestId) {
        if let Err(e) = self.sessions.touch(request_id).await {
            trace!("{} not touched: {}", request_id, e);
        }
    }

    /// Waits for the results grid (or its empty state) and returns the page.
    async fn await_search_results(
        &self,
        request_id: RequestId,
        page: &dyn BrowserPage,
    ) -> Result<String, ScrapeError> {
        let parser = &self.parser;
        let rendered = wait::wait_until(self.settings.render_timeout, self.settings.poll_interval, || async move {
            self.keep_alive(request_id).await;
            page.content().await.is_ok_and(|html| parser.search_rendered(&html))
        })
        .await;

        if !rendered {
            warn!("Search results did not render in time");
        }
        Ok(page.content().await?)
    }

    fn select_candidate(&self, card_name: &str, html: &str) -> Result<ProductCandidate, ScrapeError> {
        let candidates = self.parser.parse_search(html);
        let chain = FilterChainBuilder::new()
            .exclude_variants(&self.settings.variant_markers)
            .exact_title(card_name)
            .build();

        if !chain.is_empty() {
            debug!("Active filters: {:?}", chain.descriptions());
        }

        let total = candidates.len();
        let playable = chain.apply(candidates);
        debug!("{} of {} candidates match '{}'", playable.len(), total, card_name);

        let best = select_best(&playable)
            .cloned()
            .ok_or_else(|| ScrapeError::NoMatchFound(card_name.to_string()))?;
        info!("Selected '{}' at {}", best.title, crate::price::format_cents(best.price_cents));
        Ok(best)
    }

    /// Resolves the first listing of each target condition.
    ///
    /// A condition that never renders is omitted. A navigation failure ends
    /// the request but keeps the listings already resolved.
    async fn price_conditions(
        &self,
        session: &Session,
        request: &LookupRequest,
        product: &ProductCandidate,
    ) -> Result<Vec<ConditionListing>, ScrapeFailure> {
        let page = self.sessions.new_page(session).await?;
        let mut listings: Vec<ConditionListing> = Vec::new();

        for &condition in &self.settings.conditions {
            if listings.len() >= MAX_CONDITIONS {
                break;
            }

            let url = self.site.condition_url(&product.product_url, condition);
            if let Err(e) = self.navigate(request.id, page.as_ref(), &url).await {
                return Err(ScrapeFailure::with_partial(e, listings));
            }

            match self.first_listing(request.id, page.as_ref(), condition, &url).await {
                Ok(listing) => {
                    debug!("{} {}: {}", request.card_name, condition, listing.display_price());
                    listings.push(listing);
                }
                Err(e) if !e.is_terminal() => {
                    warn!("Skipping {} for '{}': {}", condition, request.card_name, e);
                }
                Err(e) => return Err(ScrapeFailure::with_partial(e, listings)),
            }
        }

        Ok(listings)
    }

    /// Waits for listing rows to render, then reads the first one for
    /// `condition`.
    async fn first_listing(
        &self,
        request_id: RequestId,
        page: &dyn BrowserPage,
        condition: Condition,
        url: &str,
    ) -> Result<ConditionListing, ScrapeError> {
        let parser = &self.parser;
        let rendered = wait::wait_until(self.settings.render_timeout, self.settings.poll_interval, || async move {
            self.keep_alive(request_id).await;
            page.content().await.is_ok_and(|html| parser.count_listings(&html) > 0)
        })
        .await;

        if !rendered {
            debug!("{} no listing rows for {}", request_id, condition);
        }
        let html = page.content().await?;
        parser.parse_first_listing(&html, condition, url)
    }
}

#[async_trait]
impl PriceScraper for ScrapePipeline {
    async fn scrape(&self, request: &LookupRequest) -> Result<PriceReport, ScrapeFailure> {
        info!("Scraping '{}' ({})", request.card_name, request.id);
        let session = self.sessions.acquire_session(request.id).await?;

        let outcome = self.run(&session, request).await;
        self.sessions.release(request.id).await;
        debug!("{} session closed after {:?}", request.id, session.created_at.elapsed());

        match &outcome {
            Ok(report) => info!("'{}' resolved {} condition(s)", request.card_name, report.listings.len()),
            Err(failure) => warn!("'{}' failed: {}", request.card_name, failure),
        }
        outcome
    }
}
