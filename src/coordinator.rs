//! Request coordination: deduplication, caching and the `resolve` entry point.
//!
//! Every lookup for a card goes through one cache line keyed by the card's
//! normalized name. The first caller for a key leads the scrape; callers
//! arriving while it runs either get the last known good result or wait on
//! the leader's outcome. Only one scrape per key is ever in flight.

use crate::config::Config;
use crate::error::ScrapeFailure;
use crate::legality::{Legality, LegalityLookup};
use crate::request::{LookupRequest, RequestId};
use crate::scrape::PriceScraper;
use crate::tcgplayer::models::{quotes, Condition, PriceQuote, PriceReport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Prices and legality of one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    pub card_name: String,
    pub product_title: String,
    pub product_url: String,
    pub prices: BTreeMap<Condition, PriceQuote>,
    pub legality: Legality,
}

impl CardInfo {
    fn from_report(report: PriceReport, legality: Legality) -> Self {
        let prices = report.prices();
        Self {
            card_name: report.card_name,
            product_title: report.product.title,
            product_url: report.product.product_url,
            prices,
            legality,
        }
    }
}

/// A lookup that produced no usable price, with whatever was learned anyway.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{card_name}: {reason}")]
pub struct LookupFailure {
    pub card_name: String,
    #[serde(rename = "error")]
    pub reason: String,
    pub legality: Legality,
    pub prices: BTreeMap<Condition, PriceQuote>,
}

impl LookupFailure {
    fn new(card_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            card_name: card_name.into(),
            reason: reason.into(),
            legality: Legality::Unknown,
            prices: BTreeMap::new(),
        }
    }

    fn from_scrape(card_name: &str, failure: ScrapeFailure, legality: Legality) -> Self {
        Self {
            card_name: card_name.to_string(),
            reason: failure.error.to_string(),
            legality,
            prices: quotes(&failure.partial),
        }
    }
}

/// Result of [`Coordinator::resolve`].
pub type LookupOutcome = Result<CardInfo, LookupFailure>;

/// State of a cache line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    InProgress,
    Complete,
    /// Only ever reported by a settling lookup; failed lines are evicted.
    Failed,
}

struct CacheEntry {
    status: CacheStatus,
    /// Last known good result, kept while a refresh runs.
    payload: Option<CardInfo>,
    inserted_at: Instant,
    request_id: RequestId,
    outcome: watch::Receiver<Option<LookupOutcome>>,
}

type CacheTable = Arc<Mutex<HashMap<String, CacheEntry>>>;

enum Plan {
    Hit(CardInfo),
    Wait(RequestId, watch::Receiver<Option<LookupOutcome>>),
    Lead(RequestId, watch::Sender<Option<LookupOutcome>>),
}

/// Cache lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// How long a completed lookup is served.
    pub ttl: Duration,
    /// How long an unfinished lookup may hold its key.
    pub in_progress_stale: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self { ttl: config.cache_ttl(), in_progress_stale: config.in_progress_stale() }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(600), in_progress_stale: Duration::from_secs(300) }
    }
}

/// Normalized cache key: trimmed, whitespace collapsed, lowercased.
pub fn cache_key(card_name: &str) -> String {
    card_name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Single entry point for card lookups.
pub struct Coordinator {
    scraper: Arc<dyn PriceScraper>,
    legality: Arc<dyn LegalityLookup>,
    cache: CacheTable,
    next_request: AtomicU64,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(
        scraper: Arc<dyn PriceScraper>,
        legality: Arc<dyn LegalityLookup>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            scraper,
            legality,
            cache: Arc::new(Mutex::new(HashMap::new())),
            next_request: AtomicU64::new(0),
            settings,
        }
    }

    /// Looks up prices and legality for a card.
    pub async fn resolve(&self, card_name: &str) -> LookupOutcome {
        let key = cache_key(card_name);
        if key.is_empty() {
            return Err(LookupFailure::new(card_name, "card name is empty"));
        }

        match self.plan(&key).await {
            Plan::Hit(info) => {
                debug!("Cache hit for '{}'", key);
                Ok(info)
            }
            Plan::Wait(request_id, outcome) => {
                debug!("Joining in-flight lookup {} for '{}'", request_id, key);
                self.wait_for(&key, card_name, request_id, outcome).await
            }
            Plan::Lead(request_id, outcome_tx) => {
                let outcome = self.lead(&key, card_name.trim(), request_id, outcome_tx);
                self.wait_for(&key, card_name, request_id, outcome).await
            }
        }
    }

    /// Decides, atomically under the table lock, how this caller is served.
    async fn plan(&self, key: &str) -> Plan {
        let now = Instant::now();
        let mut cache = self.cache.lock().await;

        if let Some(entry) = cache.get_mut(key) {
            let fresh = now.saturating_duration_since(entry.inserted_at) < self.settings.ttl;
            match (entry.status, entry.payload.clone()) {
                (CacheStatus::Complete, Some(payload)) if fresh => return Plan::Hit(payload),
                (CacheStatus::InProgress, Some(payload)) => return Plan::Hit(payload),
                (CacheStatus::InProgress, None) => {
                    return Plan::Wait(entry.request_id, entry.outcome.clone());
                }
                (CacheStatus::Complete, Some(_)) => {
                    // Expired: refresh in place, keeping the old payload for
                    // callers arriving meanwhile.
                    let request_id = self.next_request_id();
                    let (tx, rx) = watch::channel(None);
                    entry.status = CacheStatus::InProgress;
                    entry.inserted_at = now;
                    entry.request_id = request_id;
                    entry.outcome = rx;
                    debug!("Refreshing expired entry for '{}' as {}", key, request_id);
                    return Plan::Lead(request_id, tx);
                }
                _ => {}
            }
        }

        let request_id = self.next_request_id();
        let (tx, rx) = watch::channel(None);
        cache.insert(
            key.to_string(),
            CacheEntry {
                status: CacheStatus::InProgress,
                payload: None,
                inserted_at: now,
                request_id,
                outcome: rx,
            },
        );
        Plan::Lead(request_id, tx)
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::new(self.next_request.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Starts the scrape and the legality lookup on their own task.
    ///
    /// The task settles the cache line and publishes the outcome itself, so
    /// dropping the calling `resolve` neither cancels the lookup nor frees
    /// the key for a second one.
    fn lead(
        &self,
        key: &str,
        card_name: &str,
        request_id: RequestId,
        outcome_tx: watch::Sender<Option<LookupOutcome>>,
    ) -> watch::Receiver<Option<LookupOutcome>> {
        info!("Looking up '{}' ({})", card_name, request_id);

        let outcome_rx = outcome_tx.subscribe();
        let scraper = self.scraper.clone();
        let legality = self.legality.clone();
        let cache = self.cache.clone();
        let key = key.to_string();
        let name = card_name.to_string();

        tokio::spawn(async move {
            let request = LookupRequest::new(name.clone(), request_id);
            let (scraped, legality) = tokio::join!(scraper.scrape(&request), legality.lookup(&name));
            let outcome = match scraped {
                Ok(report) => Ok(CardInfo::from_report(report, legality)),
                Err(failure) => Err(LookupFailure::from_scrape(&name, failure, legality)),
            };

            let status = settle(&cache, &key, request_id, &outcome).await;
            debug!("{} settled as {:?}", request_id, status);
            outcome_tx.send_replace(Some(outcome));
        });

        outcome_rx
    }

    /// Waits for the lookup task to publish its outcome.
    async fn wait_for(
        &self,
        key: &str,
        card_name: &str,
        request_id: RequestId,
        mut outcome: watch::Receiver<Option<LookupOutcome>>,
    ) -> LookupOutcome {
        let settled = match outcome.wait_for(Option::is_some).await {
            Ok(published) => (*published).clone(),
            Err(_) => None,
        };
        if let Some(result) = settled {
            return result;
        }

        // The lookup task died without publishing.
        warn!("Lookup {} for '{}' was abandoned", request_id, key);
        let mut cache = self.cache.lock().await;
        if cache.get(key).map(|e| e.request_id) == Some(request_id) {
            cache.remove(key);
        }
        Err(LookupFailure::new(card_name.trim(), "lookup abandoned"))
    }

    /// Evicts stale in-progress lines and expired results. Returns the count.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.cache.lock().await;
        let before = cache.len();

        cache.retain(|key, entry| {
            let age = now.saturating_duration_since(entry.inserted_at);
            let keep = match entry.status {
                CacheStatus::InProgress => age <= self.settings.in_progress_stale,
                CacheStatus::Complete => age <= self.settings.ttl,
                CacheStatus::Failed => false,
            };
            if !keep {
                debug!("Evicting {:?} entry for '{}'", entry.status, key);
            }
            keep
        });

        before - cache.len()
    }

    /// Runs [`sweep`](Self::sweep) on a fixed interval until the coordinator
    /// is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let coordinator: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                let evicted = coordinator.sweep().await;
                if evicted > 0 {
                    debug!("Sweeper evicted {} cache entr(ies)", evicted);
                }
            }
        })
    }

    /// State of the cache line for a card, if any.
    pub async fn status(&self, card_name: &str) -> Option<CacheStatus> {
        self.cache.lock().await.get(&cache_key(card_name)).map(|e| e.status)
    }

    /// Number of cache lines.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Records the outcome if the cache line still belongs to this request.
async fn settle(
    cache: &CacheTable,
    key: &str,
    request_id: RequestId,
    outcome: &LookupOutcome,
) -> CacheStatus {
    let status = match outcome {
        Ok(_) => CacheStatus::Complete,
        Err(_) => CacheStatus::Failed,
    };

    let mut cache = cache.lock().await;
    let owned = cache.get(key).map(|e| e.request_id) == Some(request_id);
    if !owned {
        debug!("Cache line for '{}' was swept or replaced; not caching {}", key, request_id);
        return status;
    }

    match outcome {
        Ok(info) => {
            if let Some(entry) = cache.get_mut(key) {
                entry.status = CacheStatus::Complete;
                entry.payload = Some(info.clone());
                entry.inserted_at = Instant::now();
            }
        }
        Err(_) => {
            cache.remove(key);
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::tcgplayer::models::{ConditionListing, ProductCandidate};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    const MINUTE: Duration = Duration::from_secs(60);

    /// Scraper that counts runs and prices the near-mint copy by run number.
    #[derive(Default)]
    struct CountingScraper {
        runs: AtomicUsize,
        live: AtomicUsize,
        max_live: AtomicUsize,
        delay: Duration,
        fail: bool,
        panic: bool,
    }

    impl CountingScraper {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self { delay, ..Self::default() })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { delay: Duration::from_secs(1), fail: true, ..Self::default() })
        }

        fn panicking() -> Arc<Self> {
            Arc::new(Self { delay: Duration::from_secs(1), panic: true, ..Self::default() })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }

        fn max_live(&self) -> usize {
            self.max_live.load(Ordering::SeqCst)
        }
    }

    fn listing(condition: Condition, base: u64) -> ConditionListing {
        ConditionListing {
            condition,
            base_price_cents: base,
            shipping_cents: 0,
            listing_url: format!("https://store.test/product/1?Condition={}", condition.code()),
        }
    }

    #[async_trait]
    impl PriceScraper for CountingScraper {
        async fn scrape(&self, request: &LookupRequest) -> Result<PriceReport, ScrapeFailure> {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.live.fetch_sub(1, Ordering::SeqCst);
            let run = self.runs.fetch_add(1, Ordering::SeqCst) as u64 + 1;

            if self.panic {
                panic!("scraper crashed");
            }

            if self.fail {
                return Err(ScrapeFailure::with_partial(
                    ScrapeError::navigation("https://store.test/product/1", "timed out"),
                    vec![listing(Condition::NearMint, 1500)],
                ));
            }

            Ok(PriceReport {
                card_name: request.card_name.clone(),
                product: ProductCandidate::new(&request.card_name, 1400, "https://store.test/product/1"),
                listings: vec![listing(Condition::NearMint, 1500 + run)],
            })
        }
    }

    struct FixedLegality(Legality);

    #[async_trait]
    impl LegalityLookup for FixedLegality {
        async fn lookup(&self, _card_name: &str) -> Legality {
            self.0
        }
    }

    fn coordinator(scraper: &Arc<CountingScraper>) -> Arc<Coordinator> {
        Arc::new(Coordinator::new(
            scraper.clone(),
            Arc::new(FixedLegality(Legality::Legal)),
            CoordinatorSettings::default(),
        ))
    }

    fn near_mint(info: &CardInfo) -> &str {
        &info.prices[&Condition::NearMint].price
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("  Drannith   MAGISTRATE "), "drannith magistrate");
        assert_eq!(cache_key(" \t "), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_lookups_share_one_scrape() {
        let scraper = CountingScraper::new(Duration::from_secs(5));
        let coordinator = coordinator(&scraper);

        let lookups = (0..10).map(|i| {
            let coordinator = coordinator.clone();
            let name = if i % 2 == 0 { "Drannith Magistrate" } else { " drannith  magistrate" };
            tokio::spawn(async move { coordinator.resolve(name).await })
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(scraper.runs(), 1);
        for result in results {
            let info = result.unwrap().unwrap();
            assert_eq!(near_mint(&info), "$15.01");
            assert_eq!(info.legality, Legality::Legal);
        }
        assert_eq!(coordinator.status("Drannith Magistrate").await, Some(CacheStatus::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_serves_then_expires() {
        let scraper = CountingScraper::new(Duration::from_secs(1));
        let coordinator = coordinator(&scraper);

        coordinator.resolve("Drannith Magistrate").await.unwrap();
        assert_eq!(scraper.runs(), 1);

        tokio::time::advance(9 * MINUTE).await;
        assert_eq!(coordinator.sweep().await, 0);
        let cached = coordinator.resolve("Drannith Magistrate").await.unwrap();
        assert_eq!(scraper.runs(), 1);
        assert_eq!(near_mint(&cached), "$15.01");

        tokio::time::advance(2 * MINUTE).await;
        assert_eq!(coordinator.sweep().await, 1);
        assert_eq!(coordinator.status("Drannith Magistrate").await, None);

        let fresh = coordinator.resolve("Drannith Magistrate").await.unwrap();
        assert_eq!(scraper.runs(), 2);
        assert_eq!(near_mint(&fresh), "$15.02");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refreshed_with_last_known_good() {
        let scraper = CountingScraper::new(Duration::from_secs(5));
        let coordinator = coordinator(&scraper);

        coordinator.resolve("Opt").await.unwrap();
        tokio::time::advance(11 * MINUTE).await;

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.resolve("Opt").await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(coordinator.status("Opt").await, Some(CacheStatus::InProgress));

        // Served the stale payload immediately instead of waiting.
        let stale = coordinator.resolve("Opt").await.unwrap();
        assert_eq!(near_mint(&stale), "$15.01");

        let refreshed = leader.await.unwrap().unwrap();
        assert_eq!(near_mint(&refreshed), "$15.02");
        assert_eq!(scraper.runs(), 2);
        assert_eq!(near_mint(&coordinator.resolve("Opt").await.unwrap()), "$15.02");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_evicted_and_keeps_partial_data() {
        let scraper = CountingScraper::failing();
        let coordinator = coordinator(&scraper);

        let failure = coordinator.resolve("Drannith Magistrate").await.unwrap_err();
        assert!(failure.reason.contains("navigation failed"));
        assert_eq!(failure.legality, Legality::Legal);
        assert_eq!(failure.prices[&Condition::NearMint].price, "$15.00");
        assert_eq!(coordinator.status("Drannith Magistrate").await, None);

        coordinator.resolve("Drannith Magistrate").await.unwrap_err();
        assert_eq!(scraper.runs(), 2);
    }

    #[tokio::test]
    async fn test_blank_name_fails_without_scraping() {
        let scraper = CountingScraper::new(Duration::ZERO);
        let coordinator = coordinator(&scraper);

        let failure = coordinator.resolve("   ").await.unwrap_err();
        assert_eq!(failure.reason, "card name is empty");
        assert_eq!(failure.legality, Legality::Unknown);
        assert_eq!(scraper.runs(), 0);
        assert_eq!(coordinator.cached().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_in_progress_swept() {
        let scraper = CountingScraper::new(7 * MINUTE);
        let coordinator = coordinator(&scraper);

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.resolve("Opt").await })
        };

        tokio::time::sleep(4 * MINUTE).await;
        assert_eq!(coordinator.sweep().await, 0);

        tokio::time::sleep(2 * MINUTE).await;
        assert_eq!(coordinator.sweep().await, 1);

        // The late result is still returned but not cached.
        assert!(leader.await.unwrap().is_ok());
        assert_eq!(coordinator.status("Opt").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_keeps_lookup_running() {
        let scraper = CountingScraper::new(MINUTE);
        let coordinator = coordinator(&scraper);

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.resolve("Opt").await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.resolve("Opt").await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        first.abort();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Still in flight: a new caller joins instead of starting another scrape.
        assert_eq!(coordinator.status("Opt").await, Some(CacheStatus::InProgress));
        let late = coordinator.resolve("Opt").await.unwrap();
        let joined = waiter.await.unwrap().unwrap();

        assert_eq!(scraper.runs(), 1);
        assert_eq!(scraper.max_live(), 1);
        assert_eq!(near_mint(&late), "$15.01");
        assert_eq!(joined, late);
        assert_eq!(coordinator.status("Opt").await, Some(CacheStatus::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_lookup_releases_waiters() {
        let scraper = CountingScraper::panicking();
        let coordinator = coordinator(&scraper);

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.resolve("Opt").await })
        };
        let failure = coordinator.resolve("Opt").await.unwrap_err();
        assert_eq!(failure.reason, "lookup abandoned");
        assert_eq!(waiter.await.unwrap().unwrap_err().reason, "lookup abandoned");
        assert_eq!(coordinator.status("Opt").await, None);
        assert_eq!(scraper.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let scraper = CountingScraper::new(Duration::ZERO);
        let coordinator = coordinator(&scraper);
        let sweeper = coordinator.spawn_sweeper(MINUTE);

        coordinator.resolve("Opt").await.unwrap();
        assert_eq!(coordinator.cached().await, 1);

        tokio::time::sleep(12 * MINUTE).await;
        assert_eq!(coordinator.cached().await, 0);
        sweeper.abort();
    }

    #[test]
    fn test_failure_json_shape() {
        let failure = LookupFailure::new("Opt", "no product found for 'Opt'");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["error"], "no product found for 'Opt'");
        assert_eq!(json["legality"], "unknown");
        assert!(json.get("reason").is_none());
    }
}
