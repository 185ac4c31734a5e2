//! In-memory browser for tests.
//!
//! A [`MockSite`] maps URLs to canned HTML. Pages opened through
//! [`MockLauncher`] "load" those documents on `goto`/`reload`, so the session
//! manager, rate-limit guard and pipeline run unchanged against it.

use super::{BrowserBackend, BrowserLauncher, BrowserPage, ContextId};
use crate::error::{BrowserError, BrowserResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const EMPTY_PAGE: &str = "<html><body></body></html>";

#[derive(Default)]
struct SiteState {
    responses: HashMap<String, VecDeque<String>>,
    failures: HashMap<String, usize>,
    redirects: HashMap<String, String>,
    render_after: HashMap<String, usize>,
    goto_delay: Duration,
    loads: Vec<String>,
}

/// Canned responses keyed by URL.
#[derive(Default)]
pub(crate) struct MockSite {
    state: Mutex<SiteState>,
}

impl MockSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves `html` for every load of `url`.
    pub fn serve(&self, url: &str, html: impl Into<String>) {
        self.serve_sequence(url, vec![html.into()]);
    }

    /// Serves each document once, in order; the last one repeats.
    pub fn serve_sequence(&self, url: &str, documents: Vec<String>) {
        let mut state = self.state.lock().unwrap();
        state.responses.insert(url.to_string(), documents.into());
    }

    /// Makes the next `times` loads of `url` fail.
    pub fn fail_next(&self, url: &str, times: usize) {
        self.state.lock().unwrap().failures.insert(url.to_string(), times);
    }

    /// Reports `to` as the page URL after loading `from`.
    pub fn redirect(&self, from: &str, to: &str) {
        self.state.lock().unwrap().redirects.insert(from.to_string(), to.to_string());
    }

    /// Shows an empty document for the first `reads` reads after each load of `url`.
    pub fn render_after(&self, url: &str, reads: usize) {
        self.state.lock().unwrap().render_after.insert(url.to_string(), reads);
    }

    /// Delay applied to every navigation.
    pub fn set_goto_delay(&self, delay: Duration) {
        self.state.lock().unwrap().goto_delay = delay;
    }

    /// Number of loads (navigations and reloads) of `url`.
    pub fn loads_of(&self, url: &str) -> usize {
        self.state.lock().unwrap().loads.iter().filter(|u| *u == url).count()
    }

    pub fn total_loads(&self) -> usize {
        self.state.lock().unwrap().loads.len()
    }

    fn goto_delay(&self) -> Duration {
        self.state.lock().unwrap().goto_delay
    }

    fn load(&self, url: &str) -> BrowserResult<Loaded> {
        let mut state = self.state.lock().unwrap();
        state.loads.push(url.to_string());

        if let Some(remaining) = state.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
        }

        let final_url = state.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        let html = match state.responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => EMPTY_PAGE.to_string(),
        };
        let pending_reads = state.render_after.get(url).copied().unwrap_or(0);
        Ok(Loaded { requested: url.to_string(), final_url, html, pending_reads })
    }
}

struct Loaded {
    requested: String,
    final_url: String,
    html: String,
    pending_reads: usize,
}

/// A tab over a [`MockSite`].
pub(crate) struct MockPage {
    site: Arc<MockSite>,
    context: ContextId,
    current: Mutex<Option<Loaded>>,
    closed: AtomicBool,
    reloads: AtomicUsize,
}

impl MockPage {
    pub fn new(site: Arc<MockSite>, context: ContextId) -> Self {
        Self {
            site,
            context,
            current: Mutex::new(None),
            closed: AtomicBool::new(false),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.is_closed() {
            Err(BrowserError::Protocol("page closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn store(&self, loaded: Loaded) {
        *self.current.lock().unwrap() = Some(loaded);
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        let delay = self.site.goto_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let loaded = self.site.load(url)?;
        self.store(loaded);
        Ok(())
    }

    async fn reload(&self) -> BrowserResult<()> {
        self.ensure_open()?;
        let requested = self
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|l| l.requested.clone())
            .ok_or_else(|| BrowserError::Protocol("nothing to reload".to_string()))?;
        self.reloads.fetch_add(1, Ordering::SeqCst);
        let loaded = self.site.load(&requested)?;
        self.store(loaded);
        Ok(())
    }

    async fn url(&self) -> BrowserResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.current.lock().unwrap().as_ref().map(|l| l.final_url.clone()))
    }

    async fn content(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        let mut current = self.current.lock().unwrap();
        match current.as_mut() {
            Some(loaded) if loaded.pending_reads > 0 => {
                loaded.pending_reads -= 1;
                Ok(EMPTY_PAGE.to_string())
            }
            Some(loaded) => Ok(loaded.html.clone()),
            None => Ok(EMPTY_PAGE.to_string()),
        }
    }

    async fn close(&self) -> BrowserResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A browser process over a [`MockSite`].
pub(crate) struct MockBackend {
    site: Arc<MockSite>,
    connected: AtomicBool,
    shut_down: AtomicBool,
    contexts_created: AtomicUsize,
    contexts_disposed: AtomicUsize,
    pages: Mutex<Vec<Arc<MockPage>>>,
}

impl MockBackend {
    pub fn new(site: Arc<MockSite>) -> Self {
        Self {
            site,
            connected: AtomicBool::new(true),
            shut_down: AtomicBool::new(false),
            contexts_created: AtomicUsize::new(0),
            contexts_disposed: AtomicUsize::new(0),
            pages: Mutex::new(Vec::new()),
        }
    }

    /// Simulates the browser process dying.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn was_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn contexts_created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }

    pub fn contexts_disposed(&self) -> usize {
        self.contexts_disposed.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.pages.lock().unwrap().iter().filter(|p| !p.is_closed()).count()
    }

    pub fn total_reloads(&self) -> usize {
        self.pages.lock().unwrap().iter().map(|p| p.reloads()).sum()
    }

    fn ensure_connected(&self) -> BrowserResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BrowserError::Disconnected)
        }
    }
}

#[async_trait]
impl BrowserBackend for MockBackend {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn create_context(&self) -> BrowserResult<ContextId> {
        self.ensure_connected()?;
        let n = self.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(ContextId::new(format!("ctx-{}", n)))
    }

    async fn new_page(&self, context: &ContextId) -> BrowserResult<Arc<dyn BrowserPage>> {
        self.ensure_connected()?;
        let page = Arc::new(MockPage::new(self.site.clone(), context.clone()));
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }

    async fn dispose_context(&self, context: &ContextId) -> BrowserResult<()> {
        self.contexts_disposed.fetch_add(1, Ordering::SeqCst);
        for page in self.pages.lock().unwrap().iter().filter(|p| &p.context == context) {
            page.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn shutdown(&self) -> BrowserResult<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches [`MockBackend`]s and keeps them for inspection.
pub(crate) struct MockLauncher {
    site: Arc<MockSite>,
    fail: bool,
    backends: Mutex<Vec<Arc<MockBackend>>>,
}

impl MockLauncher {
    pub fn new(site: Arc<MockSite>) -> Self {
        Self { site, fail: false, backends: Mutex::new(Vec::new()) }
    }

    /// A launcher whose every launch fails.
    pub fn failing(site: Arc<MockSite>) -> Self {
        Self { site, fail: true, backends: Mutex::new(Vec::new()) }
    }

    pub fn launches(&self) -> usize {
        self.backends.lock().unwrap().len()
    }

    pub fn backend(&self, index: usize) -> Arc<MockBackend> {
        self.backends.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserBackend>> {
        if self.fail {
            return Err(BrowserError::Launch("chrome not found".to_string()));
        }
        let backend = Arc::new(MockBackend::new(self.site.clone()));
        self.backends.lock().unwrap().push(backend.clone());
        Ok(backend)
    }
}
