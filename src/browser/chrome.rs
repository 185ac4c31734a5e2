//! Chromium backend over the DevTools protocol.

use super::filter::{InterceptedRequest, RequestFilter, Verdict};
use super::{BrowserBackend, BrowserLauncher, BrowserPage, ContextId, ObserverHandle};
use crate::config::Config;
use crate::error::{BrowserError, BrowserResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, Headers, ResourceType, SetExtraHttpHeadersParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{EventFrameNavigated, ReloadParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Handler, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Realistic desktop user agent sent by every page.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// How the browser is launched and how each page is set up.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub proxy: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    pub accept_language: String,
    pub navigation_timeout: Duration,
    pub request_timeout: Duration,
    pub blocked_url_pattern: String,
}

impl BrowserSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executable: config.chrome_path.clone(),
            headless: config.headless,
            proxy: config.proxy.clone(),
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            navigation_timeout: config.navigation_timeout(),
            request_timeout: config.navigation_timeout(),
            blocked_url_pattern: config.blocked_url_pattern.clone(),
        }
    }

    fn browser_config(&self) -> BrowserResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .enable_request_intercept()
            .request_timeout(self.request_timeout)
            .window_size(self.viewport_width, self.viewport_height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder.build().map_err(BrowserError::Launch)
    }

    /// Headers sent with every request, on top of the user agent.
    fn extra_headers(&self) -> serde_json::Value {
        serde_json::json!({
            "Accept-Language": self.accept_language,
            "Sec-Ch-Ua": "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
            "Sec-Ch-Ua-Mobile": "?0",
            "Sec-Ch-Ua-Platform": "\"macOS\"",
            "Upgrade-Insecure-Requests": "1",
        })
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Launches local Chromium processes.
pub struct ChromeLauncher {
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserBackend>> {
        let config = self.settings.browser_config()?;
        let (browser, handler) =
            Browser::launch(config).await.map_err(|e| BrowserError::Launch(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler(handler, closed.clone());
        debug!("Chromium launched (headless: {})", self.settings.headless);

        Ok(Arc::new(ChromeBackend {
            browser,
            handler_task,
            closed,
            settings: self.settings.clone(),
        }))
    }
}

/// Drives the CDP connection; flips `closed` when the connection ends.
fn spawn_handler(mut handler: Handler, closed: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("Browser handler error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
        debug!("Browser connection closed");
    })
}

/// A running Chromium process.
pub struct ChromeBackend {
    browser: Browser,
    handler_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
    settings: BrowserSettings,
}

#[async_trait]
impl BrowserBackend for ChromeBackend {
    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.handler_task.is_finished()
    }

    async fn create_context(&self) -> BrowserResult<ContextId> {
        if !self.is_connected() {
            return Err(BrowserError::Disconnected);
        }
        let response = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(BrowserError::protocol)?;
        Ok(ContextId::new(response.result.browser_context_id.inner().clone()))
    }

    async fn new_page(&self, context: &ContextId) -> BrowserResult<Arc<dyn BrowserPage>> {
        if !self.is_connected() {
            return Err(BrowserError::Disconnected);
        }
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(BrowserContextId::new(context.as_str()))
            .build()
            .map_err(BrowserError::Protocol)?;

        let page = self.browser.new_page(params).await.map_err(BrowserError::protocol)?;

        let observers = match configure_page(&page, &self.settings).await {
            Ok(observers) => observers,
            Err(e) => {
                if let Err(close_err) = page.close().await {
                    debug!("Closing unconfigured page: {}", close_err);
                }
                return Err(e);
            }
        };

        Ok(Arc::new(ChromePage {
            page,
            navigation_timeout: self.settings.navigation_timeout,
            observers: Mutex::new(observers),
        }))
    }

    async fn dispose_context(&self, context: &ContextId) -> BrowserResult<()> {
        self.browser
            .execute(DisposeBrowserContextParams::new(BrowserContextId::new(context.as_str())))
            .await
            .map_err(BrowserError::protocol)?;
        Ok(())
    }

    async fn shutdown(&self) -> BrowserResult<()> {
        let result = self.browser.execute(CloseParams::default()).await;
        self.closed.store(true, Ordering::SeqCst);
        self.handler_task.abort();
        result.map(|_| ()).map_err(BrowserError::protocol)
    }
}

/// Applies viewport, identity headers and observers to a fresh page.
async fn configure_page(page: &Page, settings: &BrowserSettings) -> BrowserResult<Vec<ObserverHandle>> {
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(settings.viewport_width),
        i64::from(settings.viewport_height),
        1.0,
        false,
    ))
    .await
    .map_err(BrowserError::protocol)?;

    page.execute(network::EnableParams::default()).await.map_err(BrowserError::protocol)?;

    let mut user_agent = SetUserAgentOverrideParams::new(settings.user_agent.clone());
    user_agent.accept_language = Some(settings.accept_language.clone());
    page.execute(user_agent).await.map_err(BrowserError::protocol)?;

    page.execute(SetExtraHttpHeadersParams::new(Headers::new(settings.extra_headers())))
        .await
        .map_err(BrowserError::protocol)?;

    let filter = RequestFilter::new(settings.blocked_url_pattern.clone());
    Ok(vec![observe_requests(page, filter).await?, observe_navigations(page).await?])
}

/// Answers every paused request according to the filter.
async fn observe_requests(page: &Page, filter: RequestFilter) -> BrowserResult<ObserverHandle> {
    let mut events =
        page.event_listener::<EventRequestPaused>().await.map_err(BrowserError::protocol)?;
    let page = page.clone();

    let task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let main_frame = page.mainframe().await.ok().flatten();
            let request = InterceptedRequest {
                url: &event.request.url,
                is_document: event.resource_type == ResourceType::Document,
                in_main_frame: main_frame.as_ref().map_or(true, |frame| *frame == event.frame_id),
            };

            let answered = match filter.verdict(&request) {
                Verdict::Continue => page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ()),
                Verdict::Abort => {
                    debug!("Blocked request: {}", event.request.url);
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                }
            };

            if let Err(e) = answered {
                trace!("Request {} left unanswered: {}", event.request.url, e);
            }
        }
    });

    Ok(ObserverHandle::new(task))
}

/// Logs top-level navigations, including redirects.
async fn observe_navigations(page: &Page) -> BrowserResult<ObserverHandle> {
    let mut events =
        page.event_listener::<EventFrameNavigated>().await.map_err(BrowserError::protocol)?;

    let task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event.frame.parent_id.is_none() {
                debug!("Navigated to {}", event.frame.url);
            }
        }
    });

    Ok(ObserverHandle::new(task))
}

/// One Chromium tab.
pub struct ChromePage {
    page: Page,
    navigation_timeout: Duration,
    observers: Mutex<Vec<ObserverHandle>>,
}

impl ChromePage {
    fn timeout_error(&self, url: &str) -> BrowserError {
        BrowserError::Timeout {
            url: url.to_string(),
            timeout_ms: u64::try_from(self.navigation_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                Err(BrowserError::Navigation { url: url.to_string(), message: e.to_string() })
            }
            Err(_) => Err(self.timeout_error(url)),
        }
    }

    async fn reload(&self) -> BrowserResult<()> {
        let current = self.url().await?.unwrap_or_default();
        let mut params = ReloadParams::default();
        params.ignore_cache = Some(true);

        let reload = async {
            self.page.execute(params).await?;
            self.page.wait_for_navigation().await.map(|_| ())
        };

        match tokio::time::timeout(self.navigation_timeout, reload).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::Navigation { url: current, message: e.to_string() }),
            Err(_) => Err(self.timeout_error(&current)),
        }
    }

    async fn url(&self) -> BrowserResult<Option<String>> {
        self.page.url().await.map_err(BrowserError::protocol)
    }

    async fn content(&self) -> BrowserResult<String> {
        self.page.content().await.map_err(BrowserError::protocol)
    }

    async fn close(&self) -> BrowserResult<()> {
        let observers = std::mem::take(&mut *self.observers.lock().await);
        for observer in observers {
            observer.detach();
        }
        self.page.clone().close().await.map_err(BrowserError::protocol)
    }
}
