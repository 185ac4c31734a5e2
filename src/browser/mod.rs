//! Headless browser access: the shared browser, per-request contexts and pages.
//!
//! Everything above this module talks to the browser through the
//! [`BrowserLauncher`], [`BrowserBackend`] and [`BrowserPage`] traits, so the
//! scrape pipeline can run against Chromium or against in-memory pages.

pub mod chrome;
pub mod filter;
pub mod session;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::BrowserResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub use chrome::{BrowserSettings, ChromeLauncher};
pub use session::{Session, SessionManager};

/// Identifier of an isolated browsing context (separate cookies and storage).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One tab inside a browsing context.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigates and waits for the load to finish.
    async fn goto(&self, url: &str) -> BrowserResult<()>;

    /// Forces a full reload of the current document.
    async fn reload(&self) -> BrowserResult<()>;

    /// URL of the current document, after redirects.
    async fn url(&self) -> BrowserResult<Option<String>>;

    /// The live DOM serialized as HTML.
    async fn content(&self) -> BrowserResult<String>;

    /// Closes the tab and detaches its observers.
    async fn close(&self) -> BrowserResult<()>;
}

/// A running browser process.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// False once the connection to the browser process is gone.
    fn is_connected(&self) -> bool;

    /// Creates a fresh isolated browsing context.
    async fn create_context(&self) -> BrowserResult<ContextId>;

    /// Opens a configured page inside a context.
    async fn new_page(&self, context: &ContextId) -> BrowserResult<Arc<dyn BrowserPage>>;

    /// Disposes a context and every page still open in it.
    async fn dispose_context(&self, context: &ContextId) -> BrowserResult<()>;

    /// Closes the browser process.
    async fn shutdown(&self) -> BrowserResult<()>;
}

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserBackend>>;
}

/// Handle to a page event observer task.
///
/// The observer stops when the handle is detached or dropped.
#[derive(Debug)]
pub struct ObserverHandle(JoinHandle<()>);

impl ObserverHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self(task)
    }

    /// Stops the observer.
    pub fn detach(self) {
        // Drop aborts the task.
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
