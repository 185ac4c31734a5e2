//! Browsing session lifecycle.
//!
//! One browser process is shared by every request. Each request owns an
//! isolated context (its "session") with the pages it opened. Sessions end
//! on [`SessionManager::release`] or, if their owner never releases them,
//! when the reaper finds them idle past the ceiling.

use super::{BrowserBackend, BrowserLauncher, BrowserPage, ContextId};
use crate::error::{BrowserError, BrowserResult};
use crate::request::RequestId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default idle time after which a session is force-closed.
pub const DEFAULT_IDLE_CEILING: Duration = Duration::from_secs(120);

/// A request's browsing context, as handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Session {
    pub request_id: RequestId,
    pub context: ContextId,
    pub created_at: Instant,
}

struct TrackedSession {
    context: ContextId,
    backend: Arc<dyn BrowserBackend>,
    generation: u64,
    pages: Vec<Arc<dyn BrowserPage>>,
    last_active: Instant,
}

struct SharedBrowser {
    generation: u64,
    backend: Arc<dyn BrowserBackend>,
}

/// Owns the shared browser and the table of live sessions.
///
/// The browser slot and the session table have separate locks and no code
/// path holds both at once. Pages and contexts are always closed after the
/// session table lock is released.
pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    browser: Mutex<Option<SharedBrowser>>,
    sessions: Mutex<HashMap<RequestId, TrackedSession>>,
    idle_ceiling: Duration,
    launches: AtomicU64,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, idle_ceiling: Duration) -> Self {
        Self {
            launcher,
            browser: Mutex::new(None),
            sessions: Mutex::new(HashMap::new()),
            idle_ceiling,
            launches: AtomicU64::new(0),
        }
    }

    /// Number of times a browser process has been launched.
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of tracked sessions.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns a connected browser, launching or relaunching it as needed.
    async fn browser(&self) -> BrowserResult<(u64, Arc<dyn BrowserBackend>)> {
        let (fresh, stale) = {
            let mut slot = self.browser.lock().await;
            if let Some(shared) = slot.as_ref() {
                if shared.backend.is_connected() {
                    return Ok((shared.generation, shared.backend.clone()));
                }
                warn!("Browser disconnected, relaunching");
            }

            let stale = slot.take();
            let backend = match self.launcher.launch().await {
                Ok(backend) => backend,
                Err(e) => {
                    *slot = stale;
                    return Err(e);
                }
            };
            let generation = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
            info!("Browser launched (generation {})", generation);

            *slot = Some(SharedBrowser { generation, backend: backend.clone() });
            ((generation, backend), stale)
        };

        if let Some(stale) = stale {
            self.purge_generation(stale.generation).await;
            if let Err(e) = stale.backend.shutdown().await {
                debug!("Stale browser shutdown: {}", e);
            }
        }

        Ok(fresh)
    }

    /// Drops every session that lived on a browser which has gone away.
    async fn purge_generation(&self, generation: u64) {
        let victims: Vec<_> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<_> = sessions
                .iter()
                .filter(|(_, s)| s.generation == generation)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| sessions.remove(&id).map(|s| (id, s))).collect()
        };

        for (id, session) in victims {
            debug!("Dropping {} from disconnected browser", id);
            close_session(id, session).await;
        }
    }

    /// Creates the isolated context for a request.
    pub async fn acquire_session(&self, request_id: RequestId) -> BrowserResult<Session> {
        if self.sessions.lock().await.contains_key(&request_id) {
            return Err(BrowserError::SessionExists(request_id));
        }

        let (generation, backend) = self.browser().await?;
        let context = backend.create_context().await?;
        let now = Instant::now();

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&request_id) {
            drop(sessions);
            if let Err(e) = backend.dispose_context(&context).await {
                debug!("Disposing duplicate context {}: {}", context, e);
            }
            return Err(BrowserError::SessionExists(request_id));
        }

        sessions.insert(
            request_id,
            TrackedSession {
                context: context.clone(),
                backend,
                generation,
                pages: Vec::new(),
                last_active: now,
            },
        );
        debug!("Session {} opened context {}", request_id, context);

        Ok(Session { request_id, context, created_at: now })
    }

    /// Opens a configured page in the session's context.
    pub async fn new_page(&self, session: &Session) -> BrowserResult<Arc<dyn BrowserPage>> {
        let backend = {
            let mut sessions = self.sessions.lock().await;
            let tracked = sessions
                .get_mut(&session.request_id)
                .ok_or(BrowserError::UnknownSession(session.request_id))?;
            tracked.last_active = Instant::now();
            tracked.backend.clone()
        };

        let page = backend.new_page(&session.context).await?;

        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&session.request_id) {
            Some(tracked) => {
                tracked.pages.push(page.clone());
                tracked.last_active = Instant::now();
                Ok(page)
            }
            None => {
                drop(sessions);
                // Reaped while the page was opening.
                if let Err(e) = page.close().await {
                    debug!("Closing orphaned page: {}", e);
                }
                Err(BrowserError::UnknownSession(session.request_id))
            }
        }
    }

    /// Marks the session as active.
    pub async fn touch(&self, request_id: RequestId) -> BrowserResult<()> {
        let mut sessions = self.sessions.lock().await;
        let tracked =
            sessions.get_mut(&request_id).ok_or(BrowserError::UnknownSession(request_id))?;
        tracked.last_active = Instant::now();
        Ok(())
    }

    /// Closes every page of the session and disposes its context.
    ///
    /// Returns false if the session was not tracked (already released or
    /// reaped).
    pub async fn release(&self, request_id: RequestId) -> bool {
        let removed = self.sessions.lock().await.remove(&request_id);
        match removed {
            Some(session) => {
                close_session(request_id, session).await;
                true
            }
            None => false,
        }
    }

    /// Force-closes sessions idle past the ceiling. Returns how many were closed.
    pub async fn reap_stale(&self) -> usize {
        let now = Instant::now();
        let victims: Vec<_> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<_> = sessions
                .iter()
                .filter(|(_, s)| now.saturating_duration_since(s.last_active) > self.idle_ceiling)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| sessions.remove(&id).map(|s| (id, s))).collect()
        };

        let count = victims.len();
        for (id, session) in victims {
            warn!("Reaping stale session {}", id);
            close_session(id, session).await;
        }
        count
    }

    /// Runs [`reap_stale`](Self::reap_stale) on a fixed interval until the
    /// manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let reaped = manager.reap_stale().await;
                if reaped > 0 {
                    debug!("Reaper closed {} session(s)", reaped);
                }
            }
        })
    }

    /// Closes every session and the browser process.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
        for (id, session) in sessions {
            close_session(id, session).await;
        }

        let shared = self.browser.lock().await.take();
        if let Some(shared) = shared {
            if let Err(e) = shared.backend.shutdown().await {
                warn!("Browser shutdown failed: {}", e);
            }
            info!("Browser closed");
        }
    }
}

async fn close_session(request_id: RequestId, session: TrackedSession) {
    for page in &session.pages {
        if let Err(e) = page.close().await {
            debug!("Closing page of {}: {}", request_id, e);
        }
    }
    if let Err(e) = session.backend.dispose_context(&session.context).await {
        debug!("Disposing context {} of {}: {}", session.context, request_id, e);
    }
    debug!("Session {} closed", request_id);
}
