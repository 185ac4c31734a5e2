//! Request filtering applied to every page.
//!
//! Nested-frame documents (ads, trackers, consent widgets) are aborted, as is
//! any navigation to the store's error page. Everything else, including
//! redirects, continues untouched.

/// A paused request as seen by the filter.
#[derive(Debug, Clone, Copy)]
pub struct InterceptedRequest<'a> {
    pub url: &'a str,
    /// The request loads a document rather than a subresource.
    pub is_document: bool,
    /// The request belongs to the page's top-level frame.
    pub in_main_frame: bool,
}

/// What to do with a paused request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Abort,
}

/// Decides which requests a page may make.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    blocked_url_pattern: String,
}

impl RequestFilter {
    pub fn new(blocked_url_pattern: impl Into<String>) -> Self {
        Self { blocked_url_pattern: blocked_url_pattern.into() }
    }

    pub fn verdict(&self, request: &InterceptedRequest<'_>) -> Verdict {
        if !request.is_document {
            return Verdict::Continue;
        }
        if !request.in_main_frame {
            return Verdict::Abort;
        }
        if !self.blocked_url_pattern.is_empty() && request.url.contains(&self.blocked_url_pattern) {
            return Verdict::Abort;
        }
        Verdict::Continue
    }
}
