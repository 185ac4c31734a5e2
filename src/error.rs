//! Error types for the browser layer and the scrape pipeline.

use crate::request::RequestId;
use crate::tcgplayer::models::{Condition, ConditionListing};
use thiserror::Error;

/// Result alias for browser operations.
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Failures of the shared browser, its contexts and pages.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser disconnected")]
    Disconnected,

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("no browsing session for {0}")]
    UnknownSession(RequestId),

    #[error("{0} already owns a browsing session")]
    SessionExists(RequestId),
}

impl BrowserError {
    /// Creates a protocol error from any displayable CDP failure.
    pub fn protocol(err: impl std::fmt::Display) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Everything that can go wrong while scraping one card.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A page could not be reached, even after one guarded retry.
    #[error("navigation failed for {url}: {message}")]
    NavigationFailure { url: String, message: String },

    /// Search produced no playable exact-match product.
    #[error("no product found for '{0}'")]
    NoMatchFound(String),

    /// A condition never rendered a listing.
    #[error("no {0} listing rendered")]
    NoListingFound(Condition),

    /// The store kept serving its block page after backoff and reload.
    #[error("rate limited at {0}")]
    RateLimited(String),

    /// The page rendered but not in the shape the parser expects.
    #[error("unexpected page structure at {url}: {message}")]
    ExtractionError { url: String, message: String },

    /// The product resolved but none of its conditions did.
    #[error("no valid prices for '{0}'")]
    NoValidPrices(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl ScrapeError {
    pub fn navigation(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::NavigationFailure { url: url.into(), message: message.to_string() }
    }

    pub fn extraction(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ExtractionError { url: url.into(), message: message.to_string() }
    }

    /// Whether the error ends the whole request rather than one step.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScrapeError::NoListingFound(_) | ScrapeError::ExtractionError { .. })
    }
}

/// A failed scrape together with whatever listings resolved before it failed.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ScrapeFailure {
    pub error: ScrapeError,
    pub partial: Vec<ConditionListing>,
}

impl ScrapeFailure {
    pub fn with_partial(error: ScrapeError, partial: Vec<ConditionListing>) -> Self {
        Self { error, partial }
    }
}

impl From<ScrapeError> for ScrapeFailure {
    fn from(error: ScrapeError) -> Self {
        Self { error, partial: Vec::new() }
    }
}

impl From<BrowserError> for ScrapeFailure {
    fn from(error: BrowserError) -> Self {
        ScrapeError::from(error).into()
    }
}
