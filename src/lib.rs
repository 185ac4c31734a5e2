//! tcg-pricer - Trading-card price lookups through a headless browser
//!
//! One shared Chromium serves every lookup, each in its own isolated
//! browsing context. Lookups for the same card are deduplicated and cached
//! by the [`Coordinator`].

pub mod browser;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod filters;
pub mod format;
pub mod legality;
pub mod price;
pub mod request;
pub mod scrape;
pub mod tcgplayer;

pub use config::Config;
pub use coordinator::{CardInfo, Coordinator, LookupFailure, LookupOutcome};
pub use error::{BrowserError, ScrapeError};
pub use legality::Legality;
pub use tcgplayer::models::{Condition, PriceQuote};
