//! Scraping: rate-limit guard and the per-card pipeline.

pub mod guard;
pub mod pipeline;

pub use guard::RateLimitGuard;
pub use pipeline::{PipelineSettings, PriceScraper, ScrapePipeline};
