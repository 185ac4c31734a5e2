//! TCGplayer storefront: URLs, data models, selectors and HTML parsing.

pub mod models;
pub mod parser;
pub mod selectors;
pub mod site;

pub use models::{Condition, ConditionListing, PriceQuote, PriceReport, ProductCandidate};
pub use parser::Parser;
pub use site::Site;
