//! Data models for store products, condition listings and price reports.

use crate::price::{self, Cents};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Physical grade of a card. Each condition carries its own listings.
///
/// Variant order is display order: Near Mint sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "Near Mint")]
    NearMint,
    #[serde(rename = "Lightly Played")]
    LightlyPlayed,
}

impl Condition {
    /// Returns all supported conditions in display order.
    pub fn all() -> &'static [Condition] {
        &[Condition::NearMint, Condition::LightlyPlayed]
    }

    /// Label used by the store in its condition filter and listing rows.
    pub fn label(&self) -> &'static str {
        match self {
            Condition::NearMint => "Near Mint",
            Condition::LightlyPlayed => "Lightly Played",
        }
    }

    /// Short code used on the command line.
    pub fn code(&self) -> &'static str {
        match self {
            Condition::NearMint => "nm",
            Condition::LightlyPlayed => "lp",
        }
    }
}

impl std::str::FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String =
            s.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_lowercase();

        match normalized.as_str() {
            "nm" | "nearmint" => Ok(Condition::NearMint),
            "lp" | "lightlyplayed" => Ok(Condition::LightlyPlayed),
            _ => Err(format!("Unknown condition: {}. Use: nm, lp", s)),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One product entry from the search results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCandidate {
    /// Product title as rendered on the card tile
    pub title: String,
    /// Lowest listed price shown on the tile
    pub price_cents: Cents,
    /// Absolute product page URL
    pub product_url: String,
}

impl ProductCandidate {
    /// Creates a new candidate.
    pub fn new(title: impl Into<String>, price_cents: Cents, product_url: impl Into<String>) -> Self {
        Self { title: title.into(), price_cents, product_url: product_url.into() }
    }
}

/// First listing found for one condition of the selected product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionListing {
    pub condition: Condition,
    pub base_price_cents: Cents,
    pub shipping_cents: Cents,
    /// Condition-filtered product page the listing was read from
    pub listing_url: String,
}

impl ConditionListing {
    /// Base price plus shipping.
    pub fn total_cents(&self) -> Cents {
        self.base_price_cents.saturating_add(self.shipping_cents)
    }

    /// Total formatted for display, e.g. `"$17.28"`.
    pub fn display_price(&self) -> String {
        price::format_total(self.base_price_cents, self.shipping_cents)
    }

    /// Converts into the public per-condition quote.
    pub fn quote(&self) -> PriceQuote {
        PriceQuote { price: self.display_price(), url: self.listing_url.clone() }
    }
}

/// Display price and source URL for one condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: String,
    pub url: String,
}

/// Outcome of a successful scrape: the chosen product and its listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReport {
    /// Card name as requested
    pub card_name: String,
    /// Product chosen from the search results
    pub product: ProductCandidate,
    /// Resolved listings, at most one per condition
    pub listings: Vec<ConditionListing>,
}

impl PriceReport {
    /// Per-condition quotes keyed by condition.
    pub fn prices(&self) -> BTreeMap<Condition, PriceQuote> {
        quotes(&self.listings)
    }

    /// Returns the listing for a condition, if one was resolved.
    pub fn listing(&self, condition: Condition) -> Option<&ConditionListing> {
        self.listings.iter().find(|l| l.condition == condition)
    }
}

/// Builds the per-condition quote map from resolved listings.
pub fn quotes(listings: &[ConditionListing]) -> BTreeMap<Condition, PriceQuote> {
    listings.iter().map(|l| (l.condition, l.quote())).collect()
}
