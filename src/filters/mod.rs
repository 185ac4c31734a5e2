//! Candidate filtering with composable filters, and best-candidate selection.

pub mod title;
pub mod variant;

use crate::tcgplayer::models::ProductCandidate;

pub use title::{normalize_title, ExactTitleFilter};
pub use variant::VariantFilter;

/// Trait for filtering search candidates.
pub trait Filter: Send + Sync {
    /// Returns true if the candidate passes the filter.
    fn matches(&self, candidate: &ProductCandidate) -> bool;

    /// Returns a description of this filter.
    fn description(&self) -> String;
}

/// A chain of filters that must all pass.
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// Creates an empty filter chain.
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    /// Adds a filter to the chain.
    pub fn add(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Checks if a candidate passes all filters.
    pub fn matches(&self, candidate: &ProductCandidate) -> bool {
        self.filters.iter().all(|f| f.matches(candidate))
    }

    /// Filters a collection of candidates, keeping their order.
    pub fn apply(&self, candidates: Vec<ProductCandidate>) -> Vec<ProductCandidate> {
        candidates.into_iter().filter(|c| self.matches(c)).collect()
    }

    /// Returns true if no filters are configured.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns descriptions of all filters.
    pub fn descriptions(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.description()).collect()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the per-request filter chain.
pub struct FilterChainBuilder {
    chain: FilterChain,
}

impl FilterChainBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self { chain: FilterChain::new() }
    }

    /// Drops non-playable variants whose title contains any marker.
    pub fn exclude_variants(mut self, markers: &[String]) -> Self {
        if !markers.is_empty() {
            self.chain.add(VariantFilter::new(markers.iter().cloned()));
        }
        self
    }

    /// Keeps only titles that name exactly this card.
    pub fn exact_title(mut self, card_name: &str) -> Self {
        self.chain.add(ExactTitleFilter::new(card_name));
        self
    }

    /// Builds the filter chain.
    pub fn build(self) -> FilterChain {
        self.chain
    }
}

impl Default for FilterChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the cheapest candidate; ties go to the one listed first.
pub fn select_best(candidates: &[ProductCandidate]) -> Option<&ProductCandidate> {
    candidates.iter().min_by_key(|c| c.price_cents)
}
