//! Excludes non-playable product variants by title marker.

use super::Filter;
use crate::tcgplayer::models::ProductCandidate;

/// Default markers for art prints, proxies and playtest cards.
pub const DEFAULT_MARKERS: &[&str] = &[
    "art card",
    "art series",
    "art print",
    "extended art",
    "proxy",
    "playtest",
    "oversized",
];

/// Rejects candidates whose title contains any of the markers.
pub struct VariantFilter {
    markers: Vec<String>,
}

impl VariantFilter {
    /// Creates a filter from case-insensitive markers.
    pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl Filter for VariantFilter {
    fn matches(&self, candidate: &ProductCandidate) -> bool {
        let title = candidate.title.to_lowercase();
        !self.markers.iter().any(|marker| title.contains(marker))
    }

    fn description(&self) -> String {
        format!("Exclude variants: {}", self.markers.join(", "))
    }
}
