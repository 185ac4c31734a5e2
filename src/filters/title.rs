//! Exact-match title filtering.
//!
//! A product title names a card when, after normalization, it equals the
//! card name or contains it as a whole delimited token: the card name must
//! be bounded on each side by the start or end of the title or by a
//! separator such as a bracket or a dash. Matching inside a longer name
//! ("Magistrate" in "Drannith Magistrate") never counts.

use super::Filter;
use crate::tcgplayer::models::ProductCandidate;

/// Characters that end a card name inside a longer product title.
const DELIMITERS: &[char] = &['(', ')', '[', ']', '{', '}', '-', '–', '—', '|', ':'];

/// Lowercases, unifies quotes and collapses whitespace.
pub fn normalize_title(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when `title` names exactly `query`. Both must already be normalized.
pub fn title_matches(title: &str, query: &str) -> bool {
    if query.is_empty() {
        return false;
    }
    if title == query {
        return true;
    }

    title.match_indices(query).any(|(start, _)| {
        let before = title[..start].chars().rev().find(|c| !c.is_whitespace());
        let after = title[start + query.len()..].chars().find(|c| !c.is_whitespace());
        before.map_or(true, is_delimiter) && after.map_or(true, is_delimiter)
    })
}

fn is_delimiter(c: char) -> bool {
    DELIMITERS.contains(&c)
}

/// Keeps candidates whose title names the queried card.
pub struct ExactTitleFilter {
    query: String,
}

impl ExactTitleFilter {
    /// Creates a filter for a raw card name.
    pub fn new(card_name: &str) -> Self {
        Self { query: normalize_title(card_name) }
    }
}

impl Filter for ExactTitleFilter {
    fn matches(&self, candidate: &ProductCandidate) -> bool {
        title_matches(&normalize_title(&candidate.title), &self.query)
    }

    fn description(&self) -> String {
        format!("Title names: {}", self.query)
    }
}
