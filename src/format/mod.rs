//! Output formatting for card lookups (table, JSON, markdown).

use crate::config::OutputFormat;
use crate::coordinator::{CardInfo, LookupFailure, LookupOutcome};
use crate::legality::Legality;
use crate::tcgplayer::models::{Condition, PriceQuote};
use serde_json::Value;
use std::collections::BTreeMap;

/// Formats lookup outcomes for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a single outcome.
    pub fn format_outcome(&self, outcome: &LookupOutcome) -> String {
        match self.format {
            OutputFormat::Json => self.json_single(outcome),
            OutputFormat::Table => self.table_single(outcome),
            OutputFormat::Markdown => self.markdown_outcomes(std::slice::from_ref(outcome)),
        }
    }

    /// Formats several outcomes, in request order.
    pub fn format_outcomes(&self, outcomes: &[LookupOutcome]) -> String {
        if outcomes.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                _ => "No cards looked up.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => self.json_outcomes(outcomes),
            OutputFormat::Table => self.table_outcomes(outcomes),
            OutputFormat::Markdown => self.markdown_outcomes(outcomes),
        }
    }

    /// Formats a bare legality verdict.
    pub fn format_legality(&self, card_name: &str, legality: Legality) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "card_name": card_name,
                "legality": legality,
            }))
            .unwrap_or_else(|_| "{}".to_string()),
            OutputFormat::Table => format!("{}: {}", card_name, legality),
            OutputFormat::Markdown => format!("- **{}:** {}", card_name, legality),
        }
    }

    // JSON formatting

    fn json_value(outcome: &LookupOutcome) -> Value {
        let value = match outcome {
            Ok(info) => serde_json::to_value(info),
            Err(failure) => serde_json::to_value(failure),
        };
        value.unwrap_or(Value::Null)
    }

    fn json_single(&self, outcome: &LookupOutcome) -> String {
        serde_json::to_string_pretty(&Self::json_value(outcome)).unwrap_or_else(|_| "{}".to_string())
    }

    fn json_outcomes(&self, outcomes: &[LookupOutcome]) -> String {
        let values: Vec<Value> = outcomes.iter().map(Self::json_value).collect();
        serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
    }

    // Table formatting

    fn table_single(&self, outcome: &LookupOutcome) -> String {
        let mut lines = Vec::new();

        match outcome {
            Ok(info) => {
                lines.push(format!("Card:     {}", info.card_name));
                lines.push(format!("Product:  {}", info.product_title));
                lines.push(format!("URL:      {}", info.product_url));
                for condition in Condition::all() {
                    let price = info.prices.get(condition).map(|q| q.price.as_str()).unwrap_or("N/A");
                    lines.push(format!("{:<9} {}", format!("{}:", condition.code().to_uppercase()), price));
                }
                lines.push(format!("Legality: {}", info.legality));
            }
            Err(failure) => {
                lines.push(format!("Card:     {}", failure.card_name));
                lines.push(format!("Error:    {}", failure.reason));
                for (condition, quote) in &failure.prices {
                    lines.push(format!(
                        "{:<9} {} (partial)",
                        format!("{}:", condition.code().to_uppercase()),
                        quote.price
                    ));
                }
                lines.push(format!("Legality: {}", failure.legality));
            }
        }

        lines.join("\n")
    }

    fn table_outcomes(&self, outcomes: &[LookupOutcome]) -> String {
        let card_width = 32;
        let price_width = 10;
        let legality_width = 10;

        let mut lines = Vec::new();

        lines.push(format!(
            "{:<card_width$}  {:>price_width$}  {:>price_width$}  {:<legality_width$}  {}",
            "Card", "NM", "LP", "Legality", "Notes"
        ));
        lines.push(format!(
            "{:-<card_width$}  {:-<price_width$}  {:-<price_width$}  {:-<legality_width$}  {:-<20}",
            "", "", "", "", ""
        ));

        let mut failures = 0;
        for outcome in outcomes {
            let (name, prices, legality, notes) = match outcome {
                Ok(info) => (&info.card_name, &info.prices, info.legality, String::new()),
                Err(failure) => {
                    failures += 1;
                    (&failure.card_name, &failure.prices, failure.legality, failure.reason.clone())
                }
            };

            lines.push(format!(
                "{:<card_width$}  {:>price_width$}  {:>price_width$}  {:<legality_width$}  {}",
                truncate(name, card_width),
                price_cell(prices, Condition::NearMint),
                price_cell(prices, Condition::LightlyPlayed),
                legality.to_string(),
                notes
            ));
        }

        lines.push(String::new());
        if failures > 0 {
            lines.push(format!("Total: {} cards ({} failed)", outcomes.len(), failures));
        } else {
            lines.push(format!("Total: {} cards", outcomes.len()));
        }

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_outcomes(&self, outcomes: &[LookupOutcome]) -> String {
        let mut lines = Vec::new();

        lines.push("| Card | Near Mint | Lightly Played | Legality |".to_string());
        lines.push("|------|-----------|----------------|----------|".to_string());

        for outcome in outcomes {
            match outcome {
                Ok(info) => lines.push(markdown_row(info)),
                Err(failure) => lines.push(markdown_failure_row(failure)),
            }
        }

        lines.push(String::new());
        lines.push(format!("*{} cards looked up*", outcomes.len()));

        lines.join("\n")
    }
}

fn price_cell(prices: &BTreeMap<Condition, PriceQuote>, condition: Condition) -> String {
    prices.get(&condition).map(|q| q.price.clone()).unwrap_or_else(|| "N/A".to_string())
}

fn markdown_price(prices: &BTreeMap<Condition, PriceQuote>, condition: Condition) -> String {
    match prices.get(&condition) {
        Some(quote) => format!("[{}]({})", quote.price, quote.url),
        None => "N/A".to_string(),
    }
}

fn markdown_row(info: &CardInfo) -> String {
    format!(
        "| [{}]({}) | {} | {} | {} |",
        info.card_name,
        info.product_url,
        markdown_price(&info.prices, Condition::NearMint),
        markdown_price(&info.prices, Condition::LightlyPlayed),
        info.legality
    )
}

fn markdown_failure_row(failure: &LookupFailure) -> String {
    format!(
        "| {} ⚠ {} | {} | {} | {} |",
        failure.card_name,
        failure.reason,
        markdown_price(&failure.prices, Condition::NearMint),
        markdown_price(&failure.prices, Condition::LightlyPlayed),
        failure.legality
    )
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width - 3).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}
