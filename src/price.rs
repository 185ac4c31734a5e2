//! Price normalization: raw listing text to integer cents and back.
//!
//! Everything here is pure and total. Malformed text becomes zero cents
//! rather than an error, since a listing with an unreadable price is simply
//! not a useful price.

/// Amount of money in US cents.
pub type Cents = u64;

/// Parses a price like `"$1,234.56"` into cents.
///
/// Every character other than ASCII digits and `.` is dropped before parsing,
/// so currency symbols, thousands separators and surrounding words are
/// ignored. Empty or malformed input yields `0`.
pub fn parse_price(text: &str) -> Cents {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();

    if cleaned.is_empty() {
        return 0;
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * 100.0).round() as Cents,
        _ => 0,
    }
}

/// Shipping cost of a listing in cents.
///
/// Missing shipping text and anything mentioning "free" count as zero.
pub fn shipping_cents(shipping: Option<&str>) -> Cents {
    match shipping {
        None => 0,
        Some(text) if text.trim().is_empty() => 0,
        Some(text) if text.to_lowercase().contains("free") => 0,
        Some(text) => parse_price(text),
    }
}

/// Formats cents as `"$X.XX"`.
pub fn format_cents(cents: Cents) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Sums base price and shipping and formats the total.
pub fn format_total(base: Cents, shipping: Cents) -> String {
    format_cents(base.saturating_add(shipping))
}
