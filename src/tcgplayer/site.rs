//! Store URLs: search pages, condition-filtered product pages, link resolution.

use super::models::Condition;

/// Default store origin.
pub const DEFAULT_BASE_URL: &str = "https://www.tcgplayer.com";

/// Default product line searched.
pub const DEFAULT_PRODUCT_LINE: &str = "magic";

/// URL builder for one store origin and product line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    base_url: String,
    product_line: String,
}

impl Site {
    /// Creates a site for the given origin, e.g. `https://www.tcgplayer.com`.
    pub fn new(base_url: impl Into<String>, product_line: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, product_line: product_line.into() }
    }

    /// Returns the store origin without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search results view for a card name.
    pub fn search_url(&self, card_name: &str) -> String {
        format!(
            "{}/search/{}/product?productLineName={}&q={}&view=grid",
            self.base_url,
            self.product_line,
            self.product_line,
            urlencoding::encode(card_name.trim())
        )
    }

    /// Product page filtered to a single condition.
    ///
    /// Any query string or fragment already on `product_url` is dropped so
    /// the filter always applies to the base product page.
    pub fn condition_url(&self, product_url: &str, condition: Condition) -> String {
        format!(
            "{}?Condition={}&Language=English",
            strip_query(product_url),
            urlencoding::encode(condition.label())
        )
    }

    /// Turns a relative `href` from the page into an absolute URL.
    pub fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Some(rest) = href.strip_prefix("//") {
            format!("https://{}", rest)
        } else if href.starts_with('/') {
            format!("{}{}", self.base_url, href)
        } else {
            format!("{}/{}", self.base_url, href)
        }
    }
}

impl Default for Site {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_PRODUCT_LINE)
    }
}

/// Drops the query string and fragment from a URL.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url() {
        let site = Site::default();
        assert_eq!(
            site.search_url("Drannith Magistrate"),
            "https://www.tcgplayer.com/search/magic/product?productLineName=magic&q=Drannith%20Magistrate&view=grid"
        );
    }

    #[test]
    fn test_search_url_encodes_punctuation() {
        let site = Site::default();
        let url = site.search_url("Jace, the Mind Sculptor");
        assert!(url.contains("q=Jace%2C%20the%20Mind%20Sculptor"));
    }

    #[test]
    fn test_condition_url_strips_existing_query() {
        let site = Site::default();
        let url = site.condition_url(
            "https://www.tcgplayer.com/product/230090/drannith-magistrate?page=1&Language=all#listings",
            Condition::NearMint,
        );
        assert_eq!(
            url,
            "https://www.tcgplayer.com/product/230090/drannith-magistrate?Condition=Near%20Mint&Language=English"
        );
    }

    #[test]
    fn test_condition_url_lightly_played() {
        let site = Site::default();
        let url = site.condition_url("https://www.tcgplayer.com/product/1/x", Condition::LightlyPlayed);
        assert!(url.ends_with("?Condition=Lightly%20Played&Language=English"));
    }

    #[test]
    fn test_absolutize() {
        let site = Site::new("https://mock.test/", "magic");
        assert_eq!(site.base_url(), "https://mock.test");
        assert_eq!(site.absolutize("/product/1/x"), "https://mock.test/product/1/x");
        assert_eq!(site.absolutize("product/1/x"), "https://mock.test/product/1/x");
        assert_eq!(site.absolutize("//cdn.test/a.png"), "https://cdn.test/a.png");
        assert_eq!(site.absolutize("https://other.test/p"), "https://other.test/p");
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("https://a.test/p?x=1"), "https://a.test/p");
        assert_eq!(strip_query("https://a.test/p#frag"), "https://a.test/p");
        assert_eq!(strip_query("https://a.test/p"), "https://a.test/p");
    }
}
