//! HTML parser for rendered TCGplayer search and product pages.
//!
//! The browser hands back the live DOM serialized as HTML; everything below
//! works on that snapshot with `scraper`, so parsing never touches the page.

use crate::error::ScrapeError;
use crate::price;
use crate::tcgplayer::models::{Condition, ConditionListing, ProductCandidate};
use crate::tcgplayer::selectors::{errors, product, search};
use crate::tcgplayer::site::Site;
use scraper::{ElementRef, Html};
use tracing::{debug, trace, warn};

/// Parser for TCGplayer HTML snapshots.
pub struct Parser {
    site: Site,
}

impl Parser {
    /// Creates a parser resolving relative links against `site`.
    pub fn new(site: Site) -> Self {
        Self { site }
    }

    /// Parses every product tile on a search results page.
    ///
    /// Tiles without a title, link or readable price are skipped.
    pub fn parse_search(&self, html: &str) -> Vec<ProductCandidate> {
        let document = Html::parse_document(html);
        let mut candidates = Vec::new();

        for element in document.select(&search::RESULT) {
            match self.parse_result_tile(element) {
                Ok(candidate) => {
                    trace!("Parsed candidate: {} - {}", candidate.title, candidate.price_cents);
                    candidates.push(candidate);
                }
                Err(reason) => {
                    debug!("Skipping search tile: {}", reason);
                }
            }
        }

        debug!("Parsed {} candidates from search page", candidates.len());
        candidates
    }

    /// True once the results grid has rendered, with or without results.
    pub fn search_rendered(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        document.select(&search::RESULT).next().is_some()
            || document.select(&search::NO_RESULTS).next().is_some()
    }

    /// Number of listing rows on a product page.
    pub fn count_listings(&self, html: &str) -> usize {
        Html::parse_document(html).select(&product::LISTING).count()
    }

    /// Extracts the first listing for `condition` from a product page.
    ///
    /// Rows whose condition label names a different condition are skipped;
    /// rows without a label are taken as already filtered by the page URL.
    pub fn parse_first_listing(
        &self,
        html: &str,
        condition: Condition,
        page_url: &str,
    ) -> Result<ConditionListing, ScrapeError> {
        let document = Html::parse_document(html);
        let wanted = condition.label().to_lowercase();

        let row = document
            .select(&product::LISTING)
            .find(|row| {
                row.select(&product::LISTING_CONDITION)
                    .next()
                    .map_or(true, |label| element_text(label).to_lowercase().contains(&wanted))
            })
            .ok_or(ScrapeError::NoListingFound(condition))?;

        let price_text = row
            .select(&product::LISTING_PRICE)
            .next()
            .map(element_text)
            .ok_or_else(|| ScrapeError::extraction(page_url, "listing has no price element"))?;

        let base_price_cents = price::parse_price(&price_text);
        if base_price_cents == 0 {
            warn!("Unreadable listing price '{}' at {}", price_text, page_url);
            return Err(ScrapeError::extraction(
                page_url,
                format!("unreadable listing price '{}'", price_text),
            ));
        }

        let shipping_text = row.select(&product::LISTING_SHIPPING).next().map(element_text);
        let shipping_cents = price::shipping_cents(shipping_text.as_deref());

        Ok(ConditionListing {
            condition,
            base_price_cents,
            shipping_cents,
            listing_url: page_url.to_string(),
        })
    }

    /// Parses a single search result tile.
    fn parse_result_tile(&self, element: ElementRef) -> Result<ProductCandidate, String> {
        let title = element
            .select(&search::TITLE)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .ok_or("missing title")?;

        let product_url = element
            .select(&search::LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| self.site.absolutize(href))
            .ok_or_else(|| format!("missing product link for '{}'", title))?;

        let price_text = element
            .select(&search::PRICE)
            .next()
            .map(element_text)
            .ok_or_else(|| format!("missing price for '{}'", title))?;

        let price_cents = price::parse_price(&price_text);
        if price_cents == 0 {
            return Err(format!("unreadable price '{}' for '{}'", price_text, title));
        }

        Ok(ProductCandidate { title, price_cents, product_url })
    }
}

/// Collapsed text content of an element.
fn element_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text a visitor would see in the page body, lowercased.
///
/// Script, style and template contents are excluded so that error strings
/// embedded in bundled JavaScript do not count as a rendered error.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(body) = document.select(&errors::BODY).next() else {
        return String::new();
    };

    let mut out = String::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .ancestors()
            .filter_map(|a| a.value().as_element())
            .any(|e| errors::HIDDEN.contains(&e.name()));

        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }

    out.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> Parser {
        Parser::new(Site::new("https://mock.test", "magic"))
    }

    fn tile(title: &str, href: &str, price: &str) -> String {
        format!(
            r#"<div class="search-result">
                <a href="{}"><span class="product-card__title">{}</span></a>
                <span class="inventory__price-with-shipping">{}</span>
            </div>"#,
            href, title, price
        )
    }

    #[test]
    fn test_parse_search_tiles() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            tile("Drannith Magistrate", "/product/1/drannith", "$14.99"),
            tile("Drannith Magistrate (Showcase)", "/product/2/drannith-showcase", "$19.50"),
        );

        let candidates = parser().parse_search(&html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Drannith Magistrate");
        assert_eq!(candidates[0].price_cents, 1499);
        assert_eq!(candidates[0].product_url, "https://mock.test/product/1/drannith");
        assert_eq!(candidates[1].price_cents, 1950);
    }

    #[test]
    fn test_parse_search_skips_incomplete_tiles() {
        let html = format!(
            r#"<html><body>
                {}
                <div class="search-result"><span class="product-card__title">No Link</span>
                    <span class="inventory__price-with-shipping">$1.00</span></div>
                {}
            </body></html>"#,
            tile("No Price", "/product/3/x", "Out of stock"),
            tile("Good", "/product/4/good", "$2.00"),
        );

        let candidates = parser().parse_search(&html);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Good");
    }

    #[test]
    fn test_search_rendered() {
        let p = parser();
        assert!(!p.search_rendered("<html><body><div id='app'></div></body></html>"));
        assert!(p.search_rendered(r#"<html><body><div class="blank-slate">No results</div></body></html>"#));
        assert!(p.search_rendered(&tile("A", "/product/1/a", "$1.00")));
    }

    #[test]
    fn test_parse_first_listing() {
        let html = r#"<html><body>
            <section class="listing-item">
                <div class="listing-item__listing-data__info__condition">Lightly Played</div>
                <div class="listing-item__listing-data__info__price">$15.59</div>
                <div class="shipping-messages__price">+ $1.69 Shipping</div>
            </section>
            <section class="listing-item">
                <div class="listing-item__listing-data__info__condition">Lightly Played</div>
                <div class="listing-item__listing-data__info__price">$16.00</div>
            </section>
        </body></html>"#;

        let listing = parser()
            .parse_first_listing(html, Condition::LightlyPlayed, "https://mock.test/product/1?Condition=LP")
            .unwrap();
        assert_eq!(listing.base_price_cents, 1559);
        assert_eq!(listing.shipping_cents, 169);
        assert_eq!(listing.display_price(), "$17.28");
        assert_eq!(listing.listing_url, "https://mock.test/product/1?Condition=LP");
    }

    #[test]
    fn test_parse_first_listing_free_shipping_and_no_label() {
        let html = r#"<html><body>
            <section class="listing-item">
                <div class="listing-item__listing-data__info__price">$15.94</div>
                <div class="shipping-messages__price">Free Shipping on Orders Over $5</div>
            </section>
        </body></html>"#;

        let listing =
            parser().parse_first_listing(html, Condition::NearMint, "https://mock.test/p").unwrap();
        assert_eq!(listing.total_cents(), 1594);
        assert_eq!(listing.shipping_cents, 0);
    }

    #[test]
    fn test_parse_first_listing_skips_other_conditions() {
        let html = r#"<html><body>
            <section class="listing-item">
                <div class="listing-item__listing-data__info__condition">Lightly Played</div>
                <div class="listing-item__listing-data__info__price">$3.00</div>
            </section>
            <section class="listing-item">
                <div class="listing-item__listing-data__info__condition">Near Mint Foil</div>
                <div class="listing-item__listing-data__info__price">$9.00</div>
            </section>
        </body></html>"#;

        let listing =
            parser().parse_first_listing(html, Condition::NearMint, "https://mock.test/p").unwrap();
        assert_eq!(listing.base_price_cents, 900);
    }

    #[test]
    fn test_parse_first_listing_missing() {
        let err = parser()
            .parse_first_listing("<html><body></body></html>", Condition::NearMint, "https://mock.test/p")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NoListingFound(Condition::NearMint)));
    }

    #[test]
    fn test_parse_first_listing_unexpected_shape() {
        let html = r#"<html><body><section class="listing-item"><div>Seller</div></section></body></html>"#;
        let err =
            parser().parse_first_listing(html, Condition::NearMint, "https://mock.test/p").unwrap_err();
        assert!(matches!(err, ScrapeError::ExtractionError { .. }));

        let html = r#"<html><body><section class="listing-item">
            <div class="listing-item__listing-data__info__price">Call for price</div>
        </section></body></html>"#;
        let err =
            parser().parse_first_listing(html, Condition::NearMint, "https://mock.test/p").unwrap_err();
        assert!(err.to_string().contains("unreadable listing price"));
    }

    #[test]
    fn test_count_listings() {
        let html = r#"<html><body>
            <section class="listing-item"></section>
            <section class="listing-item"></section>
        </body></html>"#;
        assert_eq!(parser().count_listings(html), 2);
        assert_eq!(parser().count_listings("<html></html>"), 0);
    }

    #[test]
    fn test_visible_text_ignores_scripts() {
        let html = r#"<html><head><title>Store</title></head><body>
            <script>var msg = "Too Many Requests";</script>
            <h1>Welcome</h1>
            <style>.x { content: "access denied"; }</style>
        </body></html>"#;

        let text = visible_text(html);
        assert!(text.contains("welcome"));
        assert!(!text.contains("too many requests"));
        assert!(!text.contains("access denied"));
    }

    #[test]
    fn test_element_text_collapses_whitespace() {
        let document = Html::parse_fragment("<p>  Drannith \n  <b>Magistrate</b>  </p>");
        let p = document.select(&scraper::Selector::parse("p").unwrap()).next().unwrap();
        assert_eq!(element_text(p), "Drannith Magistrate");
    }
}
