//! CSS selectors for TCGplayer HTML parsing.
//!
//! Every selector the scraper depends on lives here. When the store changes
//! its markup, capture a rendered page, update the selectors and refresh the
//! fixtures under `tests/fixtures/`.

use scraper::Selector;
use std::sync::LazyLock;

/// Selectors for the search results grid.
pub mod search {
    use super::*;

    /// One product tile in the results grid.
    pub static RESULT: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(".search-result").unwrap());

    /// Product title on a tile.
    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".product-card__title, \
             .search-result__title",
        )
        .unwrap()
    });

    /// Link to the product page.
    pub static LINK: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "a[href*='/product/'], \
             a.product-card__link",
        )
        .unwrap()
    });

    /// Lowest listed price on a tile.
    pub static PRICE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".inventory__price-with-shipping, \
             .product-card__market-price--value, \
             .search-result__market-price--value",
        )
        .unwrap()
    });

    /// "No results" banner; its presence means the grid finished rendering.
    pub static NO_RESULTS: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".blank-slate, \
             .search-results__no-results",
        )
        .unwrap()
    });
}

/// Selectors for the listings on a product page.
pub mod product {
    use super::*;

    /// One seller listing row.
    pub static LISTING: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".listing-item, \
             section.product-listing",
        )
        .unwrap()
    });

    /// Base price of a listing.
    pub static LISTING_PRICE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".listing-item__listing-data__info__price, \
             .product-listing__price",
        )
        .unwrap()
    });

    /// Shipping text of a listing ("+ $1.69 Shipping", "Free Shipping").
    pub static LISTING_SHIPPING: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".shipping-messages__price, \
             .listing-item__listing-data__info__shipping, \
             .product-listing__shipping",
        )
        .unwrap()
    });

    /// Condition label of a listing.
    pub static LISTING_CONDITION: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".listing-item__listing-data__info__condition, \
             .product-listing__condition",
        )
        .unwrap()
    });
}

/// Markers for error, block and rate-limit pages.
pub mod errors {
    use super::*;

    /// Path fragment of the store's generic error page.
    pub const BLOCKED_URL_PATTERN: &str = "/uhoh";

    /// Visible text fragments that mean the page is an error or a block.
    pub const TEXT_FRAGMENTS: &[&str] = &[
        "too many requests",
        "you have been rate limited",
        "there was a problem loading",
        "access denied",
        "uh oh! something went wrong",
    ];

    /// Elements whose text never counts as visible.
    pub const HIDDEN: &[&str] = &["script", "style", "noscript", "template"];

    /// Body element, used to extract visible text.
    pub static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
}
