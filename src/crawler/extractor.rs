//! HTML extraction for the catalog layout
//!
//! Listing pages yield item links and an optional next-page link; detail
//! pages yield an [`ExtractedItem`]. Relative links are resolved against the
//! URL of the page they appear on.

use crate::ingest::ExtractedItem;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Markup did not have the expected shape
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Missing {field} on {url}")]
    MissingField { url: String, field: &'static str },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid CSS selector {0}")]
    InvalidSelector(String),
}

impl ExtractError {
    pub(crate) fn invalid_url(url: &str, err: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Links found on one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Absolute URLs of item detail pages, in page order
    pub item_links: Vec<String>,
    /// Absolute URL of the following listing page
    pub next_page: Option<String>,
}

/// Turns raw markup into links and item fields
pub trait Extractor: Send + Sync {
    fn extract_listing(&self, html: &str, page_url: &Url) -> Result<ListingPage, ExtractError>;

    fn extract_item(&self, html: &str, page_url: &Url) -> Result<ExtractedItem, ExtractError>;
}

/// Extractor for books.toscrape.com style catalogs
pub struct CatalogExtractor {
    item_link: Selector,
    next_link: Selector,
    title: Selector,
    description: Selector,
    breadcrumb: Selector,
    table_row: Selector,
    th: Selector,
    td: Selector,
    images: Vec<Selector>,
    rating: Selector,
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector(format!("{}: {:?}", css, e)))
}

impl CatalogExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            item_link: selector("article.product_pod h3 a")?,
            next_link: selector("li.next a")?,
            title: selector("div.product_main h1")?,
            description: selector("#product_description ~ p")?,
            breadcrumb: selector("ul.breadcrumb li a")?,
            table_row: selector("table.table tr")?,
            th: selector("th")?,
            td: selector("td")?,
            images: vec![
                selector("div.carousel-inner img")?,
                selector("div.item img")?,
                selector("img")?,
            ],
            rating: selector("p.star-rating")?,
        })
    }

    fn product_table(&self, document: &Html) -> HashMap<String, String> {
        document
            .select(&self.table_row)
            .filter_map(|row| {
                let key = row.select(&self.th).next().map(element_text)?;
                let value = row.select(&self.td).next().map(element_text)?;
                Some((key, value))
            })
            .collect()
    }

    fn image_url(&self, document: &Html, page_url: &Url) -> Option<String> {
        self.images.iter().find_map(|sel| {
            document
                .select(sel)
                .filter_map(|img| img.value().attr("src"))
                .find_map(|src| resolve(src, page_url))
        })
    }
}

impl Extractor for CatalogExtractor {
    fn extract_listing(&self, html: &str, page_url: &Url) -> Result<ListingPage, ExtractError> {
        let document = Html::parse_document(html);

        let item_links = document
            .select(&self.item_link)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| resolve(href, page_url))
            .collect();

        let next_page = document
            .select(&self.next_link)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| resolve(href, page_url));

        Ok(ListingPage {
            item_links,
            next_page,
        })
    }

    fn extract_item(&self, html: &str, page_url: &Url) -> Result<ExtractedItem, ExtractError> {
        let document = Html::parse_document(html);

        let name = document
            .select(&self.title)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExtractError::MissingField {
                url: page_url.to_string(),
                field: "name",
            })?;

        // Some items have no description block
        let description = document
            .select(&self.description)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty());

        // Home > Books > Category > Item: the category is the last link
        let crumbs: Vec<_> = document.select(&self.breadcrumb).map(element_text).collect();
        let category = if crumbs.len() >= 3 {
            crumbs.last().cloned()
        } else {
            None
        };

        let table = self.product_table(&document);
        let price_excl_tax = table
            .get("Price (excl. tax)")
            .map(|s| parse_price(s))
            .unwrap_or(0.0);
        let price_incl_tax = table
            .get("Price (incl. tax)")
            .map(|s| parse_price(s))
            .unwrap_or(0.0);
        let availability = table.get("Availability").cloned();
        let review_count = table
            .get("Number of reviews")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let rating = document
            .select(&self.rating)
            .next()
            .and_then(|p| p.value().attr("class"))
            .map(rating_from_class)
            .unwrap_or(0);

        Ok(ExtractedItem {
            name,
            description,
            category,
            price_excl_tax,
            price_incl_tax,
            availability,
            review_count,
            image_url: self.image_url(&document, page_url),
            rating,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Resolves `href` against the page it was found on; only HTTP(S) survives
fn resolve(href: &str, page_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let url = page_url.join(href).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

/// "£51.77" → 51.77; anything unparsable is 0
fn parse_price(text: &str) -> f64 {
    let numeric: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse().unwrap_or(0.0)
}

/// "star-rating Three" → 3
fn rating_from_class(class: &str) -> u8 {
    class
        .split_whitespace()
        .find_map(|word| match word {
            "One" => Some(1),
            "Two" => Some(2),
            "Three" => Some(3),
            "Four" => Some(4),
            "Five" => Some(5),
            _ => None,
        })
        .unwrap_or(0)
}
