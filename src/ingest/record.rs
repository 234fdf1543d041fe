//! Item records and their content hash

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;

/// Fields extracted from one item detail page
///
/// Everything here takes part in the content hash; identity and crawl
/// metadata live on [`ItemRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_excl_tax: f64,
    pub price_incl_tax: f64,
    pub availability: Option<String>,
    pub review_count: u32,
    pub image_url: Option<String>,
    /// Star rating, 0 when the page shows none
    pub rating: u8,
}

/// Processing status of a stored item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Ok,
}

impl ItemStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A freshly crawled item, keyed by its source URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub source_url: String,
    #[serde(flatten)]
    pub fields: ExtractedItem,
    pub content_hash: String,
    pub crawl_timestamp: DateTime<Utc>,
    pub status: ItemStatus,
    #[serde(skip)]
    pub raw_html: Option<String>,
}

impl ItemRecord {
    /// Builds a record and derives its content hash from `fields`
    pub fn new(
        source_url: impl Into<String>,
        fields: ExtractedItem,
        crawl_timestamp: DateTime<Utc>,
    ) -> Self {
        let content_hash = content_hash(&fields);
        Self {
            source_url: source_url.into(),
            fields,
            content_hash,
            crawl_timestamp,
            status: ItemStatus::Ok,
            raw_html: None,
        }
    }

    /// Attaches the markup the record was extracted from
    ///
    /// The markup is stored as-is and does not affect the content hash.
    pub fn with_raw_html(mut self, html: impl Into<String>) -> Self {
        self.raw_html = Some(html.into());
        self
    }
}

/// Hex SHA-256 over the canonical JSON form of the extracted fields
///
/// Keys are emitted in sorted order, so the digest only depends on field
/// values, never on fetch time or struct layout.
pub fn content_hash(fields: &ExtractedItem) -> String {
    let canonical = json!({
        "availability": fields.availability,
        "category": fields.category,
        "description": fields.description,
        "image_url": fields.image_url,
        "name": fields.name,
        "price_excl_tax": fields.price_excl_tax,
        "price_incl_tax": fields.price_incl_tax,
        "rating": fields.rating,
        "review_count": fields.review_count,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
