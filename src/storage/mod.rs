//! Storage module for persisting crawl results
//!
//! This module handles all database operations for Shelfwatch, including:
//! - SQLite database initialization and schema management
//! - The current-state item collection, unique by `source_url`
//! - The append-only change log
//! - Filtered, sorted and paginated item queries for the read API

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::{format_timestamp, parse_timestamp, SqliteStorage};
pub use traits::{ItemStore, StorageError, StorageResult};

use crate::ingest::ItemRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Opens (creating if needed) the item database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// An item as stored, with its row id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredItem {
    pub id: i64,
    #[serde(flatten)]
    pub record: ItemRecord,
}

/// Kind of change-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    New,
    Updated,
}

impl ChangeType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "updated" => Some(Self::Updated),
            _ => None,
        }
    }
}

/// One immutable change-log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEntry {
    pub id: i64,
    pub item_id: i64,
    pub source_url: String,
    pub change_type: ChangeType,
    pub when: DateTime<Utc>,
    /// `{"name": ...}` for new items, field name to `{old, new}` for updates
    pub details: serde_json::Value,
}

/// Column an item listing is ordered by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Name,
    Price,
    Rating,
    Reviews,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "price" | "price_excl_tax" => Some(Self::Price),
            "rating" => Some(Self::Rating),
            "reviews" | "review_count" => Some(Self::Reviews),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Price => "price_excl_tax",
            Self::Rating => "rating",
            Self::Reviews => "review_count",
        }
    }

    /// Names sort A to Z, numeric columns highest first
    pub fn default_order(&self) -> SortOrder {
        match self {
            Self::Name => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

/// Direction of an item listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Filters, ordering and page window for listing items
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub rating: Option<u8>,
    pub sort: SortField,
    pub order: SortOrder,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            category: None,
            min_price: None,
            max_price: None,
            rating: None,
            sort: SortField::Name,
            order: SortOrder::Asc,
            page: 1,
            page_size: 20,
        }
    }
}

/// One page of an item listing
#[derive(Debug, Clone, Serialize)]
pub struct ItemPage {
    pub items: Vec<StoredItem>,
    /// Matching items across all pages
    pub total: u64,
}
