//! Storage traits and error types
//!
//! This module defines the trait interface for item storage backends and
//! associated error types.

use crate::ingest::{FieldDiffs, ItemRecord};
use crate::storage::{ChangeEntry, ChangeType, ItemPage, ItemQuery, StoredItem};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("Item not found: {0}")]
    ItemNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for item and change-log storage
///
/// Implementations keep at most one item per `source_url` and treat the
/// change log as append-only.
pub trait ItemStore {
    // ===== Items =====

    /// Gets an item by its identity
    fn get_item_by_url(&self, source_url: &str) -> StorageResult<Option<StoredItem>>;

    /// Gets an item by row id
    fn get_item(&self, id: i64) -> StorageResult<Option<StoredItem>>;

    /// Stores a never-seen item and appends its `new` change entry
    ///
    /// Both writes commit together. Returns the new row id.
    fn insert_item(&mut self, record: &ItemRecord) -> StorageResult<i64>;

    /// Overwrites item `id` with `record`
    ///
    /// When `diffs` is non-empty one `updated` entry holding all of them is
    /// appended in the same transaction.
    fn update_item(&mut self, id: i64, record: &ItemRecord, diffs: &FieldDiffs)
        -> StorageResult<()>;

    /// Lists items matching `query`, one page at a time
    fn list_items(&self, query: &ItemQuery) -> StorageResult<ItemPage>;

    // ===== Change Log =====

    /// Most recent change entries, newest first
    fn recent_changes(&self, limit: u32) -> StorageResult<Vec<ChangeEntry>>;

    /// All change entries of one item, oldest first
    fn changes_for_item(&self, item_id: i64) -> StorageResult<Vec<ChangeEntry>>;

    // ===== Statistics =====

    /// Gets total item count
    fn count_items(&self) -> StorageResult<u64>;

    /// Counts change entries of one type
    fn count_changes(&self, change_type: ChangeType) -> StorageResult<u64>;

    /// Distinct categories with their item counts, sorted by name
    fn category_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;
}
