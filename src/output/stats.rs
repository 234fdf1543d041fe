//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog and change-log statistics from the storage layer.

use crate::storage::{ChangeEntry, ChangeType, ItemStore, StorageError};

/// Number of change-log entries shown by `--stats`
const RECENT_CHANGES: u32 = 10;

/// Catalog statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    /// Total number of stored items
    pub total_items: u64,

    /// Change-log entries of type `new`
    pub new_entries: u64,

    /// Change-log entries of type `updated`
    pub update_entries: u64,

    /// Items per category, largest first
    pub categories: Vec<(String, u64)>,

    /// Newest change-log entries
    pub recent_changes: Vec<ChangeEntry>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn ItemStore) -> Result<CatalogStatistics, StorageError> {
    let mut categories = storage.category_breakdown()?;
    categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(CatalogStatistics {
        total_items: storage.count_items()?,
        new_entries: storage.count_changes(ChangeType::New)?,
        update_entries: storage.count_changes(ChangeType::Updated)?,
        categories,
        recent_changes: storage.recent_changes(RECENT_CHANGES)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Items stored: {}", stats.total_items);
    println!("  New-item entries: {}", stats.new_entries);
    println!("  Update entries: {}", stats.update_entries);
    println!();

    if !stats.categories.is_empty() {
        println!("Items by Category:");
        for (category, count) in &stats.categories {
            let percentage = if stats.total_items > 0 {
                (*count as f64 / stats.total_items as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", category, count, percentage);
        }
        println!();
    }

    if !stats.recent_changes.is_empty() {
        println!("Recent Changes:");
        for change in &stats.recent_changes {
            println!("  {}", describe_change(change));
        }
    }
}

/// One-line summary of a change-log entry
pub fn describe_change(change: &ChangeEntry) -> String {
    let fields = match change.details.as_object() {
        Some(map) if change.change_type == ChangeType::Updated => {
            map.keys().cloned().collect::<Vec<_>>().join(", ")
        }
        _ => String::new(),
    };

    let when = change.when.format("%Y-%m-%d %H:%M:%S");
    if fields.is_empty() {
        format!(
            "[{}] {} {}",
            when,
            change.change_type.to_db_string(),
            change.source_url
        )
    } else {
        format!(
            "[{}] {} {} ({})",
            when,
            change.change_type.to_db_string(),
            change.source_url,
            fields
        )
    }
}
