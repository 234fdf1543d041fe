//! Change detection and ingestion
//!
//! The ingestor compares a freshly crawled record with the stored snapshot
//! for the same `source_url` and decides between insert, update or no-op.
//! Every insert and every update that touches a tracked field appends one
//! entry to the change log, so re-crawling unchanged content is idempotent.

mod diff;
mod record;

pub use diff::{diff_tracked, FieldChange, FieldDiffs, TrackedField};
pub use record::{content_hash, ExtractedItem, ItemRecord, ItemStatus};

use crate::storage::{ItemStore, StorageError};
use std::sync::{Arc, Mutex};

/// What an ingest did to the store
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// First time this `source_url` was seen; a `new` entry was logged
    Inserted,
    /// Tracked fields changed; the record was overwritten and one `updated`
    /// entry holding these diffs was logged
    Updated(FieldDiffs),
    /// Content changed only in untracked fields; the record was overwritten
    /// without a change-log entry
    Refreshed,
    /// Same content hash as the stored record; nothing was written
    Unchanged,
}

/// Applies crawled records to an item store
pub struct Ingestor<S> {
    storage: Arc<Mutex<S>>,
}

impl<S> Clone for Ingestor<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: ItemStore> Ingestor<S> {
    pub fn new(storage: Arc<Mutex<S>>) -> Self {
        Self { storage }
    }

    /// Ingests one record
    ///
    /// The lookup and the write run under the same storage lock, and each
    /// write lands in one transaction together with its change-log entry.
    pub fn ingest(&self, record: ItemRecord) -> Result<IngestOutcome, StorageError> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;

        let existing = match storage.get_item_by_url(&record.source_url)? {
            Some(existing) => existing,
            None => {
                let id = storage.insert_item(&record)?;
                tracing::info!(
                    "Inserted new item {} ({}) as #{}",
                    record.fields.name,
                    record.source_url,
                    id
                );
                return Ok(IngestOutcome::Inserted);
            }
        };

        if existing.record.content_hash == record.content_hash {
            tracing::debug!("Item {} unchanged", record.source_url);
            return Ok(IngestOutcome::Unchanged);
        }

        let diffs = diff_tracked(&existing.record.fields, &record.fields);
        storage.update_item(existing.id, &record, &diffs)?;

        if diffs.is_empty() {
            tracing::debug!(
                "Item {} refreshed, no tracked field changed",
                record.source_url
            );
            Ok(IngestOutcome::Refreshed)
        } else {
            tracing::info!(
                "Updated item {} ({}): {:?}",
                record.fields.name,
                record.source_url,
                diffs.keys().collect::<Vec<_>>()
            );
            Ok(IngestOutcome::Updated(diffs))
        }
    }
}
