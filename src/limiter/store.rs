//! Shared bucket stores
//!
//! A store applies [`evaluate`] to one identity's bucket as a single atomic
//! read-modify-write. Callers serialize access through the limiter's lock;
//! the SQLite store additionally runs every update in an immediate
//! transaction so several processes can share one database file.

use crate::config::{BucketBackend, StorageConfig};
use crate::limiter::bucket::{evaluate, Bucket, BucketPolicy, Decision};
use crate::storage::initialize_schema;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// The bucket store could not be read or written
#[derive(Debug, Error)]
pub enum BucketStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Bucket store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for rate-limit buckets
pub trait BucketStore: Send {
    /// Evaluates one request for `key` and persists the resulting bucket
    ///
    /// Buckets whose expiry has passed are treated as absent. Every write
    /// pushes the expiry to `now + policy.idle_ttl`.
    fn take(
        &mut self,
        key: &str,
        policy: &BucketPolicy,
        now: DateTime<Utc>,
    ) -> Result<Decision, BucketStoreError>;

    /// Current (unexpired) bucket for `key`, without refilling it
    fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Bucket>, BucketStoreError>;

    /// Drops every bucket that expired at or before `now`
    fn purge_expired(&mut self, now: DateTime<Utc>) -> Result<usize, BucketStoreError>;
}

impl<B: BucketStore + ?Sized> BucketStore for Box<B> {
    fn take(
        &mut self,
        key: &str,
        policy: &BucketPolicy,
        now: DateTime<Utc>,
    ) -> Result<Decision, BucketStoreError> {
        (**self).take(key, policy, now)
    }

    fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Bucket>, BucketStoreError> {
        (**self).peek(key, now)
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> Result<usize, BucketStoreError> {
        (**self).purge_expired(now)
    }
}

/// Opens the bucket store selected by `storage.bucket-backend`
///
/// The SQLite backend shares the item database file but uses its own
/// connection, so limiter traffic never waits on the item store lock.
pub fn open_bucket_store(config: &StorageConfig) -> Result<Box<dyn BucketStore>, BucketStoreError> {
    match config.bucket_backend {
        BucketBackend::Sqlite => Ok(Box::new(SqliteBucketStore::open(Path::new(
            &config.database_path,
        ))?)),
        BucketBackend::Memory => Ok(Box::new(MemoryBucketStore::new())),
    }
}

/// Process-local bucket store
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    buckets: HashMap<String, (Bucket, DateTime<Utc>)>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buckets.len()
    }
}

impl BucketStore for MemoryBucketStore {
    fn take(
        &mut self,
        key: &str,
        policy: &BucketPolicy,
        now: DateTime<Utc>,
    ) -> Result<Decision, BucketStoreError> {
        let existing = self.peek(key, now)?;
        let (bucket, decision) = evaluate(existing, policy, now);
        self.buckets
            .insert(key.to_string(), (bucket, policy.expires_at(now)));
        Ok(decision)
    }

    fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Bucket>, BucketStoreError> {
        Ok(self
            .buckets
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(bucket, _)| *bucket))
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> Result<usize, BucketStoreError> {
        let before = self.buckets.len();
        self.buckets.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - self.buckets.len())
    }
}

/// Bucket store backed by the `rate_buckets` table
pub struct SqliteBucketStore {
    conn: Connection,
}

impl SqliteBucketStore {
    /// Opens its own connection to the database at `path`
    pub fn open(path: &Path) -> Result<Self, BucketStoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(2))?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn new_in_memory() -> Result<Self, BucketStoreError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn read_bucket(
    conn: &Connection,
    key: &str,
    now: DateTime<Utc>,
) -> Result<Option<Bucket>, BucketStoreError> {
    let row = conn
        .query_row(
            "SELECT tokens, last_refill_us FROM rate_buckets
             WHERE api_key = ?1 AND expires_at_us > ?2",
            params![key, now.timestamp_micros()],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    // An unreadable timestamp is treated like a missing bucket
    Ok(row.and_then(|(tokens, last_refill_us)| {
        DateTime::<Utc>::from_timestamp_micros(last_refill_us)
            .map(|last_refill| Bucket { tokens, last_refill })
    }))
}

impl BucketStore for SqliteBucketStore {
    fn take(
        &mut self,
        key: &str,
        policy: &BucketPolicy,
        now: DateTime<Utc>,
    ) -> Result<Decision, BucketStoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM rate_buckets WHERE expires_at_us <= ?1",
            params![now.timestamp_micros()],
        )?;

        let existing = read_bucket(&tx, key, now)?;
        let (bucket, decision) = evaluate(existing, policy, now);

        tx.execute(
            "INSERT INTO rate_buckets (api_key, tokens, last_refill_us, expires_at_us)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(api_key) DO UPDATE SET
                tokens = excluded.tokens,
                last_refill_us = excluded.last_refill_us,
                expires_at_us = excluded.expires_at_us",
            params![
                key,
                bucket.tokens,
                bucket.last_refill.timestamp_micros(),
                policy.expires_at(now).timestamp_micros()
            ],
        )?;

        tx.commit()?;
        Ok(decision)
    }

    fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Bucket>, BucketStoreError> {
        read_bucket(&self.conn, key, now)
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> Result<usize, BucketStoreError> {
        let removed = self.conn.execute(
            "DELETE FROM rate_buckets WHERE expires_at_us <= ?1",
            params![now.timestamp_micros()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> BucketPolicy {
        BucketPolicy::new(2, Duration::from_secs(3600), Duration::from_secs(7200))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn exercise_store(store: &mut dyn BucketStore) {
        assert!(store.peek("k", t0()).unwrap().is_none());

        let first = store.take("k", &policy(), t0()).unwrap();
        assert_eq!(first, Decision::Admitted { remaining: 1.0 });
        assert_eq!(store.peek("k", t0()).unwrap().unwrap().tokens, 1.0);

        store.take("k", &policy(), t0()).unwrap();
        let third = store.take("k", &policy(), t0()).unwrap();
        assert!(matches!(third, Decision::Rejected { .. }));

        // Other identities are independent
        let other = store.take("other", &policy(), t0()).unwrap();
        assert!(matches!(other, Decision::Admitted { .. }));

        // Two idle hours after the last write the bucket is gone
        let later = t0() + chrono::Duration::hours(2);
        assert!(store.peek("k", later).unwrap().is_none());
        assert_eq!(store.purge_expired(later).unwrap(), 2);

        let fresh = store.take("k", &policy(), later).unwrap();
        assert_eq!(fresh, Decision::Admitted { remaining: 1.0 });
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryBucketStore::new();
        exercise_store(&mut store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sqlite_store() {
        let mut store = SqliteBucketStore::new_in_memory().unwrap();
        exercise_store(&mut store);
    }

    #[test]
    fn test_boxed_store_delegates() {
        let mut store: Box<dyn BucketStore> = Box::new(MemoryBucketStore::new());
        exercise_store(&mut store);
    }

    #[test]
    fn test_open_bucket_store_backends() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig {
            database_path: dir.path().join("shelf.db").to_string_lossy().into_owned(),
            bucket_backend: BucketBackend::Sqlite,
        };
        let mut sqlite = open_bucket_store(&config).unwrap();
        assert!(sqlite.take("k", &policy(), t0()).is_ok());

        config.bucket_backend = BucketBackend::Memory;
        let mut memory = open_bucket_store(&config).unwrap();
        assert!(memory.peek("k", t0()).unwrap().is_none());
        assert!(memory.take("k", &policy(), t0()).is_ok());
    }

    #[test]
    fn test_sqlite_store_shared_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buckets.db");

        let mut a = SqliteBucketStore::open(&path).unwrap();
        let mut b = SqliteBucketStore::open(&path).unwrap();

        a.take("k", &policy(), t0()).unwrap();
        b.take("k", &policy(), t0()).unwrap();
        let third = a.take("k", &policy(), t0()).unwrap();
        assert!(matches!(third, Decision::Rejected { .. }));
    }
}
