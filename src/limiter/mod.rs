//! Request admission for the read API
//!
//! Every request carries an API key. Keys outside the configured allow-list
//! are refused before the limiter looks at any bucket. Known keys draw one
//! token from their bucket; buckets refill continuously over the refill
//! period and are forgotten after a fixed idle time.
//!
//! When the bucket store cannot be evaluated the limiter fails closed.

mod bucket;
mod store;

pub use bucket::{evaluate, Bucket, BucketPolicy, Decision};
pub use store::{
    open_bucket_store, BucketStore, BucketStoreError, MemoryBucketStore, SqliteBucketStore,
};

use crate::config::ApiConfig;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Why a request was not admitted
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Missing or unknown API key")]
    Unauthorized,

    #[error("Rate limit exceeded, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Rate limiting service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// An admitted request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    /// Whole tokens left in the caller's bucket
    pub remaining: u32,
}

/// Token-bucket limiter keyed by API key
pub struct RateLimiter<B> {
    store: Mutex<B>,
    policy: BucketPolicy,
    api_keys: HashSet<String>,
}

impl<B: BucketStore> RateLimiter<B> {
    pub fn new(store: B, policy: BucketPolicy, api_keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            store: Mutex::new(store),
            policy,
            api_keys: api_keys.into_iter().collect(),
        }
    }

    /// Builds a limiter from the `[api]` config section
    pub fn from_config(store: B, config: &ApiConfig) -> Self {
        let policy = BucketPolicy::new(
            config.rate_limit_capacity,
            Duration::from_secs(config.refill_period_secs),
            Duration::from_secs(config.bucket_ttl_secs),
        );
        Self::new(store, policy, config.api_keys.iter().cloned())
    }

    pub fn policy(&self) -> &BucketPolicy {
        &self.policy
    }

    pub fn is_known_key(&self, api_key: &str) -> bool {
        self.api_keys.contains(api_key)
    }

    /// Admits or rejects one request at the current time
    pub fn check(&self, api_key: Option<&str>) -> Result<Admission, AdmissionError> {
        self.check_at(api_key, Utc::now())
    }

    /// Admits or rejects one request at `now`
    pub fn check_at(
        &self,
        api_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Admission, AdmissionError> {
        let api_key = match api_key {
            Some(key) if self.is_known_key(key) => key,
            _ => return Err(AdmissionError::Unauthorized),
        };

        let mut store = self.store.lock().map_err(|_| {
            tracing::error!("Bucket store lock poisoned, rejecting request");
            AdmissionError::ServiceUnavailable("bucket store lock poisoned".to_string())
        })?;

        let decision = store.take(api_key, &self.policy, now).map_err(|e| {
            tracing::error!("Rate limiter store error: {}", e);
            AdmissionError::ServiceUnavailable(e.to_string())
        })?;

        match decision {
            Decision::Admitted { remaining } => Ok(Admission {
                remaining: remaining.max(0.0).floor() as u32,
            }),
            Decision::Rejected { retry_after } => {
                tracing::debug!("Rate limited key, retry after {:?}", retry_after);
                Err(AdmissionError::RateLimited { retry_after })
            }
        }
    }

    /// Drops idle buckets; returns how many were removed
    pub fn purge_expired(&self) -> Result<usize, AdmissionError> {
        let mut store = self.store.lock().map_err(|_| {
            AdmissionError::ServiceUnavailable("bucket store lock poisoned".to_string())
        })?;
        store
            .purge_expired(Utc::now())
            .map_err(|e| AdmissionError::ServiceUnavailable(e.to_string()))
    }
}
