//! Token bucket arithmetic
//!
//! Pure functions only; persistence and locking live in the stores.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Parameters shared by every bucket of one limiter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPolicy {
    /// Maximum (and initial) number of tokens
    pub capacity: f64,
    /// Time for an empty bucket to refill to `capacity`
    pub refill_period: Duration,
    /// Idle time after the last write before a bucket is dropped
    pub idle_ttl: Duration,
}

impl BucketPolicy {
    pub fn new(capacity: u32, refill_period: Duration, idle_ttl: Duration) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_period,
            idle_ttl,
        }
    }

    /// Expiry instant of a bucket written at `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.idle_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Persisted state of one identity's bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub tokens: f64,
    pub last_refill: DateTime<Utc>,
}

/// Outcome of evaluating one request against a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Admitted {
        /// Tokens left after this request
        remaining: f64,
    },
    Rejected {
        /// Time until one full token is available
        retry_after: Duration,
    },
}

impl Bucket {
    pub fn full(policy: &BucketPolicy, now: DateTime<Utc>) -> Self {
        Self {
            tokens: policy.capacity,
            last_refill: now,
        }
    }

    /// Credits tokens for the time elapsed since `last_refill`
    ///
    /// A clock that moved backwards credits nothing.
    pub fn refill(&mut self, policy: &BucketPolicy, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        let period = policy.refill_period.as_secs_f64();
        let refill = if period > 0.0 {
            elapsed / period * policy.capacity
        } else {
            policy.capacity
        };

        self.tokens = (self.tokens + refill).min(policy.capacity);
        self.last_refill = now;
    }
}

/// Applies one request to `existing` (absent or expired buckets start full)
///
/// Returns the bucket state to persist along with the decision. The refill
/// is always part of the returned state; a token is only consumed when the
/// request is admitted.
pub fn evaluate(
    existing: Option<Bucket>,
    policy: &BucketPolicy,
    now: DateTime<Utc>,
) -> (Bucket, Decision) {
    let mut bucket = match existing {
        Some(mut bucket) => {
            bucket.refill(policy, now);
            bucket
        }
        None => Bucket::full(policy, now),
    };

    if bucket.tokens < 1.0 {
        let missing = 1.0 - bucket.tokens;
        let secs = if policy.capacity > 0.0 {
            missing / policy.capacity * policy.refill_period.as_secs_f64()
        } else {
            policy.refill_period.as_secs_f64()
        };
        let retry_after = Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX);
        return (bucket, Decision::Rejected { retry_after });
    }

    bucket.tokens -= 1.0;
    let remaining = bucket.tokens;
    (bucket, Decision::Admitted { remaining })
}
