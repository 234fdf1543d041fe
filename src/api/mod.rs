//! Rate-limited read API
//!
//! Serves stored items and the change log over HTTP and lets operators
//! trigger a crawl. Every route sits behind API-key authentication and the
//! per-key token bucket.

pub mod error;
pub mod handlers;
pub mod middleware;

pub use error::{ApiError, ErrorBody};
pub use middleware::{API_KEY_HEADER, RATE_LIMIT_REMAINING_HEADER};

use crate::crawler::Coordinator;
use crate::limiter::{BucketStore, RateLimiter};
use crate::storage::SqliteStorage;
use crate::ShelfError;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Limiter as shared by the API, with the backend chosen at startup
pub type SharedLimiter = Arc<RateLimiter<Box<dyn BucketStore>>>;

/// Process-scoped handles available to every handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<SqliteStorage>>,
    pub limiter: SharedLimiter,
    pub coordinator: Arc<Coordinator<SqliteStorage>>,
    pub start_url: Arc<str>,
}

impl AppState {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        limiter: SharedLimiter,
        coordinator: Arc<Coordinator<SqliteStorage>>,
        start_url: &str,
    ) -> Self {
        Self {
            storage,
            limiter,
            coordinator,
            start_url: Arc::from(start_url),
        }
    }
}

/// Builds the router with authentication and rate limiting on every route
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/items", get(handlers::list_items))
        .route("/items/lookup", get(handlers::lookup_item))
        .route("/items/:id", get(handlers::get_item))
        .route("/items/:id/changes", get(handlers::item_changes))
        .route("/changes", get(handlers::recent_changes))
        .route("/crawl", post(handlers::trigger_crawl))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admission,
        ))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves
///
/// # Arguments
///
/// * `listener` - Bound TCP listener
/// * `state` - Shared handles
/// * `shutdown` - Completes when the server should stop accepting requests
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ShelfError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Read API listening on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Read API stopped");
    Ok(())
}

/// Periodically drops idle rate-limit buckets
pub fn spawn_bucket_sweeper(limiter: SharedLimiter, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let limiter = Arc::clone(&limiter);
            match tokio::task::spawn_blocking(move || limiter.purge_expired()).await {
                Ok(Ok(removed)) if removed > 0 => {
                    tracing::debug!("Dropped {} idle rate-limit buckets", removed)
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Bucket sweep failed: {}", e),
                Err(e) => tracing::warn!("Bucket sweep task failed: {}", e),
            }
        }
    })
}
