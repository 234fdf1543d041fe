//! Crawler module for catalog traversal
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - Listing and item extraction
//! - Per-run frontier bookkeeping
//! - Overall crawl coordination

mod coordinator;
mod extractor;
mod fetcher;
mod frontier;

pub use coordinator::{Coordinator, CrawlReport, StopHandle};
pub use extractor::{CatalogExtractor, ExtractError, Extractor, ListingPage};
pub use fetcher::{build_http_client, fetch_page, FetchError, RetryPolicy, TransportError};
pub use frontier::{normalize, Frontier};

use crate::config::Config;
use crate::ingest::Ingestor;
use crate::storage::SqliteStorage;
use crate::ShelfError;
use std::sync::{Arc, Mutex};

/// Builds the coordinator for the configured catalog
///
/// # Arguments
///
/// * `config` - The full configuration
/// * `storage` - Item store shared with the rest of the process
pub fn build_coordinator(
    config: &Config,
    storage: Arc<Mutex<SqliteStorage>>,
) -> Result<Coordinator<SqliteStorage>, ShelfError> {
    let client = build_http_client(&config.user_agent)?;
    let extractor = Arc::new(CatalogExtractor::new()?);
    Ok(Coordinator::new(
        &config.crawler,
        client,
        extractor,
        Ingestor::new(storage),
    ))
}

/// Runs one complete crawl of `crawler.start-url`
///
/// This is the entry point used by `--crawl-once`. It will:
/// 1. Open the item store
/// 2. Build the HTTP client and extractor
/// 3. Walk every listing page and ingest every item
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl ran (individual failures are counted inside)
/// * `Err(ShelfError)` - Setup failed before the crawl could start
pub async fn crawl(config: &Config) -> Result<CrawlReport, ShelfError> {
    let storage = crate::storage::open_storage(std::path::Path::new(
        &config.storage.database_path,
    ))?;
    let coordinator = build_coordinator(config, Arc::new(Mutex::new(storage)))?;
    Ok(coordinator.run(&config.crawler.start_url).await)
}
