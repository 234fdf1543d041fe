//! Crawler coordinator - main crawl orchestration logic
//!
//! Listing pages are walked one after another, following "next page" links.
//! Item pages found on a listing are fetched, extracted and ingested in
//! spawned tasks, bounded by a semaphore. A failing page or item is logged
//! and counted; it never aborts the run.

use crate::config::CrawlerConfig;
use crate::crawler::extractor::{ExtractError, Extractor};
use crate::crawler::fetcher::{fetch_page, RetryPolicy};
use crate::crawler::frontier::Frontier;
use crate::ingest::{IngestOutcome, Ingestor, ItemRecord};
use crate::storage::ItemStore;
use crate::ShelfError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use url::Url;

/// Cooperative stop signal shared with whoever may end a run early
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops popping listing pages and starting item tasks
    ///
    /// Item tasks already running are allowed to finish. The request is
    /// never cleared: every later run of the same coordinator returns at
    /// once with `stopped` set.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of one crawl run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlReport {
    pub start_url: String,
    pub started_at: Option<DateTime<Utc>>,
    pub pages_visited: u64,
    pub pages_failed: u64,
    pub items_inserted: u64,
    pub items_updated: u64,
    pub items_refreshed: u64,
    pub items_unchanged: u64,
    pub items_failed: u64,
    pub stopped: bool,
    pub elapsed_ms: u64,
}

impl CrawlReport {
    /// Item tasks that ran to completion, successfully or not
    pub fn items_processed(&self) -> u64 {
        self.items_inserted
            + self.items_updated
            + self.items_refreshed
            + self.items_unchanged
            + self.items_failed
    }

    fn record_item(&mut self, result: Result<IngestOutcome, ShelfError>) {
        match result {
            Ok(IngestOutcome::Inserted) => self.items_inserted += 1,
            Ok(IngestOutcome::Updated(_)) => self.items_updated += 1,
            Ok(IngestOutcome::Refreshed) => self.items_refreshed += 1,
            Ok(IngestOutcome::Unchanged) => self.items_unchanged += 1,
            Err(e) => {
                tracing::warn!("Item failed: {}", e);
                self.items_failed += 1;
            }
        }
    }
}

/// Everything an item task needs, cloned into each task
struct ItemContext<S> {
    client: Client,
    policy: RetryPolicy,
    extractor: Arc<dyn Extractor>,
    ingestor: Ingestor<S>,
    store_raw_html: bool,
}

impl<S> Clone for ItemContext<S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            policy: self.policy,
            extractor: Arc::clone(&self.extractor),
            ingestor: self.ingestor.clone(),
            store_raw_html: self.store_raw_html,
        }
    }
}

impl<S: ItemStore> ItemContext<S> {
    async fn process(self, url: String) -> Result<IngestOutcome, ShelfError> {
        let page_url = Url::parse(&url).map_err(|e| ExtractError::invalid_url(&url, e))?;
        let html = fetch_page(&self.client, &url, &self.policy).await?;
        let fields = self.extractor.extract_item(&html, &page_url)?;

        let mut record = ItemRecord::new(url, fields, Utc::now());
        if self.store_raw_html {
            record = record.with_raw_html(html);
        }

        Ok(self.ingestor.ingest(record)?)
    }
}

/// Main crawler coordinator structure
///
/// One coordinator is built per process and shared by every caller that can
/// start a run. Runs are serialized: a second caller waits for the current
/// run to finish before its own begins.
pub struct Coordinator<S> {
    items: ItemContext<S>,
    concurrency: usize,
    stop: StopHandle,
    run_guard: Mutex<()>,
}

impl<S: ItemStore + Send + 'static> Coordinator<S> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - Crawler section of the configuration
    /// * `client` - HTTP client shared by every fetch
    /// * `extractor` - Markup extractor for the target site
    /// * `ingestor` - Applies extracted records to the item store
    pub fn new(
        config: &CrawlerConfig,
        client: Client,
        extractor: Arc<dyn Extractor>,
        ingestor: Ingestor<S>,
    ) -> Self {
        Self {
            items: ItemContext {
                client,
                policy: RetryPolicy::from_config(config),
                extractor,
                ingestor,
                store_raw_html: config.store_raw_html,
            },
            concurrency: config.concurrency.max(1) as usize,
            stop: StopHandle::new(),
            run_guard: Mutex::new(()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Whether a run currently holds the run guard
    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Crawls the listing starting at `start_url` until it runs out of pages
    ///
    /// # Returns
    ///
    /// The counters of this run. Failures of single pages or items are
    /// reflected in the report, never returned as an error.
    pub async fn run(&self, start_url: &str) -> CrawlReport {
        let _guard = self.run_guard.lock().await;

        let started = Instant::now();
        let mut report = CrawlReport {
            start_url: start_url.to_string(),
            started_at: Some(Utc::now()),
            ..CrawlReport::default()
        };
        let mut frontier = Frontier::new(start_url);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        tracing::info!(
            "Starting crawl at {} with concurrency {}",
            start_url,
            self.concurrency
        );

        loop {
            if self.stop.is_stop_requested() {
                tracing::info!("Stop requested, ending crawl");
                report.stopped = true;
                break;
            }

            let page = match frontier.next_page() {
                Some(page) => page,
                None => {
                    tracing::info!("Frontier is empty, crawl complete");
                    break;
                }
            };

            report.pages_visited += 1;
            tracing::debug!("Processing listing page {}", page);

            let listing = match self.fetch_listing(&page).await {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::error!("Skipping listing page {}: {}", page, e);
                    report.pages_failed += 1;
                    continue;
                }
            };

            let mut tasks = JoinSet::new();
            for link in listing.item_links {
                if !frontier.mark_visited(&link) {
                    continue;
                }

                // Blocks while `concurrency` item tasks are in flight
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                // A stop may arrive while waiting for a free slot
                if self.stop.is_stop_requested() {
                    report.stopped = true;
                    break;
                }
                let items = self.items.clone();
                tasks.spawn(async move {
                    let result = items.process(link).await;
                    drop(permit);
                    result
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => report.record_item(result),
                    Err(e) => {
                        tracing::error!("Item task panicked: {}", e);
                        report.items_failed += 1;
                    }
                }
            }

            if let Some(next) = listing.next_page {
                frontier.push(&next);
            }

            if report.pages_visited % 10 == 0 {
                tracing::info!(
                    "Progress: {} listing pages, {} items processed",
                    report.pages_visited,
                    report.items_processed()
                );
            }
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            "Crawl finished in {} ms: {} pages ({} failed), {} new, {} updated, {} unchanged, \
             {} failed items",
            report.elapsed_ms,
            report.pages_visited,
            report.pages_failed,
            report.items_inserted,
            report.items_updated,
            report.items_unchanged,
            report.items_failed
        );

        report
    }

    async fn fetch_listing(
        &self,
        page: &str,
    ) -> Result<crate::crawler::extractor::ListingPage, ShelfError> {
        let page_url = Url::parse(page).map_err(|e| ExtractError::invalid_url(page, e))?;
        let html = fetch_page(&self.items.client, page, &self.items.policy).await?;
        Ok(self.items.extractor.extract_listing(&html, &page_url)?)
    }
}
