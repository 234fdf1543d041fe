//! Periodic crawl runs
//!
//! The scheduler starts a crawl on a fixed interval. It goes through the
//! coordinator's run guard like every other caller, so a tick that lands
//! while an API-triggered crawl is active waits for that crawl to end.

use crate::config::ScheduleConfig;
use crate::crawler::Coordinator;
use crate::storage::ItemStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub struct CrawlScheduler<S> {
    coordinator: Arc<Coordinator<S>>,
    start_url: String,
    interval: Duration,
    run_on_start: bool,
}

impl<S: ItemStore + Send + 'static> CrawlScheduler<S> {
    pub fn new(
        coordinator: Arc<Coordinator<S>>,
        start_url: impl Into<String>,
        interval: Duration,
        run_on_start: bool,
    ) -> Self {
        Self {
            coordinator,
            start_url: start_url.into(),
            interval,
            run_on_start,
        }
    }

    pub fn from_config(
        coordinator: Arc<Coordinator<S>>,
        start_url: impl Into<String>,
        config: &ScheduleConfig,
    ) -> Self {
        Self::new(
            coordinator,
            start_url,
            Duration::from_secs(config.interval_secs),
            config.run_on_start,
        )
    }

    /// Runs crawls until `shutdown` flips to true or its sender is dropped
    ///
    /// # Returns
    ///
    /// The number of crawl runs that were started and finished.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.run_on_start {
            // The first tick completes immediately
            ticker.tick().await;
        }

        tracing::info!(
            "Crawl scheduler started, interval {}s",
            self.interval.as_secs()
        );

        let mut runs = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("Scheduled crawl starting");
                    let report = self.coordinator.run(&self.start_url).await;
                    runs += 1;
                    tracing::info!(
                        "Scheduled crawl {} done: {} new, {} updated, {} failed items",
                        runs,
                        report.items_inserted,
                        report.items_updated,
                        report.items_failed
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Crawl scheduler stopped after {} runs", runs);
        runs
    }
}
