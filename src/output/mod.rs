//! Output module for crawl reports and catalog summaries
//!
//! This module handles:
//! - Printing the counters of a finished crawl run
//! - Loading and printing catalog statistics for `--stats`

pub mod stats;

pub use stats::{describe_change, load_statistics, print_statistics, CatalogStatistics};

use crate::crawler::CrawlReport;

/// Prints a crawl report to stdout
///
/// # Arguments
///
/// * `report` - The finished run to display
pub fn print_crawl_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Start URL: {}", report.start_url);
    if let Some(started_at) = report.started_at {
        println!("Started: {}", started_at.to_rfc3339());
    }
    println!("Elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0);
    if report.stopped {
        println!("Stopped before the listing was exhausted");
    }
    println!();

    println!("Listing Pages:");
    println!("  Visited: {}", report.pages_visited);
    println!("  Failed: {}", report.pages_failed);
    println!();

    println!("Items:");
    println!("  New: {}", report.items_inserted);
    println!("  Updated: {}", report.items_updated);
    println!("  Refreshed: {}", report.items_refreshed);
    println!("  Unchanged: {}", report.items_unchanged);
    println!("  Failed: {}", report.items_failed);
}
