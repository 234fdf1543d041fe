//! Shelfwatch main entry point
//!
//! This is the command-line interface for the Shelfwatch catalog crawler.

use anyhow::{Context, Result};
use clap::Parser;
use shelfwatch::api::{self, AppState};
use shelfwatch::config::{load_config_with_hash, Config};
use shelfwatch::crawler::{build_coordinator, crawl};
use shelfwatch::limiter::{open_bucket_store, RateLimiter};
use shelfwatch::output::{load_statistics, print_crawl_report, print_statistics};
use shelfwatch::scheduler::CrawlScheduler;
use shelfwatch::storage::open_storage;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Shelfwatch: a catalog crawler with change tracking
///
/// Shelfwatch crawls a paginated catalog, records every item and every
/// change to it, and serves the results through a rate-limited read API.
#[derive(Parser, Debug)]
#[command(name = "shelfwatch")]
#[command(version = "1.0.0")]
#[command(about = "A catalog crawler with change tracking", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run one crawl, print its report and exit
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    crawl_once: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["crawl_once", "dry_run"])]
    stats: bool,

    /// Validate config and show what would run without crawling or serving
    #[arg(long, conflicts_with_all = ["crawl_once", "stats"])]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.crawl_once {
        handle_crawl_once(&config).await?;
    } else {
        handle_serve(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelfwatch=info,warn"),
            1 => EnvFilter::new("shelfwatch=debug,info"),
            2 => EnvFilter::new("shelfwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Shelfwatch Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Start URL: {}", config.crawler.start_url);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!("  Retry base delay: {}ms", config.crawler.retry_base_delay_ms);
    println!("  Store raw HTML: {}", config.crawler.store_raw_html);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);

    println!("\nRead API:");
    println!("  Bind: {}", config.api.bind);
    println!("  API keys: {}", config.api.api_keys.len());
    println!(
        "  Rate limit: {} requests per {}s (idle buckets dropped after {}s)",
        config.api.rate_limit_capacity, config.api.refill_period_secs, config.api.bucket_ttl_secs
    );

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Bucket backend: {:?}", config.storage.bucket_backend);

    println!("\nSchedule:");
    if config.schedule.enabled {
        println!("  Every {}s", config.schedule.interval_secs);
        println!("  Run on start: {}", config.schedule.run_on_start);
    } else {
        println!("  Disabled");
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --crawl-once mode: one crawl, then exit
async fn handle_crawl_once(config: &Config) -> Result<()> {
    tracing::info!("Running a single crawl of {}", config.crawler.start_url);

    let report = crawl(config).await.context("crawl setup failed")?;
    print_crawl_report(&report);

    Ok(())
}

/// Handles the default mode: serve the API and run scheduled crawls
async fn handle_serve(config: Config) -> Result<()> {
    let storage = Arc::new(Mutex::new(open_storage(Path::new(
        &config.storage.database_path,
    ))?));

    let bucket_store = open_bucket_store(&config.storage)?;
    let limiter = Arc::new(RateLimiter::from_config(bucket_store, &config.api));
    let coordinator = Arc::new(build_coordinator(&config, Arc::clone(&storage))?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Ctrl-C stops the server, the scheduler and any crawl in progress
    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            // Dropping the sender would shut everything down
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
        stop.request_stop();
        let _ = shutdown_tx.send(true);
    });

    let scheduler = if config.schedule.enabled {
        let scheduler = CrawlScheduler::from_config(
            Arc::clone(&coordinator),
            config.crawler.start_url.clone(),
            &config.schedule,
        );
        Some(tokio::spawn(scheduler.run(shutdown_rx.clone())))
    } else {
        tracing::info!("Scheduled crawling disabled");
        None
    };

    let sweeper = api::spawn_bucket_sweeper(
        Arc::clone(&limiter),
        Duration::from_secs(config.api.refill_period_secs),
    );

    let addr: SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.api.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let state = AppState::new(storage, limiter, coordinator, &config.crawler.start_url);
    let mut server_shutdown = shutdown_rx;
    api::serve(listener, state, async move {
        // Either a `true` or a dropped sender ends the wait
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    })
    .await?;

    sweeper.abort();
    if let Some(handle) = scheduler {
        match handle.await {
            Ok(runs) => tracing::info!("Scheduler finished {} runs", runs),
            Err(e) => tracing::warn!("Scheduler task failed: {}", e),
        }
    }

    Ok(())
}
