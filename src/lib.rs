//! Shelfwatch: a catalog crawler with change tracking
//!
//! This crate crawls a paginated catalog site, stores one record per item,
//! keeps an append-only log of what changed between crawls, and serves the
//! results through a rate-limited read API.

pub mod api;
pub mod config;
pub mod crawler;
pub mod ingest;
pub mod limiter;
pub mod output;
pub mod scheduler;
pub mod storage;

use thiserror::Error;

/// Main error type for Shelfwatch operations
#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("Rate limiter error: {0}")]
    RateLimit(#[from] limiter::BucketStoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Shelfwatch operations
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlReport};
pub use ingest::{IngestOutcome, Ingestor, ItemRecord};
pub use limiter::{AdmissionError, RateLimiter};
