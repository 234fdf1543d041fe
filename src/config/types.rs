use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Shelfwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// First listing page of the catalog
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Maximum number of item pages fetched at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Total attempts made for one URL before giving up
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Unit of the linear backoff between attempts (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Keep the raw item markup alongside the extracted fields
    #[serde(rename = "store-raw-html", default)]
    pub store_raw_html: bool,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

/// Read API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address the HTTP server binds to (host:port)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Keys accepted in the `X-API-KEY` header
    #[serde(rename = "api-keys")]
    pub api_keys: Vec<String>,

    /// Requests each key may burst before being throttled
    #[serde(rename = "rate-limit-capacity", default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: u32,

    /// Time for an empty bucket to refill completely (seconds)
    #[serde(rename = "refill-period-secs", default = "default_refill_period_secs")]
    pub refill_period_secs: u64,

    /// Idle time after which a key's bucket is forgotten (seconds)
    #[serde(rename = "bucket-ttl-secs", default = "default_bucket_ttl_secs")]
    pub bucket_ttl_secs: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding items and the change log
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Where rate-limit buckets live
    #[serde(rename = "bucket-backend", default)]
    pub bucket_backend: BucketBackend,
}

/// Backing store for rate-limit buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketBackend {
    /// Shared SQLite table in the main database file
    #[default]
    Sqlite,
    /// Process-local map, lost on restart
    Memory,
}

/// Periodic crawl configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,

    /// Time between the start of two scheduled runs (seconds)
    #[serde(rename = "interval-secs", default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Run a crawl right after startup instead of waiting one interval
    #[serde(rename = "run-on-start", default)]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            interval_secs: default_interval_secs(),
            run_on_start: false,
        }
    }
}

fn default_concurrency() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_rate_limit_capacity() -> u32 {
    100
}

fn default_refill_period_secs() -> u64 {
    3600
}

fn default_bucket_ttl_secs() -> u64 {
    7200
}

fn default_schedule_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    24 * 60 * 60
}
