use crate::config::types::{ApiConfig, Config, CrawlerConfig, ScheduleConfig, UserAgentConfig};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_api_config(&config.api)?;
    validate_schedule_config(&config.schedule)?;

    if config.storage.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.start_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "start_url '{}' must use HTTP or HTTPS",
            config.start_url
        )));
    }

    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates read API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    config.bind.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!("Invalid bind address '{}': {}", config.bind, e))
    })?;

    if config.api_keys.is_empty() {
        return Err(ConfigError::Validation(
            "api_keys must contain at least one key".to_string(),
        ));
    }

    if config.api_keys.iter().any(|key| key.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "api_keys cannot contain empty keys".to_string(),
        ));
    }

    if config.rate_limit_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "rate_limit_capacity must be >= 1, got {}",
            config.rate_limit_capacity
        )));
    }

    if config.refill_period_secs < 1 {
        return Err(ConfigError::Validation(
            "refill_period_secs must be >= 1".to_string(),
        ));
    }

    if config.bucket_ttl_secs < config.refill_period_secs {
        return Err(ConfigError::Validation(format!(
            "bucket_ttl_secs ({}) must not be shorter than refill_period_secs ({})",
            config.bucket_ttl_secs, config.refill_period_secs
        )));
    }

    Ok(())
}

/// Validates schedule configuration
fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    if config.enabled && config.interval_secs < 60 {
        return Err(ConfigError::Validation(format!(
            "interval_secs must be >= 60 when the schedule is enabled, got {}",
            config.interval_secs
        )));
    }

    Ok(())
}
