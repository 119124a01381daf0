//! Configuration for the task distribution system.
//!
//! This module provides the limits and endpoints the scheduler, rate
//! limiter, lock and fetch path operate under: per-proxy request budget,
//! retry bound, lock TTL, fetch timeout/redirect limits, and the backing
//! store URLs.

use std::time::Duration;

use thiserror::Error;

/// Fixed browser-like User-Agent sent with every outbound fetch.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the task distribution system.
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    // Rate limiting
    /// Per-proxy request ceiling inside one rate window.
    pub requests_per_minute: u32,
    /// Length of the fixed rate window.
    pub rate_window: Duration,

    // Retry and locking
    /// Maximum number of retry attempts per task.
    pub max_retries: u32,
    /// TTL of the per-task assignment lock. Doubles as the proxy timeout.
    pub lock_ttl: Duration,

    // Outbound fetch
    /// Hard timeout for one outbound fetch.
    pub fetch_timeout: Duration,
    /// Maximum number of redirects followed per fetch.
    pub max_redirects: usize,

    // Proxy health
    /// Interval between background proxy health sweeps.
    pub health_check_interval: Duration,

    // Backing stores
    /// Redis connection URL for the coordination store.
    pub redis_url: String,
    /// PostgreSQL connection URL for the durable record store.
    pub database_url: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            rate_window: Duration::from_secs(60),
            max_retries: 3,
            lock_ttl: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(30),
            max_redirects: 5,
            health_check_interval: Duration::from_secs(5 * 60),
            redis_url: "redis://localhost:6379".to_string(),
            database_url: "postgres://localhost/fetchgrid".to_string(),
        }
    }
}

impl DistributionConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FETCHGRID_REQUESTS_PER_MINUTE`: per-proxy request ceiling (default: 60)
    /// - `FETCHGRID_MAX_RETRIES`: retry bound per task (default: 3)
    /// - `FETCHGRID_LOCK_TTL_SECS`: assignment lock TTL in seconds (default: 30)
    /// - `FETCHGRID_FETCH_TIMEOUT_SECS`: fetch timeout in seconds (default: 30)
    /// - `FETCHGRID_MAX_REDIRECTS`: redirect limit per fetch (default: 5)
    /// - `FETCHGRID_HEALTH_CHECK_INTERVAL_SECS`: health sweep interval (default: 300)
    /// - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
    /// - `DATABASE_URL`: PostgreSQL connection URL (required)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have
    /// invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FETCHGRID_REQUESTS_PER_MINUTE") {
            config.requests_per_minute = parse_env_value(&val, "FETCHGRID_REQUESTS_PER_MINUTE")?;
        }

        if let Ok(val) = std::env::var("FETCHGRID_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "FETCHGRID_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("FETCHGRID_LOCK_TTL_SECS") {
            let secs: u64 = parse_env_value(&val, "FETCHGRID_LOCK_TTL_SECS")?;
            config.lock_ttl = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("FETCHGRID_FETCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FETCHGRID_FETCH_TIMEOUT_SECS")?;
            config.fetch_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("FETCHGRID_MAX_REDIRECTS") {
            config.max_redirects = parse_env_value(&val, "FETCHGRID_MAX_REDIRECTS")?;
        }

        if let Ok(val) = std::env::var("FETCHGRID_HEALTH_CHECK_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "FETCHGRID_HEALTH_CHECK_INTERVAL_SECS")?;
            config.health_check_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = val;
        }

        config.database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Sets the per-proxy request ceiling.
    pub fn with_requests_per_minute(mut self, ceiling: u32) -> Self {
        self.requests_per_minute = ceiling;
        self
    }

    /// Sets the retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the assignment lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Sets the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_minute == 0 {
            return Err(ConfigError::ValidationFailed(
                "requests_per_minute must be greater than 0".to_string(),
            ));
        }

        if self.rate_window.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "rate_window must be greater than 0".to_string(),
            ));
        }

        if self.lock_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "lock_ttl must be greater than 0".to_string(),
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "fetch_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses an environment variable value with type information in errors.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DistributionConfig::default();

        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.lock_ttl, Duration::from_secs(30));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.health_check_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_config_builder() {
        let config = DistributionConfig::new()
            .with_requests_per_minute(10)
            .with_max_retries(5)
            .with_lock_ttl(Duration::from_secs(15))
            .with_fetch_timeout(Duration::from_secs(5))
            .with_redis_url("redis://cache:6380")
            .with_database_url("postgres://db/grid");

        assert_eq!(config.requests_per_minute, 10);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.lock_ttl, Duration::from_secs(15));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.redis_url, "redis://cache:6380");
        assert_eq!(config.database_url, "postgres://db/grid");
    }

    #[test]
    fn test_config_validation() {
        assert!(DistributionConfig::default().validate().is_ok());

        let config = DistributionConfig::default().with_requests_per_minute(0);
        assert!(config.validate().is_err());

        let config = DistributionConfig::default().with_lock_ttl(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = DistributionConfig::default().with_fetch_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_env_value_error_names_key() {
        let err = parse_env_value::<u32>("not-a-number", "FETCHGRID_MAX_RETRIES")
            .expect_err("parse should fail");
        assert!(err.to_string().contains("FETCHGRID_MAX_RETRIES"));
    }

    #[test]
    fn test_user_agent_is_browser_like() {
        assert!(USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(USER_AGENT.contains("Chrome"));
    }
}
