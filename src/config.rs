//! Configuration module
//!
//! Loads configuration from environment variables.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::runtime::ConsumerConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL. Without one every back-end runs in memory.
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// How long a settlement lease lives if never released
    pub settlement_lease_ttl_secs: u64,

    /// Currency assigned to new payments
    pub default_currency: String,

    /// Partitions per event log topic
    pub log_partitions: u32,

    pub consumer_poll_interval_ms: u64,
    pub consumer_batch_size: usize,
    pub consumer_backoff_base_ms: u64,
    pub consumer_backoff_max_ms: u64,

    /// Spending above this amount is flagged as anomalous
    pub anomaly_threshold: Decimal,
}

fn parse_or<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", "10")?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_or("PORT", "3000")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        if environment == "production" && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let settlement_lease_ttl_secs: u64 = parse_or("SETTLEMENT_LEASE_TTL_SECS", "30")?;
        if settlement_lease_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue("SETTLEMENT_LEASE_TTL_SECS"));
        }

        let default_currency = env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "KRW".to_string());
        if default_currency.len() != 3 {
            return Err(ConfigError::InvalidValue("DEFAULT_CURRENCY"));
        }

        let log_partitions: u32 = parse_or("LOG_PARTITIONS", "8")?;
        if log_partitions == 0 {
            return Err(ConfigError::InvalidValue("LOG_PARTITIONS"));
        }

        let consumer_poll_interval_ms = parse_or("CONSUMER_POLL_INTERVAL_MS", "200")?;

        let consumer_batch_size: usize = parse_or("CONSUMER_BATCH_SIZE", "16")?;
        if consumer_batch_size == 0 {
            return Err(ConfigError::InvalidValue("CONSUMER_BATCH_SIZE"));
        }

        let consumer_backoff_base_ms = parse_or("CONSUMER_BACKOFF_BASE_MS", "100")?;
        let consumer_backoff_max_ms = parse_or("CONSUMER_BACKOFF_MAX_MS", "30000")?;

        let anomaly_threshold = parse_or("ANOMALY_THRESHOLD", "100000")?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            settlement_lease_ttl_secs,
            default_currency,
            log_partitions,
            consumer_poll_interval_ms,
            consumer_batch_size,
            consumer_backoff_base_ms,
            consumer_backoff_max_ms,
            anomaly_threshold,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn settlement_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.settlement_lease_ttl_secs)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            poll_interval: Duration::from_millis(self.consumer_poll_interval_ms),
            batch_size: self.consumer_batch_size,
            backoff_base: Duration::from_millis(self.consumer_backoff_base_ms),
            backoff_max: Duration::from_millis(self.consumer_backoff_max_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: "development".to_string(),
            settlement_lease_ttl_secs: 30,
            default_currency: "KRW".to_string(),
            log_partitions: 8,
            consumer_poll_interval_ms: 200,
            consumer_batch_size: 16,
            consumer_backoff_base_ms: 100,
            consumer_backoff_max_ms: 30_000,
            anomaly_threshold: Decimal::from(100_000),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
