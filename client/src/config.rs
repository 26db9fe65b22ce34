//! Configuration management for the sync client.

use std::env;
use std::time::Duration;
use stockline_engine::{RetryPolicy, Table};

/// Options that shape a sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Tables refreshed by the pull reconciler, in order
    pub tables: Vec<Table>,
    /// Automatic retries before an entry waits for a manual retry
    pub max_retries: u32,
    /// Ask the server only for records changed since the last pull
    pub incremental_pull: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            tables: Table::DEFAULT_PULL.to_vec(),
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            incremental_pull: false,
        }
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote API
    pub api_url: String,
    /// Bearer credential sent with every request
    pub api_token: String,
    /// SQLite URL of the local store
    pub database_url: String,
    /// Auto-sync timer period
    pub sync_interval: Duration,
    /// Per-request transport timeout, if any
    pub http_timeout: Option<Duration>,
    pub sync: SyncOptions,
}

impl Config {
    pub const DEFAULT_API_URL: &'static str = "http://localhost:5000";
    pub const DEFAULT_DATABASE_URL: &'static str = "sqlite://stockline.db?mode=rwc";
    pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("STOCKLINE_API_URL").unwrap_or_else(|| Self::DEFAULT_API_URL.into());

        let api_token = lookup("STOCKLINE_API_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingApiToken)?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| Self::DEFAULT_DATABASE_URL.into());

        let interval_secs = match lookup("SYNC_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::InvalidInterval(raw))?,
            None => Self::DEFAULT_SYNC_INTERVAL_SECS,
        };

        let http_timeout = match lookup("HTTP_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(
                raw.parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or(ConfigError::InvalidTimeout(raw))?,
            )),
            None => None,
        };

        let max_retries = match lookup("SYNC_MAX_RETRIES") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidMaxRetries(raw))?,
            None => RetryPolicy::DEFAULT_MAX_RETRIES,
        };

        let incremental_pull = match lookup("SYNC_INCREMENTAL_PULL") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidBool {
                key: "SYNC_INCREMENTAL_PULL",
                value: raw,
            })?,
            None => false,
        };

        let tables = match lookup("SYNC_TABLES") {
            Some(raw) => parse_tables(&raw)?,
            None => Table::DEFAULT_PULL.to_vec(),
        };

        Ok(Self {
            api_url,
            api_token,
            database_url,
            sync_interval: Duration::from_secs(interval_secs),
            http_timeout,
            sync: SyncOptions {
                tables,
                max_retries,
                incremental_pull,
            },
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_tables(raw: &str) -> Result<Vec<Table>, ConfigError> {
    let mut tables = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let table = name
            .parse::<Table>()
            .map_err(|_| ConfigError::UnknownTable(name.to_string()))?;
        if !tables.contains(&table) {
            tables.push(table);
        }
    }
    Ok(tables)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("STOCKLINE_API_TOKEN environment variable is required")]
    MissingApiToken,

    #[error("Invalid SYNC_INTERVAL_SECS value: {0}")]
    InvalidInterval(String),

    #[error("Invalid HTTP_TIMEOUT_SECS value: {0}")]
    InvalidTimeout(String),

    #[error("Invalid SYNC_MAX_RETRIES value: {0}")]
    InvalidMaxRetries(String),

    #[error("Invalid {key} value: {value}")]
    InvalidBool { key: &'static str, value: String },

    #[error("Unknown table in SYNC_TABLES: {0}")]
    UnknownTable(String),
}
