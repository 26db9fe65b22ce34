//! Unified error handling for the sync client.

use crate::config::ConfigError;
use stockline_engine::{LocalKey, Table};

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Local store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Engine error: {0}")]
    Engine(#[from] stockline_engine::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {table}/{key}")]
    RecordNotFound { table: Table, key: LocalKey },

    #[error("Record {table}/{key} has neither a server id nor a local id")]
    Unaddressable { table: Table, key: LocalKey },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Failures of a single request against the remote API.
    ///
    /// These are recorded on the queue entry and retried; anything else is a
    /// local problem.
    pub fn is_transmission(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Status { .. }
                | Error::MalformedResponse(_)
                | Error::Engine(stockline_engine::Error::MissingServerId)
        )
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
