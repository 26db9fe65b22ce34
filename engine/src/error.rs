//! Error types for the Stockline engine.

use thiserror::Error;

/// All possible errors from the Stockline engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Registry errors
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    // Server data errors
    #[error("malformed server record: {0}")]
    MalformedRecord(String),

    #[error("server response did not include an id")]
    MissingServerId,

    // Entity errors
    #[error("entity for table '{table}' must serialize to a JSON object")]
    NotAnObject { table: String },

    #[error("entity decode failed: {0}")]
    Decode(String),
}

impl Error {
    pub(crate) fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        Error::InvalidValue {
            kind,
            value: value.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
