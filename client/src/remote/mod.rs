//! Remote API collaborator.

mod http;

pub use http::HttpRemote;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use stockline_engine::{RemoteRequest, Table, Timestamp};

/// The server the sync engine reconciles against.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Transmit one queue entry. Returns the response body, `Null` if empty.
    async fn send(&self, request: RemoteRequest) -> Result<Value>;

    /// Fetch a table's collection, optionally only records changed after
    /// `since`.
    async fn fetch(&self, table: Table, since: Option<Timestamp>) -> Result<Vec<Value>>;
}
