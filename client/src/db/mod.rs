//! SQLite local durable store.
//!
//! One table per [`Table`](stockline_engine::Table) plus `sync_queue` and
//! `sync_metadata`. Every single-record operation is atomic; the few places
//! that must touch several rows at once (recording a mutation, completing a
//! push) run inside one transaction.

mod metadata;
mod pool;
mod queue;
mod records;

pub(crate) use queue::insert_entry;
pub(crate) use records::{delete_record, fetch_record, write_record};
pub use pool::LocalStore;

use crate::error::Result;
use chrono::DateTime;
use stockline_engine::Timestamp;

/// Timestamps are stored as microseconds, matching Postgres precision.
pub(crate) fn to_micros(t: &Timestamp) -> i64 {
    t.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Result<Timestamp> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        stockline_engine::Error::InvalidValue {
            kind: "timestamp",
            value: micros.to_string(),
        }
        .into()
    })
}
