//! # Stockline Engine
//!
//! The I/O-free core of the Stockline offline-first inventory client.
//!
//! This crate decides *what* the sync layer does; the `stockline-client` crate
//! performs the actual storage and network work. Every function here is pure
//! over its inputs (time is injected through [`Clock`]), so the whole
//! reconciliation policy is testable without a database or a server.
//!
//! ## Core Concepts
//!
//! ### Tables
//!
//! Every synchronized domain table is a variant of [`Table`]. The name a table
//! is stored under locally is the same segment used in its `/api/{table}`
//! endpoint, and nothing addresses a table through an unchecked string.
//!
//! ### Entity records
//!
//! An [`EntityRecord`] holds domain fields plus the sync attributes:
//! - `server_id` - present once the server has accepted the record
//! - `local_id` - client-generated id for records created offline
//! - `synced` - whether the local contents are known to match the server
//! - `created_at` / `updated_at` - used for last-write-wins comparison
//!
//! ### Sync queue
//!
//! Each local mutation appends a [`QueueEntry`] (CREATE, UPDATE or DELETE).
//! Entries are drained in `(timestamp, id)` order so a CREATE is always
//! transmitted before anything that addresses the record it produces.
//!
//! ### Reconciliation
//!
//! - [`plan_push`] turns a queue entry into a [`RemoteRequest`], or explains
//!   why it cannot be sent yet.
//! - [`decide_pull`] decides how a server record merges into the local store.
//!   A record with a pending local edit (`synced = false`) is never overwritten.
//! - [`RetryPolicy`] bounds automatic retries of failed entries.
//!
//! ## Quick Start
//!
//! ```rust
//! use stockline_engine::{decide_pull, EntityRecord, PullAction, ServerRecord, Table};
//! use chrono::{TimeZone, Utc};
//! use serde_json::json;
//!
//! let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
//! let mut fields = serde_json::Map::new();
//! fields.insert("name".into(), json!("Widget"));
//!
//! // A product created while offline carries a local id and is unsynced.
//! let local = EntityRecord::new_local(Table::Products, fields, now);
//! assert!(local.local_id.is_some());
//! assert!(!local.synced);
//!
//! // A server copy never overwrites a pending local edit.
//! let remote = ServerRecord::from_json(json!({
//!     "id": 42,
//!     "name": "Widget (server)",
//!     "updated_at": "2024-05-02T00:00:00Z"
//! }))
//! .unwrap();
//! assert_eq!(decide_pull(Some(&local), &remote), PullAction::KeepLocalEdit);
//! ```

pub mod clock;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod operation;
pub mod reconcile;
pub mod record;
pub mod table;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{
    Category, Contact, ContactType, Delivery, DeliveryItem, DocumentStatus, Entity, Location,
    Product, Receipt, ReceiptItem, Stock, StockAdjustment, Transfer, TransferItem, Warehouse,
    to_fields,
};
pub use error::Error;
pub use metadata::SyncMetadata;
pub use operation::{Method, Operation, QueueEntry, QueueStatus, RemoteRequest};
pub use reconcile::{decide_pull, plan_push, PullAction, PushPlan, RetryPolicy};
pub use record::{
    generate_local_id, sanitize_fields, server_id_from_response, EntityRecord, RecordRef,
    ServerRecord,
};
pub use table::Table;

/// Type aliases for clarity
pub type ServerId = i64;
pub type LocalId = String;
pub type LocalKey = i64;
pub type EntryId = i64;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
pub type Fields = serde_json::Map<String, serde_json::Value>;
