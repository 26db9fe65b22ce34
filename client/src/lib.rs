//! # Stockline Client
//!
//! Offline-first sync client for the Stockline inventory API.
//!
//! The client keeps a local SQLite mirror of the server's tables. All writes
//! go through the [`MutationRecorder`], which updates the mirror and records
//! a queue entry in one transaction. The [`SyncEngine`] later pushes queued
//! entries to the server in order and pulls server changes back without
//! overwriting local edits that have not been pushed yet.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockline_client::{
//!     Connectivity, HttpRemote, LocalStore, MutationRecorder, Scheduler, SyncEngine, SyncOptions,
//! };
//!
//! # async fn run() -> stockline_client::Result<()> {
//! let store = LocalStore::open("sqlite://stockline.db?mode=rwc").await?;
//! let remote = Arc::new(HttpRemote::new("http://localhost:5000", "token", None)?);
//! let engine = Arc::new(SyncEngine::with_system_clock(
//!     store.clone(),
//!     remote,
//!     SyncOptions::default(),
//! ));
//!
//! let recorder = MutationRecorder::with_system_clock(store);
//! let mut fields = serde_json::Map::new();
//! fields.insert("name".into(), "Widget".into());
//! recorder.create(stockline_client::Table::Products, fields).await?;
//!
//! let connectivity = Connectivity::new(true);
//! let mut scheduler = Scheduler::new(engine, connectivity.subscribe());
//! scheduler.start(stockline_client::DEFAULT_SYNC_INTERVAL);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod recorder;
pub mod remote;
pub mod sync;

pub use config::{Config, ConfigError, SyncOptions};
pub use db::LocalStore;
pub use error::{Error, Result};
pub use recorder::MutationRecorder;
pub use remote::{HttpRemote, RemoteApi};
pub use sync::{
    Connectivity, PullReconciler, PullReport, PushReconciler, PushReport, Scheduler, SkipReason,
    SyncEngine, SyncOutcome, SyncReport, DEFAULT_SYNC_INTERVAL,
};

pub use stockline_engine::Table;
