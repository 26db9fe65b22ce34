//! Sync engine: push-then-pull reconciliation cycles.
//!
//! [`SyncEngine`] is constructed explicitly by whoever composes the
//! application and owns the two pieces of in-memory state the cycle needs:
//! the `online` flag and the `syncing` flag. At most one cycle runs at a
//! time; a cycle requested while another is running is skipped, not queued.

mod pull;
mod push;
pub mod scheduler;

pub use pull::{PullReconciler, PullReport};
pub use push::{PushReconciler, PushReport};
pub use scheduler::{Connectivity, Scheduler, DEFAULT_SYNC_INTERVAL};

use crate::config::SyncOptions;
use crate::db::LocalStore;
use crate::error::Result;
use crate::remote::RemoteApi;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use stockline_engine::{Clock, QueueStatus, RetryPolicy, SystemClock, Table};

/// Why a requested cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
}

/// Result of [`SyncEngine::sync_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped(_) => None,
        }
    }
}

/// What one completed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub push: PushReport,
    /// Tables pulled successfully
    pub pulled: Vec<(Table, PullReport)>,
    /// Errors that cut a push pass or a table's pull short
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.push.failed == 0
    }
}

/// Holds the `syncing` flag for the lifetime of a cycle.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    online: AtomicBool,
    syncing: AtomicBool,
}

impl SyncEngine {
    /// A new engine. It starts out online.
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            remote,
            clock,
            options,
            online: AtomicBool::new(true),
            syncing: AtomicBool::new(false),
        }
    }

    pub fn with_system_clock(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        options: SyncOptions,
    ) -> Self {
        Self::new(store, remote, Arc::new(SystemClock), options)
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn push_reconciler(&self) -> PushReconciler<'_> {
        PushReconciler::new(
            &self.store,
            self.remote.as_ref(),
            self.clock.as_ref(),
            RetryPolicy::new(self.options.max_retries),
        )
    }

    pub fn pull_reconciler(&self) -> PullReconciler<'_> {
        PullReconciler::new(&self.store, self.remote.as_ref(), &self.options)
    }

    /// Run one push-then-pull cycle.
    ///
    /// Never fails: per-entry and per-table errors are recorded in the
    /// report, and the `syncing` flag is always released.
    pub async fn sync_all(&self) -> SyncOutcome {
        if !self.is_online() {
            tracing::debug!("Offline, skipping sync");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            tracing::debug!("Sync already in progress, skipping");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        };

        tracing::info!("Sync started");
        let started = Instant::now();
        let mut report = SyncReport::default();

        match self.push_reconciler().push().await {
            Ok(push) => report.push = push,
            Err(e) => {
                tracing::error!("Push aborted: {}", e);
                report.errors.push(format!("push: {e}"));
            }
        }

        for (table, result) in self.pull_reconciler().pull_all().await {
            match result {
                Ok(pulled) => report.pulled.push((table, pulled)),
                Err(e) => report.errors.push(format!("pull {table}: {e}")),
            }
        }

        tracing::info!(
            pushed = report.push.pushed,
            failed = report.push.failed,
            deferred = report.push.deferred,
            tables = report.pulled.len(),
            errors = report.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync completed"
        );
        SyncOutcome::Completed(report)
    }

    /// Give every failed entry a fresh retry budget, then push them if the
    /// engine is online and idle. Returns how many entries were reset.
    pub async fn retry_failed(&self) -> Result<u64> {
        let reset = self.store.reset_failed().await?;
        tracing::info!(reset, "Reset failed entries for retry");

        if !self.is_online() {
            return Ok(reset);
        }
        match SyncGuard::acquire(&self.syncing) {
            Some(_guard) => {
                if let Err(e) = self.push_reconciler().push().await {
                    tracing::error!("Retry push aborted: {}", e);
                }
            }
            None => tracing::debug!("Sync in progress, retried entries wait for the next cycle"),
        }
        Ok(reset)
    }

    pub async fn pending_count(&self) -> Result<u64> {
        self.store.count_by_status(QueueStatus::Pending).await
    }

    pub async fn failed_count(&self) -> Result<u64> {
        self.store.count_by_status(QueueStatus::Failed).await
    }

    /// Update the connectivity flag. Returns whether it changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::AcqRel) != online
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }
}
