//! Push reconciler: drains the sync queue against the remote API.

use crate::db::LocalStore;
use crate::error::Result;
use crate::remote::RemoteApi;
use serde::Serialize;
use stockline_engine::{
    plan_push, server_id_from_response, Clock, Operation, PushPlan, QueueEntry, QueueStatus,
    RemoteRequest, RetryPolicy, ServerId,
};

/// Outcome of one push pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    /// Entries acknowledged by the server and removed from the queue
    pub pushed: usize,
    /// Entries whose transmission failed this pass
    pub failed: usize,
    /// Entries waiting for the CREATE of the record they address
    pub deferred: usize,
    /// Failed entries that reached the retry ceiling this pass
    pub exhausted: usize,
}

/// Transmits queue entries one at a time, oldest first.
pub struct PushReconciler<'a> {
    store: &'a LocalStore,
    remote: &'a dyn RemoteApi,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
}

impl<'a> PushReconciler<'a> {
    pub fn new(
        store: &'a LocalStore,
        remote: &'a dyn RemoteApi,
        clock: &'a dyn Clock,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            remote,
            clock,
            policy,
        }
    }

    /// Run one pass over the queue.
    ///
    /// The pending set is read once up front; entries recorded while the
    /// pass runs wait for the next one. Errors from the local store abort
    /// the pass, transmission failures only fail their entry.
    pub async fn push(&self) -> Result<PushReport> {
        let rearmed = self.store.requeue_retryable(self.policy.max_retries).await?;
        if rearmed > 0 {
            tracing::debug!(rearmed, "Re-armed failed entries below the retry ceiling");
        }

        let snapshot = self.store.pending_entries().await?;
        let mut report = PushReport::default();

        for queued in snapshot {
            let Some(id) = queued.id else { continue };
            // An earlier CREATE in this pass may have rewritten the entry
            let Some(entry) = self.store.queue_entry(id).await? else {
                continue;
            };
            if entry.status != QueueStatus::Pending {
                continue;
            }
            self.push_entry(entry, &mut report).await?;
        }

        Ok(report)
    }

    async fn push_entry(&self, entry: QueueEntry, report: &mut PushReport) -> Result<()> {
        let request = match plan_push(&entry) {
            PushPlan::Transmit(request) => request,
            PushPlan::AwaitCreate(local_id) => {
                if self.store.has_pending_create(entry.table, &local_id).await? {
                    tracing::debug!(
                        table = %entry.table,
                        local_id = %local_id,
                        "Deferring entry until its CREATE is acknowledged"
                    );
                    report.deferred += 1;
                    return Ok(());
                }
                let message = format!("{local_id} was never created on the server");
                return self.record_failure(entry, message, report).await;
            }
            PushPlan::Unaddressable => {
                let message = "entry references no record".to_string();
                return self.record_failure(entry, message, report).await;
            }
        };

        let Some(id) = entry.id else { return Ok(()) };
        if !self
            .store
            .set_status(id, QueueStatus::Pending, QueueStatus::Syncing)
            .await?
        {
            return Ok(());
        }

        match self.transmit(&entry, request).await {
            Ok(server_id) => {
                if let Err(e) = self.store.complete_entry(&entry, server_id).await {
                    tracing::error!(entry = id, "Failed to apply acknowledged push: {}", e);
                    let _ = self
                        .store
                        .set_status(id, QueueStatus::Syncing, QueueStatus::Pending)
                        .await;
                    return Err(e);
                }
                report.pushed += 1;
                self.observe_push(&entry).await?;
                Ok(())
            }
            Err(e) if e.is_transmission() => self.record_failure(entry, e.to_string(), report).await,
            Err(e) => {
                let _ = self
                    .store
                    .set_status(id, QueueStatus::Syncing, QueueStatus::Pending)
                    .await;
                Err(e)
            }
        }
    }

    /// Send one request. For a CREATE, returns the id the server issued.
    async fn transmit(
        &self,
        entry: &QueueEntry,
        request: RemoteRequest,
    ) -> Result<Option<ServerId>> {
        tracing::debug!(entry = ?entry.id, %request, "Transmitting");
        let body = self.remote.send(request).await?;

        if entry.operation == Operation::Create {
            Ok(Some(server_id_from_response(&body)?))
        } else {
            Ok(None)
        }
    }

    async fn record_failure(
        &self,
        mut entry: QueueEntry,
        message: String,
        report: &mut PushReport,
    ) -> Result<()> {
        self.policy.record_failure(&mut entry, message);
        self.store.fail_entry(&entry).await?;
        report.failed += 1;

        let error = entry.error.as_deref().unwrap_or_default();
        if self.policy.is_exhausted(&entry) {
            report.exhausted += 1;
            tracing::error!(
                entry = ?entry.id,
                operation = %entry.operation,
                table = %entry.table,
                retry_count = entry.retry_count,
                "Entry exhausted its automatic retries: {}",
                error
            );
        } else {
            tracing::warn!(
                entry = ?entry.id,
                operation = %entry.operation,
                table = %entry.table,
                retry_count = entry.retry_count,
                "Push failed: {}",
                error
            );
        }
        Ok(())
    }

    async fn observe_push(&self, entry: &QueueEntry) -> Result<()> {
        let mut metadata = self.store.metadata(entry.table).await?;
        if metadata.observe_push(self.clock.now()) {
            self.store.save_metadata(&metadata).await?;
        }
        Ok(())
    }
}
