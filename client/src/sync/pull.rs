//! Pull reconciler: merges server collections into the local store.

use crate::config::SyncOptions;
use crate::db::LocalStore;
use crate::error::Result;
use crate::remote::RemoteApi;
use serde::Serialize;
use stockline_engine::{decide_pull, EntityRecord, PullAction, ServerRecord, Table, Timestamp};

/// Outcome of pulling one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub inserted: usize,
    pub updated: usize,
    /// Server copies ignored because the local record has an unpushed edit
    pub kept_local: usize,
    pub unchanged: usize,
    /// Server records that could not be parsed
    pub skipped: usize,
}

impl PullReport {
    /// Whether the pull changed any local record.
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0
    }
}

pub struct PullReconciler<'a> {
    store: &'a LocalStore,
    remote: &'a dyn RemoteApi,
    options: &'a SyncOptions,
}

impl<'a> PullReconciler<'a> {
    pub fn new(store: &'a LocalStore, remote: &'a dyn RemoteApi, options: &'a SyncOptions) -> Self {
        Self {
            store,
            remote,
            options,
        }
    }

    /// Pull every configured table. A failing table does not stop the rest.
    pub async fn pull_all(&self) -> Vec<(Table, Result<PullReport>)> {
        let mut results = Vec::with_capacity(self.options.tables.len());
        for &table in &self.options.tables {
            let result = self.pull_table(table).await;
            if let Err(e) = &result {
                tracing::warn!(%table, "Pull failed: {}", e);
            }
            results.push((table, result));
        }
        results
    }

    /// Merge the server's copy of `table`.
    ///
    /// A local record with an unpushed edit is never overwritten. The pull
    /// watermark only moves when the server reports something newer, so a
    /// pull with nothing new leaves the store untouched.
    pub async fn pull_table(&self, table: Table) -> Result<PullReport> {
        let mut metadata = self.store.metadata(table).await?;
        let since = if self.options.incremental_pull {
            metadata.last_pull
        } else {
            None
        };

        let items = self.remote.fetch(table, since).await?;
        let mut report = PullReport::default();
        let mut newest: Option<Timestamp> = None;

        for item in items {
            let remote = match ServerRecord::from_json(item) {
                Ok(remote) => remote,
                Err(e) => {
                    tracing::warn!(%table, "Skipping server record: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };
            newest = newest.max(remote.last_modified());
            self.merge(table, remote, &mut report).await?;
        }

        if metadata.observe_pull(newest) {
            self.store.save_metadata(&metadata).await?;
        }

        tracing::debug!(
            %table,
            inserted = report.inserted,
            updated = report.updated,
            kept_local = report.kept_local,
            "Pulled table"
        );
        Ok(report)
    }

    async fn merge(&self, table: Table, remote: ServerRecord, report: &mut PullReport) -> Result<()> {
        let local = self.store.find_by_server_id(table, remote.id).await?;

        match (decide_pull(local.as_ref(), &remote), local) {
            (PullAction::Insert, _) => {
                if self.store.has_pending_delete(table, remote.id).await? {
                    tracing::debug!(%table, server_id = remote.id, "Keeping unpushed local delete");
                    report.kept_local += 1;
                    return Ok(());
                }
                let record = EntityRecord::from_server(table, remote);
                match self.store.insert_from_server(&record).await? {
                    Some(_) => report.inserted += 1,
                    None => report.unchanged += 1,
                }
            }
            (PullAction::Overwrite, Some(mut local)) => {
                let read_updated_at = local.updated_at;
                local.apply_server(remote);
                if self
                    .store
                    .overwrite_from_server(&local, &read_updated_at)
                    .await?
                {
                    report.updated += 1;
                } else {
                    // Edited locally since it was read
                    report.kept_local += 1;
                }
            }
            (PullAction::KeepLocalEdit, _) => {
                tracing::debug!(%table, server_id = remote.id, "Keeping unpushed local edit");
                report.kept_local += 1;
            }
            (PullAction::UpToDate, _) | (PullAction::Overwrite, None) => report.unchanged += 1,
        }
        Ok(())
    }
}
