//! Database operations for the sync queue.

use super::{from_micros, records, to_micros, LocalStore};
use crate::error::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use stockline_engine::{
    EntryId, Operation, QueueEntry, QueueStatus, ServerId, Table,
};

const COLUMNS: &str =
    "id, operation, table_name, record_id, local_id, payload, timestamp, status, retry_count, error";

/// A stored queue row from the database.
#[derive(Debug)]
struct StoredEntry {
    id: i64,
    operation: String,
    table_name: String,
    record_id: Option<i64>,
    local_id: Option<String>,
    payload: String,
    timestamp: i64,
    status: String,
    retry_count: i64,
    error: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredEntry {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredEntry {
            id: row.try_get("id")?,
            operation: row.try_get("operation")?,
            table_name: row.try_get("table_name")?,
            record_id: row.try_get("record_id")?,
            local_id: row.try_get("local_id")?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("timestamp")?,
            status: row.try_get("status")?,
            retry_count: row.try_get("retry_count")?,
            error: row.try_get("error")?,
        })
    }
}

impl StoredEntry {
    fn into_entry(self) -> Result<QueueEntry> {
        Ok(QueueEntry {
            id: Some(self.id),
            operation: self.operation.parse()?,
            table: self.table_name.parse()?,
            record_id: self.record_id,
            local_id: self.local_id,
            payload: serde_json::from_str(&self.payload)?,
            timestamp: from_micros(self.timestamp)?,
            status: self.status.parse()?,
            retry_count: u32::try_from(self.retry_count).unwrap_or(u32::MAX),
            error: self.error,
        })
    }
}

/// Append an entry. Returns its store-assigned id.
pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &QueueEntry,
) -> Result<EntryId> {
    let payload = serde_json::to_string(&entry.payload)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sync_queue (
            operation, table_name, record_id, local_id, payload,
            timestamp, status, retry_count, error
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id
        "#,
    )
    .bind(entry.operation.as_str())
    .bind(entry.table.name())
    .bind(entry.record_id)
    .bind(entry.local_id.as_deref())
    .bind(payload)
    .bind(to_micros(&entry.timestamp))
    .bind(entry.status.as_str())
    .bind(i64::from(entry.retry_count))
    .bind(entry.error.as_deref())
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

async fn fetch_entries(
    conn: &mut SqliteConnection,
    status: Option<QueueStatus>,
) -> Result<Vec<QueueEntry>> {
    let rows: Vec<StoredEntry> = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {COLUMNS} FROM sync_queue WHERE status = ?1 ORDER BY timestamp ASC, id ASC"
            );
            sqlx::query_as(&sql)
                .bind(status.as_str())
                .fetch_all(&mut *conn)
                .await?
        }
        None => {
            let sql = format!("SELECT {COLUMNS} FROM sync_queue ORDER BY timestamp ASC, id ASC");
            sqlx::query_as(&sql).fetch_all(&mut *conn).await?
        }
    };

    rows.into_iter().map(StoredEntry::into_entry).collect()
}

/// Number of queue entries still referencing a record, by server id or by
/// local id.
async fn references_to(
    conn: &mut SqliteConnection,
    table: Table,
    record_id: Option<ServerId>,
    local_id: Option<&str>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM sync_queue
        WHERE table_name = ?1
          AND ((?2 IS NOT NULL AND record_id = ?2) OR (?3 IS NOT NULL AND local_id = ?3))
        "#,
    )
    .bind(table.name())
    .bind(record_id)
    .bind(local_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

impl LocalStore {
    /// Append an entry to the queue.
    pub async fn enqueue(&self, entry: &QueueEntry) -> Result<EntryId> {
        let mut conn = self.pool.acquire().await?;
        insert_entry(&mut conn, entry).await
    }

    pub async fn queue_entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?1");
        let row: Option<StoredEntry> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(StoredEntry::into_entry).transpose()
    }

    /// Pending entries in transmission order: oldest timestamp first, ties
    /// broken by insertion order.
    pub async fn pending_entries(&self) -> Result<Vec<QueueEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_entries(&mut conn, Some(QueueStatus::Pending)).await
    }

    /// Every queue entry, in transmission order.
    pub async fn queue_entries(&self) -> Result<Vec<QueueEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_entries(&mut conn, None).await
    }

    pub async fn count_by_status(&self, status: QueueStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Move an entry from `from` to `to`. Returns false if the entry no
    /// longer exists or is not in `from`.
    pub async fn set_status(
        &self,
        id: EntryId,
        from: QueueStatus,
        to: QueueStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE sync_queue SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist a failed attempt recorded on `entry`.
    pub async fn fail_entry(&self, entry: &QueueEntry) -> Result<bool> {
        let Some(id) = entry.id else {
            return Ok(false);
        };
        let result = sqlx::query(
            "UPDATE sync_queue SET status = ?1, retry_count = ?2, error = ?3 WHERE id = ?4",
        )
        .bind(entry.status.as_str())
        .bind(i64::from(entry.retry_count))
        .bind(entry.error.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return failed entries still below `max_retries` to pending.
    pub async fn requeue_retryable(&self, max_retries: u32) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sync_queue SET status = 'pending' WHERE status = 'failed' AND retry_count < ?1",
        )
        .bind(i64::from(max_retries))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Manual retry: every failed entry goes back to pending with a fresh
    /// retry budget.
    pub async fn reset_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'pending', retry_count = 0, error = NULL
            WHERE status = 'failed'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Entries left `syncing` by an interrupted process go back to pending.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let result =
            sqlx::query("UPDATE sync_queue SET status = 'pending' WHERE status = 'syncing'")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Whether a CREATE for this local id is still waiting in the queue.
    pub async fn has_pending_create(&self, table: Table, local_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sync_queue
                WHERE operation = 'CREATE' AND table_name = ?1 AND local_id = ?2
            )
            "#,
        )
        .bind(table.name())
        .bind(local_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Whether a DELETE for this server record is still waiting in the queue.
    pub async fn has_pending_delete(&self, table: Table, server_id: ServerId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sync_queue
                WHERE operation = 'DELETE' AND table_name = ?1 AND record_id = ?2
            )
            "#,
        )
        .bind(table.name())
        .bind(server_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Apply an acknowledged transmission in one transaction.
    ///
    /// For a CREATE, `server_id` is the id the server issued: the record is
    /// remapped and queue entries that only knew its local id are rewritten
    /// to carry it. The entry is then removed, and the record is marked
    /// synced unless another queue entry still references it.
    pub async fn complete_entry(
        &self,
        entry: &QueueEntry,
        server_id: Option<ServerId>,
    ) -> Result<()> {
        let Some(id) = entry.id else {
            return Ok(());
        };
        let mut tx = self.begin_write().await?;

        let record_id = match (entry.operation, server_id, entry.local_id.as_deref()) {
            (Operation::Create, Some(server_id), Some(local_id)) => {
                records::remap_record(&mut tx, entry.table, local_id, server_id).await?;

                let rewritten = sqlx::query(
                    r#"
                    UPDATE sync_queue SET record_id = ?1
                    WHERE table_name = ?2 AND local_id = ?3 AND record_id IS NULL AND id != ?4
                    "#,
                )
                .bind(server_id)
                .bind(entry.table.name())
                .bind(local_id)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if rewritten > 0 {
                    tracing::debug!(
                        table = %entry.table,
                        local_id,
                        server_id,
                        rewritten,
                        "Rewrote dependent queue entries"
                    );
                }
                Some(server_id)
            }
            _ => entry.record_id,
        };

        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if entry.operation != Operation::Delete {
            if let Some(record_id) = record_id {
                let outstanding =
                    references_to(&mut tx, entry.table, Some(record_id), entry.local_id.as_deref())
                        .await?;
                if outstanding == 0 {
                    records::mark_synced(&mut tx, entry.table, record_id).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use stockline_engine::{EntityRecord, Fields, RecordRef, RetryPolicy, Timestamp};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn enqueue_and_read_back() {
        let store = LocalStore::in_memory().await.unwrap();
        let entry = QueueEntry::create(
            Table::Products,
            "local_1_abcdefghi".into(),
            fields(json!({"name": "Widget"})),
            t0(),
        );

        let id = store.enqueue(&entry).await.unwrap();
        let loaded = store.queue_entry(id).await.unwrap().unwrap();

        assert_eq!(loaded.id, Some(id));
        assert_eq!(QueueEntry { id: None, ..loaded }, entry);
        assert!(store.queue_entry(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_entries_are_ordered_by_timestamp_then_id() {
        let store = LocalStore::in_memory().await.unwrap();
        let later = QueueEntry::delete(Table::Products, RecordRef::Server(1), t0() + Duration::seconds(5));
        let first = QueueEntry::delete(Table::Products, RecordRef::Server(2), t0());
        let tie = QueueEntry::delete(Table::Products, RecordRef::Server(3), t0());

        store.enqueue(&later).await.unwrap();
        store.enqueue(&first).await.unwrap();
        store.enqueue(&tie).await.unwrap();

        let order: Vec<_> = store
            .pending_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.record_id)
            .collect();
        assert_eq!(order, vec![Some(2), Some(3), Some(1)]);
    }

    #[tokio::test]
    async fn status_transitions_and_counts() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = store
            .enqueue(&QueueEntry::delete(Table::Stock, RecordRef::Server(1), t0()))
            .await
            .unwrap();

        assert!(store.set_status(id, QueueStatus::Pending, QueueStatus::Syncing).await.unwrap());
        assert!(!store.set_status(id, QueueStatus::Pending, QueueStatus::Syncing).await.unwrap());
        assert_eq!(store.count_by_status(QueueStatus::Syncing).await.unwrap(), 1);
        assert_eq!(store.count_by_status(QueueStatus::Pending).await.unwrap(), 0);

        assert_eq!(store.recover_interrupted().await.unwrap(), 1);
        assert_eq!(store.count_by_status(QueueStatus::Pending).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failure_requeue_and_reset() {
        let store = LocalStore::in_memory().await.unwrap();
        let policy = RetryPolicy::default();
        let id = store
            .enqueue(&QueueEntry::delete(Table::Stock, RecordRef::Server(1), t0()))
            .await
            .unwrap();

        let mut entry = store.queue_entry(id).await.unwrap().unwrap();
        policy.record_failure(&mut entry, "HTTP 500: Internal Server Error");
        assert!(store.fail_entry(&entry).await.unwrap());

        // Below the ceiling: re-armed automatically
        assert_eq!(store.requeue_retryable(policy.max_retries).await.unwrap(), 1);

        entry.retry_count = 3;
        assert!(store.fail_entry(&entry).await.unwrap());
        assert_eq!(store.requeue_retryable(policy.max_retries).await.unwrap(), 0);
        assert_eq!(store.count_by_status(QueueStatus::Failed).await.unwrap(), 1);

        assert_eq!(store.reset_failed().await.unwrap(), 1);
        let reset = store.queue_entry(id).await.unwrap().unwrap();
        assert_eq!(reset.status, QueueStatus::Pending);
        assert_eq!(reset.retry_count, 0);
        assert!(reset.error.is_none());
    }

    #[tokio::test]
    async fn pending_create_lookup() {
        let store = LocalStore::in_memory().await.unwrap();
        store
            .enqueue(&QueueEntry::create(Table::Products, "local_a".into(), Fields::new(), t0()))
            .await
            .unwrap();

        assert!(store.has_pending_create(Table::Products, "local_a").await.unwrap());
        assert!(!store.has_pending_create(Table::Products, "local_b").await.unwrap());
        assert!(!store.has_pending_create(Table::Contacts, "local_a").await.unwrap());
    }

    #[tokio::test]
    async fn pending_delete_lookup() {
        let store = LocalStore::in_memory().await.unwrap();
        assert!(!store.has_pending_delete(Table::Products, 42).await.unwrap());

        let mut entry = QueueEntry::delete(Table::Products, RecordRef::Server(42), t0());
        entry.id = Some(store.enqueue(&entry).await.unwrap());
        assert!(store.has_pending_delete(Table::Products, 42).await.unwrap());
        assert!(!store.has_pending_delete(Table::Products, 43).await.unwrap());
        assert!(!store.has_pending_delete(Table::Stock, 42).await.unwrap());

        // A failed DELETE still counts until it is pushed
        RetryPolicy::new(3).record_failure(&mut entry, "HTTP 500");
        store.fail_entry(&entry).await.unwrap();
        assert!(store.has_pending_delete(Table::Products, 42).await.unwrap());
    }

    #[tokio::test]
    async fn completing_a_create_remaps_and_rewrites_dependents() {
        let store = LocalStore::in_memory().await.unwrap();
        let record = EntityRecord::new_local(Table::Products, fields(json!({"name": "Widget"})), t0());
        let local_id = record.local_id.clone().unwrap();
        let key = store.put(&record).await.unwrap();

        let create_id = store
            .enqueue(&QueueEntry::create(
                Table::Products,
                local_id.clone(),
                record.fields.clone(),
                t0(),
            ))
            .await
            .unwrap();
        let update_id = store
            .enqueue(&QueueEntry::update(
                Table::Products,
                RecordRef::Local(local_id.clone()),
                fields(json!({"name": "Widget 2"})),
                t0() + Duration::seconds(1),
            ))
            .await
            .unwrap();

        let create = store.queue_entry(create_id).await.unwrap().unwrap();
        store.complete_entry(&create, Some(42)).await.unwrap();

        let remapped = store.get(Table::Products, key).await.unwrap().unwrap();
        assert_eq!(remapped.server_id, Some(42));
        assert!(remapped.local_id.is_none());
        // The queued update still protects the record from pull
        assert!(!remapped.synced);

        let update = store.queue_entry(update_id).await.unwrap().unwrap();
        assert_eq!(update.target(), Some(RecordRef::Server(42)));
        assert!(store.queue_entry(create_id).await.unwrap().is_none());

        store.complete_entry(&update, None).await.unwrap();
        let synced = store.get(Table::Products, key).await.unwrap().unwrap();
        assert!(synced.synced);
        assert!(store.queue_entries().await.unwrap().is_empty());
    }
}
