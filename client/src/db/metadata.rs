//! Per-table sync watermarks.

use super::{from_micros, to_micros, LocalStore};
use crate::error::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use stockline_engine::{SyncMetadata, Table};

impl LocalStore {
    /// Watermarks for `table`; empty if it was never synced.
    pub async fn metadata(&self, table: Table) -> Result<SyncMetadata> {
        let row: Option<SqliteRow> = sqlx::query(
            "SELECT last_pull, last_push, last_sync FROM sync_metadata WHERE table_name = ?1",
        )
        .bind(table.name())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(SyncMetadata::new(table));
        };

        let read = |column: &str| -> Result<_> {
            row.try_get::<Option<i64>, _>(column)?
                .map(from_micros)
                .transpose()
        };

        Ok(SyncMetadata {
            table,
            last_pull: read("last_pull")?,
            last_push: read("last_push")?,
            last_sync: read("last_sync")?,
        })
    }

    pub async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (table_name, last_pull, last_push, last_sync)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (table_name) DO UPDATE SET
                last_pull = excluded.last_pull,
                last_push = excluded.last_push,
                last_sync = excluded.last_sync
            "#,
        )
        .bind(metadata.table.name())
        .bind(metadata.last_pull.as_ref().map(to_micros))
        .bind(metadata.last_push.as_ref().map(to_micros))
        .bind(metadata.last_sync.as_ref().map(to_micros))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
