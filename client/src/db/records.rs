//! Database operations for the entity tables.

use super::{from_micros, to_micros, LocalStore};
use crate::error::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use stockline_engine::{
    Entity, EntityRecord, Fields, LocalId, LocalKey, ServerId, Table, Timestamp,
};

const COLUMNS: &str = "local_key, server_id, local_id, synced, created_at, updated_at, fields";

/// A stored record row from the database.
#[derive(Debug)]
struct StoredRecord {
    local_key: i64,
    server_id: Option<i64>,
    local_id: Option<String>,
    synced: bool,
    created_at: i64,
    updated_at: i64,
    fields: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredRecord {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            local_key: row.try_get("local_key")?,
            server_id: row.try_get("server_id")?,
            local_id: row.try_get("local_id")?,
            synced: row.try_get("synced")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            fields: row.try_get("fields")?,
        })
    }
}

impl StoredRecord {
    fn into_record(self, table: Table) -> Result<EntityRecord> {
        Ok(EntityRecord {
            key: Some(self.local_key),
            table,
            server_id: self.server_id,
            local_id: self.local_id,
            synced: self.synced,
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
            fields: serde_json::from_str::<Fields>(&self.fields)?,
        })
    }
}

async fn fetch_one_where<T>(
    conn: &mut SqliteConnection,
    table: Table,
    column: &str,
    value: T,
) -> Result<Option<EntityRecord>>
where
    T: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Send + 'static,
{
    let sql = format!("SELECT {COLUMNS} FROM {table} WHERE {column} = ?1");
    let row: Option<StoredRecord> = sqlx::query_as(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|r| r.into_record(table)).transpose()
}

pub(crate) async fn fetch_record(
    conn: &mut SqliteConnection,
    table: Table,
    key: LocalKey,
) -> Result<Option<EntityRecord>> {
    fetch_one_where(conn, table, "local_key", key).await
}

pub(crate) async fn fetch_by_server_id(
    conn: &mut SqliteConnection,
    table: Table,
    server_id: ServerId,
) -> Result<Option<EntityRecord>> {
    fetch_one_where(conn, table, "server_id", server_id).await
}

pub(crate) async fn fetch_by_local_id(
    conn: &mut SqliteConnection,
    table: Table,
    local_id: &str,
) -> Result<Option<EntityRecord>> {
    fetch_one_where(conn, table, "local_id", local_id.to_string()).await
}

/// Insert a record, or replace the row with the same key.
pub(crate) async fn write_record(
    conn: &mut SqliteConnection,
    record: &EntityRecord,
) -> Result<LocalKey> {
    let fields = serde_json::to_string(&record.fields)?;
    let table = record.table;

    let sql = format!(
        r#"
        INSERT INTO {table} (local_key, server_id, local_id, synced, created_at, updated_at, fields)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (local_key) DO UPDATE SET
            server_id = excluded.server_id,
            local_id = excluded.local_id,
            synced = excluded.synced,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            fields = excluded.fields
        RETURNING local_key
        "#
    );

    let key: i64 = sqlx::query_scalar(&sql)
        .bind(record.key)
        .bind(record.server_id)
        .bind(record.local_id.as_deref())
        .bind(record.synced)
        .bind(to_micros(&record.created_at))
        .bind(to_micros(&record.updated_at))
        .bind(fields)
        .fetch_one(&mut *conn)
        .await?;

    Ok(key)
}

pub(crate) async fn delete_record(
    conn: &mut SqliteConnection,
    table: Table,
    key: LocalKey,
) -> Result<bool> {
    let sql = format!("DELETE FROM {table} WHERE local_key = ?1");
    let result = sqlx::query(&sql).bind(key).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Insert a record pulled from the server unless one with its server id
/// already exists. Returns the new key, or `None` if the insert lost a race.
pub(crate) async fn insert_pulled(
    conn: &mut SqliteConnection,
    record: &EntityRecord,
) -> Result<Option<LocalKey>> {
    let fields = serde_json::to_string(&record.fields)?;
    let sql = format!(
        r#"
        INSERT INTO {} (server_id, local_id, synced, created_at, updated_at, fields)
        VALUES (?1, NULL, 1, ?2, ?3, ?4)
        ON CONFLICT (server_id) DO NOTHING
        RETURNING local_key
        "#,
        record.table
    );

    let key: Option<i64> = sqlx::query_scalar(&sql)
        .bind(record.server_id)
        .bind(to_micros(&record.created_at))
        .bind(to_micros(&record.updated_at))
        .bind(fields)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(key)
}

/// Overwrite a synced record with the server's copy, provided it has not
/// been edited since `read_updated_at` was observed.
pub(crate) async fn overwrite_pulled(
    conn: &mut SqliteConnection,
    record: &EntityRecord,
    read_updated_at: &Timestamp,
) -> Result<bool> {
    let fields = serde_json::to_string(&record.fields)?;
    let sql = format!(
        r#"
        UPDATE {}
        SET server_id = ?1, local_id = NULL, synced = 1,
            created_at = ?2, updated_at = ?3, fields = ?4
        WHERE local_key = ?5 AND synced = 1 AND updated_at = ?6
        "#,
        record.table
    );

    let result = sqlx::query(&sql)
        .bind(record.server_id)
        .bind(to_micros(&record.created_at))
        .bind(to_micros(&record.updated_at))
        .bind(fields)
        .bind(record.key)
        .bind(to_micros(read_updated_at))
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Give an offline-created record its server id.
///
/// Any other row already holding `server_id` (a copy pulled before the
/// CREATE was acknowledged) is removed first so the unique index holds.
pub(crate) async fn remap_record(
    conn: &mut SqliteConnection,
    table: Table,
    local_id: &str,
    server_id: ServerId,
) -> Result<bool> {
    let sql = format!("DELETE FROM {table} WHERE server_id = ?1 AND local_id IS NOT ?2");
    let removed = sqlx::query(&sql)
        .bind(server_id)
        .bind(local_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if removed > 0 {
        tracing::debug!(%table, server_id, "Dropped pulled duplicate of remapped record");
    }

    let sql = format!("UPDATE {table} SET server_id = ?1, local_id = NULL WHERE local_id = ?2");
    let result = sqlx::query(&sql)
        .bind(server_id)
        .bind(local_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_synced(
    conn: &mut SqliteConnection,
    table: Table,
    server_id: ServerId,
) -> Result<bool> {
    let sql = format!("UPDATE {table} SET synced = 1 WHERE server_id = ?1");
    let result = sqlx::query(&sql).bind(server_id).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

async fn fetch_all(conn: &mut SqliteConnection, table: Table) -> Result<Vec<EntityRecord>> {
    let sql = format!("SELECT {COLUMNS} FROM {table} ORDER BY local_key");
    let rows: Vec<StoredRecord> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
    rows.into_iter().map(|r| r.into_record(table)).collect()
}

impl LocalStore {
    /// Look up a record by its local store key.
    pub async fn get(&self, table: Table, key: LocalKey) -> Result<Option<EntityRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, table, key).await
    }

    /// Write a record to `record.table`, replacing any row with the same key.
    pub async fn put(&self, record: &EntityRecord) -> Result<LocalKey> {
        let mut conn = self.pool.acquire().await?;
        write_record(&mut conn, record).await
    }

    /// Remove a record. Returns whether anything was deleted.
    pub async fn delete(&self, table: Table, key: LocalKey) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        delete_record(&mut conn, table, key).await
    }

    /// All records of `table` matching `predicate`, in key order.
    pub async fn query<F>(&self, table: Table, predicate: F) -> Result<Vec<EntityRecord>>
    where
        F: Fn(&EntityRecord) -> bool,
    {
        let mut conn = self.pool.acquire().await?;
        let records = fetch_all(&mut conn, table).await?;
        Ok(records.into_iter().filter(|r| predicate(r)).collect())
    }

    pub async fn all(&self, table: Table) -> Result<Vec<EntityRecord>> {
        self.query(table, |_| true).await
    }

    pub async fn find_by_server_id(
        &self,
        table: Table,
        server_id: ServerId,
    ) -> Result<Option<EntityRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_server_id(&mut conn, table, server_id).await
    }

    pub async fn find_by_local_id(
        &self,
        table: Table,
        local_id: &LocalId,
    ) -> Result<Option<EntityRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_local_id(&mut conn, table, local_id).await
    }

    /// Insert a record pulled from the server. `None` if a row with its
    /// server id appeared since the caller looked.
    pub async fn insert_from_server(&self, record: &EntityRecord) -> Result<Option<LocalKey>> {
        let mut conn = self.pool.acquire().await?;
        insert_pulled(&mut conn, record).await
    }

    /// Overwrite a synced row with the server's copy. `false` if the row was
    /// edited (or removed) after it was read with `read_updated_at`.
    pub async fn overwrite_from_server(
        &self,
        record: &EntityRecord,
        read_updated_at: &Timestamp,
    ) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        overwrite_pulled(&mut conn, record, read_updated_at).await
    }

    /// Look up and decode a typed entity.
    pub async fn get_entity<E: Entity>(&self, key: LocalKey) -> Result<Option<E>> {
        match self.get(E::TABLE, key).await? {
            Some(record) => Ok(Some(record.decode::<E>()?)),
            None => Ok(None),
        }
    }

    /// Decode every record of `E`'s table that matches `predicate`.
    pub async fn query_entities<E, F>(&self, predicate: F) -> Result<Vec<(EntityRecord, E)>>
    where
        E: Entity,
        F: Fn(&E) -> bool,
    {
        let mut matches = Vec::new();
        for record in self.all(E::TABLE).await? {
            let entity = record.decode::<E>()?;
            if predicate(&entity) {
                matches.push((record, entity));
            }
        }
        Ok(matches)
    }
}
