//! Mutation recorder: the only write path for domain tables.
//!
//! Each mutation writes the local record and appends the matching queue
//! entry in one transaction, so a change is never visible locally without
//! also being scheduled for the server. Nothing here touches the network.

use crate::db::{self, LocalStore};
use crate::error::{Error, Result};
use std::sync::Arc;
use stockline_engine::{
    generate_local_id, sanitize_fields, to_fields, Clock, Entity, EntityRecord, Fields, LocalKey,
    QueueEntry, SystemClock, Table,
};

#[derive(Clone)]
pub struct MutationRecorder {
    store: LocalStore,
    clock: Arc<dyn Clock>,
}

impl MutationRecorder {
    pub fn new(store: LocalStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn with_system_clock(store: LocalStore) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Create a record offline. Returns its local store key.
    pub async fn create(&self, table: Table, fields: Fields) -> Result<LocalKey> {
        let now = self.clock.now();
        let local_id = generate_local_id(now);
        let record = EntityRecord::with_local_id(table, local_id.clone(), fields, now);
        let entry = QueueEntry::create(table, local_id, record.fields.clone(), now);

        let mut tx = self.store.begin_write().await?;
        let key = db::write_record(&mut tx, &record).await?;
        let entry_id = db::insert_entry(&mut tx, &entry).await?;
        tx.commit().await?;

        tracing::debug!(%table, key, entry_id, "Recorded CREATE");
        Ok(key)
    }

    /// Merge `changes` into an existing record.
    ///
    /// Sync-layer keys are ignored; a change set that is empty after that
    /// writes and enqueues nothing.
    pub async fn update(&self, table: Table, key: LocalKey, changes: Fields) -> Result<()> {
        let changes = sanitize_fields(changes);
        if changes.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();

        let mut tx = self.store.begin_write().await?;
        let mut record = db::fetch_record(&mut tx, table, key)
            .await?
            .ok_or(Error::RecordNotFound { table, key })?;
        let target = record
            .reference()
            .ok_or(Error::Unaddressable { table, key })?;

        record.apply_changes(&changes, now);
        db::write_record(&mut tx, &record).await?;
        let entry_id = db::insert_entry(&mut tx, &QueueEntry::update(table, target, changes, now))
            .await?;
        tx.commit().await?;

        tracing::debug!(%table, key, entry_id, "Recorded UPDATE");
        Ok(())
    }

    /// Remove a record locally and schedule its removal on the server.
    pub async fn delete(&self, table: Table, key: LocalKey) -> Result<()> {
        let now = self.clock.now();

        let mut tx = self.store.begin_write().await?;
        let record = db::fetch_record(&mut tx, table, key)
            .await?
            .ok_or(Error::RecordNotFound { table, key })?;
        let target = record
            .reference()
            .ok_or(Error::Unaddressable { table, key })?;

        db::delete_record(&mut tx, table, key).await?;
        let entry_id = db::insert_entry(&mut tx, &QueueEntry::delete(table, target, now)).await?;
        tx.commit().await?;

        tracing::debug!(%table, key, entry_id, "Recorded DELETE");
        Ok(())
    }

    /// Create a typed entity offline.
    pub async fn create_entity<E: Entity>(&self, entity: &E) -> Result<LocalKey> {
        self.create(E::TABLE, to_fields(entity)?).await
    }
}
