//! Shared local store service used by the sync engine and clients.

use std::path::PathBuf;
use std::sync::Arc;

use libsql::Connection;
use tokio::sync::Mutex;

use crate::db::{
    finish_transaction, Database, LibSqlRecordRepository, LibSqlSyncQueue,
    LibSqlSyncStateRepository, RecordRepository, SyncQueue, SyncStateRepository,
};
use crate::models::{
    EntityPayload, EntityType, LocalId, LocalRecord, NewQueueEntry, Priority, QueueEntry,
    QueueEntryId, ServerId, SyncOperation,
};
use crate::{Error, Result};

/// What happened to a locally deleted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The server knows the record; a delete is queued
    Queued(QueueEntryId),
    /// The server never saw the record; it was removed locally with its queue entries
    Collapsed { removed_entries: u64 },
}

/// Thread-safe handle over the local database: records, sync queue and sync state.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, `None` for in-memory stores.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Fetch a record by local id, including soft-deleted ones.
    pub async fn get_record(&self, id: &LocalId) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection()).get(id).await
    }

    /// List records newest-first.
    pub async fn list_records(
        &self,
        entity_type: Option<EntityType>,
        include_deleted: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list(entity_type, include_deleted, limit, offset)
            .await
    }

    /// Unsynced records that no queue entry will ever push.
    pub async fn needs_attention(&self) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .needs_attention()
            .await
    }

    /// Number of records not yet synced.
    pub async fn count_unsynced(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .count_unsynced()
            .await
    }

    /// Write a new record and queue its create in one transaction.
    ///
    /// Either both land or neither does: a record without its queue entry
    /// could never be synced.
    pub async fn insert_and_enqueue(
        &self,
        record: &LocalRecord,
        priority: Priority,
    ) -> Result<QueueEntryId> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let outcome = Self::insert_and_enqueue_in(conn, record, priority).await;
        let result = finish_transaction(conn, outcome).await;
        if let Err(error) = &result {
            tracing::error!(
                local_id = %record.local_id,
                "Failed to record {} locally: {}",
                record.entity_type(),
                error
            );
        }
        result
    }

    async fn insert_and_enqueue_in(
        conn: &Connection,
        record: &LocalRecord,
        priority: Priority,
    ) -> Result<QueueEntryId> {
        LibSqlRecordRepository::new(conn).insert(record).await?;
        LibSqlSyncQueue::new(conn)
            .enqueue(&NewQueueEntry {
                operation: SyncOperation::Create,
                local_id: record.local_id,
                server_id: None,
                payload: record.payload.clone(),
                modified_at: record.last_modified_at,
                base_modified_at: None,
                priority,
            })
            .await
    }

    /// Replace a record's payload and queue the update in one transaction.
    pub async fn update_and_enqueue(
        &self,
        id: &LocalId,
        payload: &EntityPayload,
        modified_at: i64,
        priority: Priority,
    ) -> Result<(LocalRecord, QueueEntryId)> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let outcome = Self::update_and_enqueue_in(conn, id, payload, modified_at, priority).await;
        finish_transaction(conn, outcome).await
    }

    async fn update_and_enqueue_in(
        conn: &Connection,
        id: &LocalId,
        payload: &EntityPayload,
        modified_at: i64,
        priority: Priority,
    ) -> Result<(LocalRecord, QueueEntryId)> {
        let record = LibSqlRecordRepository::new(conn)
            .update_payload(id, payload, modified_at)
            .await?;
        let entry_id = LibSqlSyncQueue::new(conn)
            .enqueue(&NewQueueEntry {
                operation: SyncOperation::Update,
                local_id: record.local_id,
                server_id: record.server_id,
                payload: record.payload.clone(),
                modified_at,
                base_modified_at: record.remote_modified_at,
                priority,
            })
            .await?;
        Ok((record, entry_id))
    }

    /// Delete a record locally and queue the remote delete when one is needed.
    ///
    /// A record the server never acknowledged is removed outright together
    /// with its pending entries, so no delete of a nonexistent resource is sent.
    pub async fn delete_and_enqueue(
        &self,
        id: &LocalId,
        modified_at: i64,
        priority: Priority,
    ) -> Result<DeleteOutcome> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let outcome = Self::delete_and_enqueue_in(conn, id, modified_at, priority).await;
        finish_transaction(conn, outcome).await
    }

    async fn delete_and_enqueue_in(
        conn: &Connection,
        id: &LocalId,
        modified_at: i64,
        priority: Priority,
    ) -> Result<DeleteOutcome> {
        let records = LibSqlRecordRepository::new(conn);
        let queue = LibSqlSyncQueue::new(conn);

        let record = match records.get(id).await? {
            Some(record) if !record.is_deleted => record,
            _ => return Err(Error::NotFound(format!("record {id}"))),
        };

        if record.server_id.is_none() {
            let removed_entries = queue.remove_for(id).await?;
            records.purge(id).await?;
            tracing::debug!(
                local_id = %id,
                removed_entries,
                "Collapsed delete of a record the server never saw"
            );
            return Ok(DeleteOutcome::Collapsed { removed_entries });
        }

        let record = records.mark_deleted(id, modified_at).await?;
        let entry_id = queue
            .enqueue(&NewQueueEntry {
                operation: SyncOperation::Delete,
                local_id: record.local_id,
                server_id: record.server_id,
                payload: record.payload.clone(),
                modified_at,
                base_modified_at: record.remote_modified_at,
                priority,
            })
            .await?;
        Ok(DeleteOutcome::Queued(entry_id))
    }

    /// Record a successful push of the snapshot stamped `pushed_modified_at`.
    pub async fn mark_pushed(
        &self,
        id: &LocalId,
        server_id: ServerId,
        pushed_modified_at: i64,
        remote_modified_at: i64,
        payload: Option<&EntityPayload>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .mark_pushed(id, server_id, pushed_modified_at, remote_modified_at, payload)
            .await
    }

    /// Overwrite a record with the server's version.
    pub async fn apply_remote(
        &self,
        id: &LocalId,
        server_id: ServerId,
        payload: &EntityPayload,
        remote_modified_at: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .apply_remote(id, server_id, payload, remote_modified_at)
            .await
    }

    /// Remove a record for good (after its remote delete succeeded).
    pub async fn purge_record(&self, id: &LocalId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection()).purge(id).await
    }

    /// Recompute `synced` for records whose queue entries are all gone.
    pub async fn reconcile_unsynced(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .reconcile_unsynced()
            .await
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Append a queue entry.
    pub async fn enqueue(&self, entry: &NewQueueEntry) -> Result<QueueEntryId> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection()).enqueue(entry).await
    }

    /// Entries still within `max_attempts`, in processing order.
    pub async fn list_pending(&self, max_attempts: u32) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection())
            .list_pending(max_attempts)
            .await
    }

    /// Entries at or above `max_attempts`.
    pub async fn list_exhausted(&self, max_attempts: u32) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection())
            .list_exhausted(max_attempts)
            .await
    }

    /// Every queue entry.
    pub async fn list_queue(&self) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection()).list_all().await
    }

    /// Queue entries for one record, in enqueue order.
    pub async fn pending_for(&self, id: &LocalId) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection()).pending_for(id).await
    }

    /// Fetch one queue entry.
    pub async fn queue_entry(&self, id: QueueEntryId) -> Result<Option<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection()).get(id).await
    }

    /// Bump an entry's attempt count, returning the new count.
    pub async fn increment_attempt(&self, id: QueueEntryId, error: Option<&str>) -> Result<u32> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection())
            .increment_attempt(id, error)
            .await
    }

    /// Remove a queue entry (no-op when already gone).
    pub async fn remove_entry(&self, id: QueueEntryId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection()).remove(id).await
    }

    /// Rebase entries queued after `after` for the same record.
    pub async fn rebase_after(
        &self,
        id: &LocalId,
        after: QueueEntryId,
        server_id: ServerId,
        base_modified_at: i64,
    ) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection())
            .rebase_after(id, after, server_id, base_modified_at)
            .await
    }

    /// Remove entries at or above `max_attempts`.
    pub async fn clear_exhausted(&self, max_attempts: u32) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection())
            .clear_exhausted(max_attempts)
            .await
    }

    /// Total queue entries, read straight from storage.
    pub async fn queue_count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlSyncQueue::new(db.connection()).count().await
    }

    // -----------------------------------------------------------------------
    // Sync state
    // -----------------------------------------------------------------------

    /// Completion time of the last finished sync cycle.
    pub async fn last_sync_at(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .last_sync_at()
            .await
    }

    /// Persist the completion time of a sync cycle.
    pub async fn set_last_sync_at(&self, timestamp: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .set_last_sync_at(timestamp)
            .await
    }
}
