//! Durable sync queue implementation

use crate::error::{Error, Result};
use crate::models::{
    EntityPayload, EntityType, LocalId, NewQueueEntry, Priority, QueueEntry, QueueEntryId,
    ServerId,
};
use crate::util::now_millis;
use libsql::{params, Connection, Row};

const QUEUE_COLUMNS: &str = "id, entity_type, action, local_id, server_id, payload, modified_at, \
                             base_modified_at, attempts, last_attempt_at, last_error, created_at, \
                             priority";

// Row ids are the enqueue order; `created_at` follows the device clock
const QUEUE_ORDER: &str = "ORDER BY priority ASC, id ASC";

/// Ordered, durable list of pending mutation intents (async)
#[allow(async_fn_in_trait)]
pub trait SyncQueue {
    /// Append an entry with zero attempts; returns its id
    async fn enqueue(&self, entry: &NewQueueEntry) -> Result<QueueEntryId>;

    /// Entries below `max_attempts`, by priority then FIFO
    async fn list_pending(&self, max_attempts: u32) -> Result<Vec<QueueEntry>>;

    /// Entries at or above `max_attempts`
    async fn list_exhausted(&self, max_attempts: u32) -> Result<Vec<QueueEntry>>;

    /// Every entry, in processing order
    async fn list_all(&self) -> Result<Vec<QueueEntry>>;

    /// Entries for one local record, in enqueue order
    async fn pending_for(&self, local_id: &LocalId) -> Result<Vec<QueueEntry>>;

    /// Fetch one entry
    async fn get(&self, id: QueueEntryId) -> Result<Option<QueueEntry>>;

    /// Bump the attempt count and stamp the attempt; returns the new count
    async fn increment_attempt(&self, id: QueueEntryId, error: Option<&str>) -> Result<u32>;

    /// Remove an entry. Removing a missing entry is a no-op.
    async fn remove(&self, id: QueueEntryId) -> Result<()>;

    /// Remove every entry for one local record; returns how many went
    async fn remove_for(&self, local_id: &LocalId) -> Result<u64>;

    /// Point entries queued after `after` for the same record at the
    /// server version our own push just produced
    async fn rebase_after(
        &self,
        local_id: &LocalId,
        after: QueueEntryId,
        server_id: ServerId,
        base_modified_at: i64,
    ) -> Result<u64>;

    /// Remove entries at or above `max_attempts`; returns how many went
    async fn clear_exhausted(&self, max_attempts: u32) -> Result<u64>;

    /// Total entries currently stored
    async fn count(&self) -> Result<u64>;
}

/// libSQL implementation of `SyncQueue`
pub struct LibSqlSyncQueue<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncQueue<'a> {
    /// Create a new queue view over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue entry from a database row
    fn parse_entry(row: &Row) -> Result<QueueEntry> {
        let entity_type: String = row.get(1)?;
        let entity_type: EntityType = entity_type.parse().map_err(Error::Database)?;
        let action: String = row.get(2)?;
        let local_id: String = row.get(3)?;
        let payload: String = row.get(5)?;
        let attempts: i64 = row.get(8)?;

        Ok(QueueEntry {
            id: QueueEntryId(row.get(0)?),
            entity_type,
            operation: action.parse().map_err(Error::Database)?,
            local_id: local_id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid local id '{local_id}'")))?,
            server_id: row.get::<Option<i64>>(4)?.map(ServerId),
            payload: EntityPayload::from_json(entity_type, &payload)?,
            modified_at: row.get(6)?,
            base_modified_at: row.get::<Option<i64>>(7)?,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            last_attempt_at: row.get::<Option<i64>>(9)?,
            last_error: row.get::<Option<String>>(10)?,
            created_at: row.get(11)?,
            priority: Priority::from_rank(row.get(12)?),
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<QueueEntry>> {
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

impl SyncQueue for LibSqlSyncQueue<'_> {
    async fn enqueue(&self, entry: &NewQueueEntry) -> Result<QueueEntryId> {
        let mut rows = self
            .conn
            .query(
                "INSERT INTO sync_queue (entity_type, action, local_id, server_id, payload,
                                         modified_at, base_modified_at, attempts, created_at, priority)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                 RETURNING id",
                params![
                    entry.entity_type().as_str(),
                    entry.operation.as_str(),
                    entry.local_id.as_str(),
                    entry.server_id.map(|id| id.0),
                    entry.payload.to_json()?,
                    entry.modified_at,
                    entry.base_modified_at,
                    now_millis(),
                    entry.priority.rank()
                ],
            )
            .await?;

        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::Database("enqueue returned no id".into()))?;
        let id = QueueEntryId(row.get(0)?);

        tracing::debug!(
            entry_id = %id,
            entity = %entry.entity_type(),
            operation = %entry.operation,
            local_id = %entry.local_id,
            "Enqueued sync entry"
        );
        Ok(id)
    }

    async fn list_pending(&self, max_attempts: u32) -> Result<Vec<QueueEntry>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE attempts < ? {QUEUE_ORDER}"),
                [i64::from(max_attempts)],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_exhausted(&self, max_attempts: u32) -> Result<Vec<QueueEntry>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE attempts >= ? {QUEUE_ORDER}"),
                [i64::from(max_attempts)],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_all(&self) -> Result<Vec<QueueEntry>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue {QUEUE_ORDER}"),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    async fn pending_for(&self, local_id: &LocalId) -> Result<Vec<QueueEntry>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE local_id = ? ORDER BY id ASC"),
                [local_id.as_str()],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn get(&self, id: QueueEntryId) -> Result<Option<QueueEntry>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?"),
                [id.0],
            )
            .await?;
        Ok(Self::collect(rows).await?.into_iter().next())
    }

    async fn increment_attempt(&self, id: QueueEntryId, error: Option<&str>) -> Result<u32> {
        // Single statement: the read-modify-write cannot interleave
        let mut rows = self
            .conn
            .query(
                "UPDATE sync_queue
                 SET attempts = attempts + 1, last_attempt_at = ?, last_error = ?
                 WHERE id = ?
                 RETURNING attempts",
                params![now_millis(), error.map(str::to_string), id.0],
            )
            .await?;

        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::NotFound(format!("queue entry {id}")))?;
        let attempts: i64 = row.get(0)?;
        Ok(u32::try_from(attempts).unwrap_or(u32::MAX))
    }

    async fn remove(&self, id: QueueEntryId) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_queue WHERE id = ?", [id.0])
            .await?;
        Ok(())
    }

    async fn remove_for(&self, local_id: &LocalId) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE local_id = ?",
                [local_id.as_str()],
            )
            .await?;
        Ok(removed)
    }

    async fn rebase_after(
        &self,
        local_id: &LocalId,
        after: QueueEntryId,
        server_id: ServerId,
        base_modified_at: i64,
    ) -> Result<u64> {
        let rebased = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET server_id = COALESCE(server_id, ?1),
                     base_modified_at = MAX(COALESCE(base_modified_at, 0), ?2)
                 WHERE local_id = ?3 AND id > ?4",
                params![server_id.0, base_modified_at, local_id.as_str(), after.0],
            )
            .await?;
        Ok(rebased)
    }

    async fn clear_exhausted(&self, max_attempts: u32) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE attempts >= ?",
                [i64::from(max_attempts)],
            )
            .await?;
        Ok(removed)
    }

    async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
