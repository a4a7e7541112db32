//! Local record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{EntityPayload, EntityType, LocalId, LocalRecord, ServerId};
use libsql::{params, Connection, Row};

const RECORD_COLUMNS: &str = "local_id, entity_type, server_id, payload, synced, is_deleted, \
                              created_at, last_modified_at, remote_modified_at";

/// Trait for local record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Insert a new record
    async fn insert(&self, record: &LocalRecord) -> Result<()>;

    /// Get a record by local ID, including soft-deleted ones
    async fn get(&self, id: &LocalId) -> Result<Option<LocalRecord>>;

    /// List records newest first, optionally filtered by type
    async fn list(
        &self,
        entity_type: Option<EntityType>,
        include_deleted: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LocalRecord>>;

    /// Replace a live record's payload and flag it unsynced
    async fn update_payload(
        &self,
        id: &LocalId,
        payload: &EntityPayload,
        modified_at: i64,
    ) -> Result<LocalRecord>;

    /// Soft delete a live record and flag it unsynced
    async fn mark_deleted(&self, id: &LocalId, modified_at: i64) -> Result<LocalRecord>;

    /// Record a successful push.
    ///
    /// Sets the server id (first create only) and the observed remote
    /// timestamp. The record is flagged synced only when no local edit
    /// happened after `pushed_modified_at`.
    async fn mark_pushed(
        &self,
        id: &LocalId,
        server_id: ServerId,
        pushed_modified_at: i64,
        remote_modified_at: i64,
        payload: Option<&EntityPayload>,
    ) -> Result<()>;

    /// Overwrite a record with the server's version and flag it synced
    async fn apply_remote(
        &self,
        id: &LocalId,
        server_id: ServerId,
        payload: &EntityPayload,
        remote_modified_at: i64,
    ) -> Result<()>;

    /// Remove a record for good
    async fn purge(&self, id: &LocalId) -> Result<()>;

    /// Recompute `synced` for unsynced records with no queue entries left.
    ///
    /// Returns the number of records flagged synced.
    async fn reconcile_unsynced(&self) -> Result<u64>;

    /// Unsynced records with no pending queue entry
    async fn needs_attention(&self) -> Result<Vec<LocalRecord>>;

    /// Number of records not yet synced
    async fn count_unsynced(&self) -> Result<u64>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &Row) -> Result<LocalRecord> {
        let local_id: String = row.get(0)?;
        let entity_type: String = row.get(1)?;
        let entity_type: EntityType = entity_type.parse().map_err(Error::Database)?;
        let payload: String = row.get(3)?;

        Ok(LocalRecord {
            local_id: local_id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid local id '{local_id}'")))?,
            server_id: row.get::<Option<i64>>(2)?.map(ServerId),
            payload: EntityPayload::from_json(entity_type, &payload)?,
            synced: row.get::<i32>(4)? != 0,
            is_deleted: row.get::<i32>(5)? != 0,
            created_at: row.get(6)?,
            last_modified_at: row.get(7)?,
            remote_modified_at: row.get::<Option<i64>>(8)?,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<LocalRecord>> {
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn require_live(&self, id: &LocalId) -> Result<LocalRecord> {
        match self.get(id).await? {
            Some(record) if !record.is_deleted => Ok(record),
            _ => Err(Error::NotFound(format!("record {id}"))),
        }
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn insert(&self, record: &LocalRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO records (local_id, entity_type, server_id, payload, synced, is_deleted,
                                      created_at, last_modified_at, remote_modified_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.local_id.as_str(),
                    record.entity_type().as_str(),
                    record.server_id.map(|id| id.0),
                    record.payload.to_json()?,
                    i32::from(record.synced),
                    i32::from(record.is_deleted),
                    record.created_at,
                    record.last_modified_at,
                    record.remote_modified_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &LocalId) -> Result<Option<LocalRecord>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE local_id = ?"),
                [id.as_str()],
            )
            .await?;

        Ok(Self::collect(rows).await?.into_iter().next())
    }

    async fn list(
        &self,
        entity_type: Option<EntityType>,
        include_deleted: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LocalRecord>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE (?1 IS NULL OR entity_type = ?1)
                       AND (?2 = 1 OR is_deleted = 0)
                     ORDER BY created_at DESC, local_id DESC
                     LIMIT ?3 OFFSET ?4"
                ),
                params![
                    entity_type.map(|entity| entity.as_str().to_string()),
                    i32::from(include_deleted),
                    limit as i64,
                    offset as i64
                ],
            )
            .await?;

        Self::collect(rows).await
    }

    async fn update_payload(
        &self,
        id: &LocalId,
        payload: &EntityPayload,
        modified_at: i64,
    ) -> Result<LocalRecord> {
        let existing = self.require_live(id).await?;
        payload.expect_type(existing.entity_type())?;

        self.conn
            .execute(
                "UPDATE records SET payload = ?, synced = 0, last_modified_at = ?
                 WHERE local_id = ? AND is_deleted = 0",
                params![payload.to_json()?, modified_at, id.as_str()],
            )
            .await?;

        self.require_live(id).await
    }

    async fn mark_deleted(&self, id: &LocalId, modified_at: i64) -> Result<LocalRecord> {
        let rows = self
            .conn
            .execute(
                "UPDATE records SET is_deleted = 1, synced = 0, last_modified_at = ?
                 WHERE local_id = ? AND is_deleted = 0",
                params![modified_at, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("record {id}")))
    }

    async fn mark_pushed(
        &self,
        id: &LocalId,
        server_id: ServerId,
        pushed_modified_at: i64,
        remote_modified_at: i64,
        payload: Option<&EntityPayload>,
    ) -> Result<()> {
        let payload = payload.map(EntityPayload::to_json).transpose()?;

        self.conn
            .execute(
                "UPDATE records
                 SET server_id = COALESCE(server_id, ?1),
                     remote_modified_at = ?2,
                     payload = CASE WHEN ?4 IS NOT NULL AND last_modified_at <= ?3
                                    THEN ?4 ELSE payload END,
                     synced = CASE WHEN last_modified_at <= ?3 THEN 1 ELSE synced END
                 WHERE local_id = ?5",
                params![
                    server_id.0,
                    remote_modified_at,
                    pushed_modified_at,
                    payload,
                    id.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn apply_remote(
        &self,
        id: &LocalId,
        server_id: ServerId,
        payload: &EntityPayload,
        remote_modified_at: i64,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE records
                 SET server_id = ?, payload = ?, synced = 1, is_deleted = 0,
                     last_modified_at = ?, remote_modified_at = ?
                 WHERE local_id = ?",
                params![
                    server_id.0,
                    payload.to_json()?,
                    remote_modified_at,
                    remote_modified_at,
                    id.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(())
    }

    async fn purge(&self, id: &LocalId) -> Result<()> {
        self.conn
            .execute("DELETE FROM records WHERE local_id = ?", [id.as_str()])
            .await?;
        Ok(())
    }

    async fn reconcile_unsynced(&self) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE records SET synced = 1
                 WHERE synced = 0
                   AND server_id IS NOT NULL
                   AND NOT EXISTS (
                       SELECT 1 FROM sync_queue q WHERE q.local_id = records.local_id
                   )",
                (),
            )
            .await?;
        Ok(rows)
    }

    async fn needs_attention(&self) -> Result<Vec<LocalRecord>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE synced = 0
                       AND NOT EXISTS (
                           SELECT 1 FROM sync_queue q WHERE q.local_id = records.local_id
                       )
                     ORDER BY created_at ASC"
                ),
                (),
            )
            .await?;

        Self::collect(rows).await
    }

    async fn count_unsynced(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM records WHERE synced = 0", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
