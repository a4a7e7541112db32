//! Sync state repository implementation

use crate::error::Result;
use libsql::Connection;

const LAST_SYNC_AT: &str = "last_sync_at";

/// Trait for sync bookkeeping storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    /// Completion time of the last finished sync cycle (Unix ms)
    async fn last_sync_at(&self) -> Result<Option<i64>>;

    /// Record the completion time of a sync cycle
    async fn set_last_sync_at(&self, timestamp: i64) -> Result<()>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn last_sync_at(&self) -> Result<Option<i64>> {
        Ok(self
            .get_value(LAST_SYNC_AT)
            .await?
            .and_then(|value| value.parse().ok()))
    }

    async fn set_last_sync_at(&self, timestamp: i64) -> Result<()> {
        self.set_value(LAST_SYNC_AT, &timestamp.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_sync_defaults_to_none() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        assert_eq!(repo.last_sync_at().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_load_last_sync() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        repo.set_last_sync_at(1_700_000_000_000).await.unwrap();
        repo.set_last_sync_at(1_700_000_000_500).await.unwrap();
        assert_eq!(repo.last_sync_at().await.unwrap(), Some(1_700_000_000_500));
    }
}
