//! Sync cycle summary

use serde::{Deserialize, Serialize};

use super::ConflictRecord;

/// How a `sync_all` call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SyncStatus {
    /// The queue snapshot was drained
    Completed,
    /// Another cycle was in flight; nothing was touched
    AlreadyRunning,
    /// No connectivity; no retry budget was consumed
    Offline,
    /// A cycle-level error (e.g. unreadable local store) stopped the cycle
    Aborted { reason: String },
}

/// Summary of one synchronization cycle. Never mutated once handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    #[serde(flatten)]
    pub status: SyncStatus,
    pub started_at: i64,
    pub finished_at: i64,
    /// Entries satisfied (pushed, or settled by a server-wins resolution)
    pub synced: usize,
    /// Entries permanently failed or discarded after exhausting retries
    pub failed: usize,
    /// Entries left queued for a later cycle
    pub deferred: usize,
    /// Conflicts settled automatically during the cycle
    pub conflicts_resolved: usize,
    /// Human-readable messages, one per failure or deferral
    pub errors: Vec<String>,
    /// Conflicts waiting for manual resolution
    pub conflicts: Vec<ConflictRecord>,
}

impl SyncResult {
    #[must_use]
    pub const fn empty(status: SyncStatus, started_at: i64, finished_at: i64) -> Self {
        Self {
            status,
            started_at,
            finished_at,
            synced: 0,
            failed: 0,
            deferred: 0,
            conflicts_resolved: 0,
            errors: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, SyncStatus::Completed)
    }

    #[must_use]
    pub const fn already_running(&self) -> bool {
        matches!(self.status, SyncStatus::AlreadyRunning)
    }
}
