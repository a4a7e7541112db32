//! Sync indicator shared by clients.

use serde::Serialize;

use crate::models::{SyncResult, SyncStatus};

/// Coarse sync state for a status badge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    /// The last cycle left failures, deferred entries or pending conflicts
    Error,
}

impl SyncState {
    /// State implied by a finished `sync_all` call.
    #[must_use]
    pub fn after(result: &SyncResult) -> Self {
        match &result.status {
            SyncStatus::Offline => Self::Offline,
            SyncStatus::AlreadyRunning => Self::Syncing,
            SyncStatus::Aborted { .. } => Self::Error,
            SyncStatus::Completed => {
                if result.failed == 0 && result.deferred == 0 && result.conflicts.is_empty() {
                    Self::Synced
                } else {
                    Self::Error
                }
            }
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "needs attention",
        }
    }
}
