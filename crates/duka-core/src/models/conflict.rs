//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{EntityPayload, EntityType, LocalId, ServerId, SyncOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolution state of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictState {
    /// Waiting for an explicit caller decision
    Pending,
    Local,
    Server,
    Merged,
}

/// Divergence between the local and remote version of one entity.
///
/// Lives for the current process only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    pub entity_type: EntityType,
    pub local_id: LocalId,
    pub server_id: Option<ServerId>,
    /// Operation whose push diverged
    pub operation: SyncOperation,
    pub local: EntityPayload,
    pub local_modified_at: i64,
    /// Remote snapshot, when it could be fetched
    pub remote: Option<EntityPayload>,
    pub remote_modified_at: Option<i64>,
    pub state: ConflictState,
    /// Detection time (Unix ms)
    pub detected_at: i64,
}

/// Caller decision for a conflict held for manual resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictChoice {
    /// Push the local snapshot again
    Local,
    /// Adopt whatever the server holds
    Server,
}

impl From<ConflictChoice> for ConflictState {
    fn from(choice: ConflictChoice) -> Self {
        match choice {
            ConflictChoice::Local => Self::Local,
            ConflictChoice::Server => Self::Server,
        }
    }
}

impl std::str::FromStr for ConflictChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "server" | "remote" => Ok(Self::Server),
            other => Err(format!("unknown conflict choice '{other}' (expected local or server)")),
        }
    }
}

impl ConflictRecord {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, ConflictState::Pending)
    }
}
