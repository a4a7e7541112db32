//! Sync queue entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{EntityPayload, EntityType, LocalId, ServerId};

/// Row identifier of a queue entry. Monotonic, so it doubles as the FIFO tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueEntryId(pub i64);

impl fmt::Display for QueueEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutation intent carried by a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown sync operation '{other}'")),
        }
    }
}

/// Processing class; lower ranks drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    #[must_use]
    pub const fn rank(self) -> i64 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }

    #[must_use]
    pub const fn from_rank(rank: i64) -> Self {
        match rank {
            0 => Self::High,
            1 => Self::Normal,
            _ => Self::Low,
        }
    }

    /// Sales jump the line; everything else is normal.
    #[must_use]
    pub const fn default_for(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Sale => Self::High,
            _ => Self::Normal,
        }
    }
}

/// A mutation waiting to be enqueued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueEntry {
    pub operation: SyncOperation,
    pub local_id: LocalId,
    pub server_id: Option<ServerId>,
    /// Snapshot of the payload at enqueue time
    pub payload: EntityPayload,
    /// Local modification stamp (Unix ms)
    pub modified_at: i64,
    /// Remote timestamp the local change was based on
    pub base_modified_at: Option<i64>,
    pub priority: Priority,
}

impl NewQueueEntry {
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.payload.entity_type()
    }
}

/// A durable pending mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub entity_type: EntityType,
    pub operation: SyncOperation,
    pub local_id: LocalId,
    pub server_id: Option<ServerId>,
    pub payload: EntityPayload,
    pub modified_at: i64,
    pub base_modified_at: Option<i64>,
    /// Attempts consumed so far; never decreases
    pub attempts: u32,
    pub last_attempt_at: Option<i64>,
    pub last_error: Option<String>,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    pub priority: Priority,
}

impl QueueEntry {
    #[must_use]
    pub const fn remaining_attempts(&self, max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(self.attempts)
    }

    #[must_use]
    pub const fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }
}
