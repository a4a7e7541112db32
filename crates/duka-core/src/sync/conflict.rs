//! Last-writer-wins conflict resolution.
//!
//! Pure: takes two versions of one entity and returns a decision. The engine
//! applies the outcome to the local store.

use serde_json::Value;

use crate::models::{ConflictState, EntityPayload, ServerId};
use crate::{Error, Result};

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPayload {
    pub payload: EntityPayload,
    /// Unix ms
    pub last_modified_at: i64,
    pub server_id: Option<ServerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Local,
    Server,
    /// Equal timestamps: remote fields as base, every local field on top
    Merged,
}

impl From<Decision> for ConflictState {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Local => Self::Local,
            Decision::Server => Self::Server,
            Decision::Merged => Self::Merged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    pub winning: EntityPayload,
    /// Server identifier carried over from whichever side has one
    pub server_id: Option<ServerId>,
}

/// Decide between a local and a remote version of the same entity.
///
/// Ties favor the local side: the device trying to push is the one that has
/// been waiting.
pub fn resolve(local: &VersionedPayload, remote: &VersionedPayload) -> Result<Resolution> {
    let entity_type = local.payload.entity_type();
    if remote.payload.entity_type() != entity_type {
        return Err(Error::InvalidInput(format!(
            "cannot resolve {entity_type} against {}",
            remote.payload.entity_type()
        )));
    }

    let resolution = match local.last_modified_at.cmp(&remote.last_modified_at) {
        std::cmp::Ordering::Greater => Resolution {
            decision: Decision::Local,
            winning: local.payload.clone(),
            server_id: local.server_id.or(remote.server_id),
        },
        std::cmp::Ordering::Less => Resolution {
            decision: Decision::Server,
            winning: remote.payload.clone(),
            server_id: remote.server_id.or(local.server_id),
        },
        std::cmp::Ordering::Equal => {
            let merged = overlay(remote.payload.to_value()?, local.payload.to_value()?);
            Resolution {
                decision: Decision::Merged,
                winning: EntityPayload::from_value(entity_type, merged)?,
                server_id: local.server_id.or(remote.server_id),
            }
        }
    };
    Ok(resolution)
}

/// Shallow merge: every top-level field of `top` replaces the one in `base`.
///
/// Explicit nulls count, so a field cleared locally stays cleared.
fn overlay(base: Value, top: Value) -> Value {
    match (base, top) {
        (Value::Object(mut base), Value::Object(top)) => {
            base.extend(top);
            Value::Object(base)
        }
        (_, top) => top,
    }
}
