//! Local record model and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::EntityPayload;

/// A device-assigned record identifier, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new unique local ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier assigned by the server on first successful creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub i64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Domain record types synchronized with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Product,
    Sale,
    Customer,
    Supplier,
    Order,
}

impl EntityType {
    pub const ALL: [Self; 5] = [
        Self::Product,
        Self::Sale,
        Self::Customer,
        Self::Supplier,
        Self::Order,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Sale => "sale",
            Self::Customer => "customer",
            Self::Supplier => "supplier",
            Self::Order => "order",
        }
    }

    /// REST collection segment for this entity type
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Sale => "sales",
            Self::Customer => "customers",
            Self::Supplier => "suppliers",
            Self::Order => "orders",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|entity| entity.as_str() == s)
            .ok_or_else(|| format!("unknown entity type '{s}'"))
    }
}

/// A domain record held in the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Device-assigned identifier, stable for the record's local lifetime
    pub local_id: LocalId,
    /// Server identifier, set once the create has been accepted
    pub server_id: Option<ServerId>,
    /// Typed domain payload
    pub payload: EntityPayload,
    /// Whether the latest local state has reached the server
    pub synced: bool,
    /// Soft delete flag, kept until the remote delete succeeds
    pub is_deleted: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local modification (Unix ms)
    pub last_modified_at: i64,
    /// Server-side last-modified timestamp last observed for this record
    pub remote_modified_at: Option<i64>,
}

impl LocalRecord {
    /// Create a fresh, unsynced record for the given payload
    #[must_use]
    pub fn new(payload: EntityPayload) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            local_id: LocalId::new(),
            server_id: None,
            payload,
            synced: false,
            is_deleted: false,
            created_at: now,
            last_modified_at: now,
            remote_modified_at: None,
        }
    }

    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.payload.entity_type()
    }

    /// Unsynced and without a server id: the create has not been accepted yet
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        self.server_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Customer, EntityPayload};

    #[test]
    fn test_local_id_unique() {
        assert_ne!(LocalId::new(), LocalId::new());
    }

    #[test]
    fn test_local_id_parse() {
        let id = LocalId::new();
        let parsed: LocalId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entity_type_parse() {
        for entity in EntityType::ALL {
            assert_eq!(entity.as_str().parse::<EntityType>().unwrap(), entity);
        }
        assert!("invoice".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_new_record_is_unsynced() {
        let record = LocalRecord::new(EntityPayload::Customer(Customer::new("Amina")));
        assert!(!record.synced);
        assert!(record.is_local_only());
        assert_eq!(record.entity_type(), EntityType::Customer);
        assert_eq!(record.created_at, record.last_modified_at);
    }
}
