//! Typed payload union keyed by entity type

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Customer, EntityType, Order, Product, Sale, Supplier};
use crate::error::{Error, Result};

/// Domain payload for any synchronized entity.
///
/// Serialized form is `{"type": "<entity>", "data": {...}}`. The wire and
/// queue representations use the bare `data` object alongside a separate
/// entity type column, see [`EntityPayload::to_value`] and
/// [`EntityPayload::from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EntityPayload {
    Product(Product),
    Sale(Sale),
    Customer(Customer),
    Supplier(Supplier),
    Order(Order),
}

impl EntityPayload {
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Product(_) => EntityType::Product,
            Self::Sale(_) => EntityType::Sale,
            Self::Customer(_) => EntityType::Customer,
            Self::Supplier(_) => EntityType::Supplier,
            Self::Order(_) => EntityType::Order,
        }
    }

    /// Bare JSON object for this payload, without the type tag
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            Self::Product(product) => serde_json::to_value(product)?,
            Self::Sale(sale) => serde_json::to_value(sale)?,
            Self::Customer(customer) => serde_json::to_value(customer)?,
            Self::Supplier(supplier) => serde_json::to_value(supplier)?,
            Self::Order(order) => serde_json::to_value(order)?,
        };
        Ok(value)
    }

    /// Decode a bare JSON object as the payload for `entity_type`.
    ///
    /// Unknown fields are ignored so server-only attributes do not break
    /// decoding.
    pub fn from_value(entity_type: EntityType, value: Value) -> Result<Self> {
        let payload = match entity_type {
            EntityType::Product => Self::Product(serde_json::from_value(value)?),
            EntityType::Sale => Self::Sale(serde_json::from_value(value)?),
            EntityType::Customer => Self::Customer(serde_json::from_value(value)?),
            EntityType::Supplier => Self::Supplier(serde_json::from_value(value)?),
            EntityType::Order => Self::Order(serde_json::from_value(value)?),
        };
        Ok(payload)
    }

    /// Encode the bare payload object as a JSON string for storage
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    /// Decode a stored JSON string for the given entity type
    pub fn from_json(entity_type: EntityType, raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(entity_type, value)
    }

    /// Ensure the payload matches the entity type it is stored under
    pub fn expect_type(&self, entity_type: EntityType) -> Result<()> {
        if self.entity_type() == entity_type {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "payload is a {} but {} was expected",
                self.entity_type(),
                entity_type
            )))
        }
    }
}

impl From<Product> for EntityPayload {
    fn from(value: Product) -> Self {
        Self::Product(value)
    }
}

impl From<Sale> for EntityPayload {
    fn from(value: Sale) -> Self {
        Self::Sale(value)
    }
}

impl From<Customer> for EntityPayload {
    fn from(value: Customer) -> Self {
        Self::Customer(value)
    }
}

impl From<Supplier> for EntityPayload {
    fn from(value: Supplier) -> Self {
        Self::Supplier(value)
    }
}

impl From<Order> for EntityPayload {
    fn from(value: Order) -> Self {
        Self::Order(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMethod;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bare_json_roundtrip_keeps_variant() {
        let sale = Sale::new("SKU-9", 3, 50, PaymentMethod::MobileMoney)
            .unwrap()
            .with_receipt("QK12XYZ");
        let payload = EntityPayload::from(sale);

        let raw = payload.to_json().unwrap();
        assert!(!raw.contains("\"type\""));

        let decoded = EntityPayload::from_json(EntityType::Sale, &raw).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_from_value_ignores_server_fields() {
        let value = serde_json::json!({
            "id": 77,
            "last_modified_at": 1_700_000_000_000_i64,
            "name": "Soap",
            "sku": "SOAP-1",
            "price": 120
        });
        let payload = EntityPayload::from_value(EntityType::Product, value).unwrap();
        assert_eq!(payload, EntityPayload::Product(Product::new("Soap", "SOAP-1", 120)));
    }

    #[test]
    fn test_from_value_rejects_wrong_shape() {
        let value = serde_json::json!({ "name": "Soap" });
        assert!(EntityPayload::from_value(EntityType::Sale, value).is_err());
    }

    #[test]
    fn test_expect_type() {
        let payload = EntityPayload::from(Customer::new("Juma"));
        assert!(payload.expect_type(EntityType::Customer).is_ok());
        assert!(payload.expect_type(EntityType::Supplier).is_err());
    }
}
