//! Product model

use serde::{Deserialize, Serialize};

/// A product offered for sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Display name
    pub name: String,
    /// Stock keeping unit, referenced by sales and orders
    pub sku: String,
    /// Selling price in the smallest currency unit
    pub price: i64,
    /// Purchase cost in the smallest currency unit
    #[serde(default)]
    pub cost_price: Option<i64>,
    /// Units on hand
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
}

impl Product {
    #[must_use]
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: i64) -> Self {
        Self {
            name: name.into(),
            sku: sku.into(),
            price,
            cost_price: None,
            stock_quantity: 0,
            category: None,
        }
    }

    #[must_use]
    pub const fn with_stock(mut self, quantity: i64) -> Self {
        self.stock_quantity = quantity;
        self
    }
}
