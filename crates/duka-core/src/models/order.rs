//! Purchase order model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Received,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Received => "received",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: String,
    pub quantity: i64,
    /// Cost per unit in the smallest currency unit
    pub unit_cost: i64,
}

/// A restocking order placed with a supplier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub supplier_ref: String,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub status: OrderStatus,
    /// Expected delivery (Unix ms)
    #[serde(default)]
    pub expected_at: Option<i64>,
}

impl Order {
    #[must_use]
    pub fn new(supplier_ref: impl Into<String>) -> Self {
        Self {
            supplier_ref: supplier_ref.into(),
            lines: Vec::new(),
            status: OrderStatus::Pending,
            expected_at: None,
        }
    }

    #[must_use]
    pub fn with_line(mut self, sku: impl Into<String>, quantity: i64, unit_cost: i64) -> Self {
        self.lines.push(OrderLine {
            sku: sku.into(),
            quantity,
            unit_cost,
        });
        self
    }

    /// Sum of `quantity * unit_cost` over all lines, saturating.
    #[must_use]
    pub fn total_cost(&self) -> i64 {
        self.lines.iter().fold(0i64, |total, line| {
            total.saturating_add(line.quantity.saturating_mul(line.unit_cost))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_total_cost() {
        let order = Order::new("acme")
            .with_line("SKU-1", 10, 45)
            .with_line("SKU-2", 2, 300);
        assert_eq!(order.total_cost(), 1050);
        assert_eq!(order.status, OrderStatus::Pending);
    }
}
