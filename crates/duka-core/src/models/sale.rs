//! Sale model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How a sale was paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    MobileMoney,
    Card,
    Bank,
}

impl PaymentMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::MobileMoney => "mobile_money",
            Self::Card => "card",
            Self::Bank => "bank",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cash" => Ok(Self::Cash),
            "mobile_money" | "mpesa" => Ok(Self::MobileMoney),
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// A completed sale. Financial record: never dropped by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// SKU of the product sold
    pub product_sku: String,
    pub quantity: i64,
    /// Unit price in the smallest currency unit
    pub unit_price: i64,
    /// `quantity * unit_price`
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    /// Receipt reference from the payment provider (e.g. mobile money code)
    #[serde(default)]
    pub payment_receipt: Option<String>,
    #[serde(default)]
    pub customer_ref: Option<String>,
    /// When the sale happened (Unix ms)
    pub sold_at: i64,
}

impl Sale {
    /// Build a sale, computing the total from quantity and unit price.
    pub fn new(
        product_sku: impl Into<String>,
        quantity: i64,
        unit_price: i64,
        payment_method: PaymentMethod,
    ) -> Result<Self> {
        let product_sku = product_sku.into();
        if product_sku.trim().is_empty() {
            return Err(Error::InvalidInput("sale product SKU cannot be empty".into()));
        }
        if quantity <= 0 {
            return Err(Error::InvalidInput(format!(
                "sale quantity must be positive, got {quantity}"
            )));
        }
        if unit_price < 0 {
            return Err(Error::InvalidInput(format!(
                "sale unit price cannot be negative, got {unit_price}"
            )));
        }
        let total_amount = quantity
            .checked_mul(unit_price)
            .ok_or_else(|| Error::InvalidInput("sale total overflows".into()))?;

        Ok(Self {
            product_sku,
            quantity,
            unit_price,
            total_amount,
            payment_method,
            payment_receipt: None,
            customer_ref: None,
            sold_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    #[must_use]
    pub fn with_receipt(mut self, receipt: impl Into<String>) -> Self {
        self.payment_receipt = Some(receipt.into());
        self
    }

    #[must_use]
    pub fn with_customer(mut self, customer_ref: impl Into<String>) -> Self {
        self.customer_ref = Some(customer_ref.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_computes_total() {
        let sale = Sale::new("SKU-1", 2, 60, PaymentMethod::Cash).unwrap();
        assert_eq!(sale.total_amount, 120);
        assert!(sale.sold_at > 0);
    }

    #[test]
    fn test_sale_rejects_bad_quantity() {
        assert!(Sale::new("SKU-1", 0, 60, PaymentMethod::Cash).is_err());
        assert!(Sale::new("SKU-1", -3, 60, PaymentMethod::Cash).is_err());
    }

    #[test]
    fn test_sale_rejects_overflow() {
        assert!(Sale::new("SKU-1", i64::MAX, 2, PaymentMethod::Card).is_err());
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(
            "mobile-money".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::MobileMoney
        );
        assert_eq!("BANK".parse::<PaymentMethod>().unwrap(), PaymentMethod::Bank);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_payment_method_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::MobileMoney).unwrap();
        assert_eq!(json, "\"mobile_money\"");
    }
}
