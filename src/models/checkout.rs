use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::ServiceError;

/// Current schema version of the JSON blobs stored in `order_detail`.
pub const DETAIL_SCHEMA_VERSION: u32 = 1;

/// A shopping-cart line as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutItem {
    pub product_id: i64,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i64,
    /// Client-side price; informational only, replaced by the product service price.
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    /// Filled from the authenticated caller, never trusted from the body.
    #[serde(default)]
    pub user_id: i64,
    #[validate(length(min = 1, message = "item cannot be empty"))]
    pub items: Vec<CheckoutItem>,
    #[validate(length(min = 1, message = "payment_method is required"))]
    pub payment_method: String,
    #[validate(length(min = 1, message = "shipping_address is required"))]
    pub shipping_address: String,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

impl CheckoutRequest {
    /// Validates the request shape: non-empty cart, positive quantities,
    /// payment and shipping details present.
    pub fn validate_shape(&self) -> Result<(), ServiceError> {
        self.validate()?;
        for item in &self.items {
            item.validate()?;
        }
        Ok(())
    }

    /// The idempotency token, if one was supplied. Blank tokens disable the check.
    pub fn idempotency_token(&self) -> Option<&str> {
        self.idempotency_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// Authoritative product data returned by the product service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub price: Decimal,
    pub stock: i64,
}

/// A line item whose price has been replaced with the product service price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedLineItem {
    pub product_id: i64,
    pub quantity: i64,
    pub price: Decimal,
}

impl ValidatedLineItem {
    /// `price * quantity`, `None` when it does not fit a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Versioned envelope for the line items stored in `order_detail.products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductSnapshot {
    pub version: u32,
    pub items: Vec<ValidatedLineItem>,
}

/// Versioned envelope for the append-only log in `order_detail.order_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusHistory {
    pub version: u32,
    pub entries: Vec<StatusHistoryEntry>,
}

impl ProductSnapshot {
    pub fn new(items: Vec<ValidatedLineItem>) -> Self {
        Self {
            version: DETAIL_SCHEMA_VERSION,
            items,
        }
    }

    pub fn encode(&self) -> Result<String, ServiceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, ServiceError> {
        let snapshot: Self = serde_json::from_str(raw).map_err(|e| {
            ServiceError::SerializationError(format!("malformed product snapshot: {}", e))
        })?;
        check_version("product snapshot", snapshot.version)?;
        Ok(snapshot)
    }
}

impl StatusHistory {
    pub fn new(entries: Vec<StatusHistoryEntry>) -> Self {
        Self {
            version: DETAIL_SCHEMA_VERSION,
            entries,
        }
    }

    pub fn encode(&self) -> Result<String, ServiceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, ServiceError> {
        let history: Self = serde_json::from_str(raw).map_err(|e| {
            ServiceError::SerializationError(format!("malformed status history: {}", e))
        })?;
        check_version("status history", history.version)?;
        Ok(history)
    }
}

fn check_version(what: &str, version: u32) -> Result<(), ServiceError> {
    if version != DETAIL_SCHEMA_VERSION {
        return Err(ServiceError::SerializationError(format!(
            "unsupported {} version {}",
            what, version
        )));
    }
    Ok(())
}
