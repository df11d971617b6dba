use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::checkout::{StatusHistoryEntry, ValidatedLineItem};

/// Filter for the order history read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHistoryQuery {
    pub user_id: i64,
    /// Status code to match; `None` or `Some(0)` returns all orders.
    pub status: Option<i32>,
}

impl OrderHistoryQuery {
    pub fn all(user_id: i64) -> Self {
        Self {
            user_id,
            status: None,
        }
    }

    pub fn with_status(user_id: i64, status: i32) -> Self {
        Self {
            user_id,
            status: Some(status),
        }
    }

    /// Effective status filter after treating zero as "any".
    pub fn status_filter(&self) -> Option<i32> {
        self.status.filter(|code| *code > 0)
    }
}

/// One order as returned by the history read path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistoryEntry {
    pub order_id: i64,
    pub total_amount: Decimal,
    pub total_qty: i64,
    pub status: String,
    pub status_code: i32,
    pub payment_method: String,
    pub shipping_address: String,
    pub products: Vec<ValidatedLineItem>,
    pub history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
}
