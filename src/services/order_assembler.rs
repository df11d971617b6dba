use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::ServiceError;
use crate::models::{
    OrderStatus, ProductSnapshot, StatusHistory, StatusHistoryEntry, ValidatedLineItem,
};

/// Everything needed to persist one order, computed without touching I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledOrder {
    pub user_id: i64,
    pub total_amount: Decimal,
    pub total_qty: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub shipping_address: String,
    /// Encoded [`ProductSnapshot`]
    pub products: String,
    /// Encoded [`StatusHistory`]
    pub order_history: String,
    pub created_at: DateTime<Utc>,
}

/// Builds the order and detail records from validated line items.
pub struct OrderAssembler;

impl OrderAssembler {
    pub fn assemble(
        user_id: i64,
        items: Vec<ValidatedLineItem>,
        payment_method: &str,
        shipping_address: &str,
        now: DateTime<Utc>,
    ) -> Result<AssembledOrder, ServiceError> {
        let mut total_qty: i64 = 0;
        let mut total_amount = Decimal::ZERO;
        for item in &items {
            total_qty = total_qty.checked_add(item.quantity).ok_or_else(|| {
                ServiceError::ValidationError("order quantity is too large".to_string())
            })?;
            total_amount = item
                .line_total()
                .and_then(|line| total_amount.checked_add(line))
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "order amount is too large at product {}",
                        item.product_id
                    ))
                })?;
        }

        let status = OrderStatus::Created;
        let history = StatusHistory::new(vec![StatusHistoryEntry {
            status: status.to_string(),
            timestamp: now,
        }]);

        Ok(AssembledOrder {
            user_id,
            total_amount,
            total_qty,
            status,
            payment_method: payment_method.to_string(),
            shipping_address: shipping_address.to_string(),
            products: ProductSnapshot::new(items).encode()?,
            order_history: history.encode()?,
            created_at: now,
        })
    }
}
