use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::Query;
use crate::deadline::Deadline;
use crate::entities::{order, order_detail};
use crate::errors::ServiceError;
use crate::models::{
    OrderHistoryEntry, OrderHistoryQuery, OrderStatus, ProductSnapshot, StatusHistory,
};
use crate::repositories::order_repository::OrderRepository;

/// Orders of one user, newest first, with decoded detail blobs.
///
/// A single undecodable detail record fails the whole query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOrderHistoryQuery {
    pub filter: OrderHistoryQuery,
}

impl GetOrderHistoryQuery {
    pub fn new(filter: OrderHistoryQuery) -> Self {
        Self { filter }
    }
}

#[async_trait]
impl Query for GetOrderHistoryQuery {
    type Result = Vec<OrderHistoryEntry>;

    #[instrument(skip(self, repository, deadline), fields(user_id = self.filter.user_id))]
    async fn execute(
        &self,
        repository: &OrderRepository,
        deadline: &Deadline,
    ) -> Result<Self::Result, ServiceError> {
        let rows = repository.find_history(&self.filter, deadline).await?;
        debug!(orders = rows.len(), "Loaded order history rows");

        rows.into_iter()
            .map(|(order, detail)| to_entry(order, detail))
            .collect()
    }
}

fn to_entry(
    order: order::Model,
    detail: Option<order_detail::Model>,
) -> Result<OrderHistoryEntry, ServiceError> {
    let detail = detail.ok_or_else(|| {
        error!(order_id = order.id, "Order has no detail record");
        ServiceError::SerializationError(format!("order {} has no detail record", order.id))
    })?;

    let products = ProductSnapshot::decode(&detail.products).map_err(|e| {
        error!(order_id = order.id, error = %e, "Corrupt product snapshot");
        e
    })?;
    let history = StatusHistory::decode(&detail.order_history).map_err(|e| {
        error!(order_id = order.id, error = %e, "Corrupt status history");
        e
    })?;

    Ok(OrderHistoryEntry {
        order_id: order.id,
        total_amount: order.amount,
        total_qty: order.total_qty,
        status: OrderStatus::label_for_code(order.status),
        status_code: order.status,
        payment_method: order.payment_method,
        shipping_address: order.shipping_address,
        products: products.items,
        history: history.entries,
        created_at: order.created_at,
    })
}
