use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::deadline::Deadline;
use crate::entities::{order, order_detail};
use crate::errors::ServiceError;
use crate::models::OrderHistoryQuery;
use crate::services::idempotency::IdempotencyGuard;
use crate::services::order_assembler::AssembledOrder;

/// Row pair returned by the history join.
pub type OrderWithDetail = (order::Model, Option<order_detail::Model>);

/// Storage for the order aggregate (order + its detail record).
#[derive(Debug, Clone)]
pub struct OrderRepository {
    db: Arc<DatabaseConnection>,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Writes detail, order and (optionally) the idempotency token in one
    /// transaction and returns the new order id.
    ///
    /// The deadline bounds the inserts only. When it passes mid-write the
    /// closure fails and the transaction rolls back; once the inserts are
    /// done the commit always runs to completion, so an `Ok` means the order
    /// exists and an `Err` means it does not.
    #[instrument(skip(self, assembled, deadline), fields(user_id = assembled.user_id))]
    pub async fn persist(
        &self,
        assembled: &AssembledOrder,
        idempotency_token: Option<&str>,
        deadline: &Deadline,
    ) -> Result<i64, ServiceError> {
        if deadline.is_expired() {
            return Err(ServiceError::DeadlineExceeded(
                "order persistence not started: deadline already passed".to_string(),
            ));
        }

        let assembled = assembled.clone();
        let token = idempotency_token.map(str::to_owned);
        let deadline = *deadline;

        self.db
            .transaction::<_, i64, ServiceError>(move |txn| {
                Box::pin(async move {
                    deadline
                        .run("order persistence", async {
                            let detail = order_detail::ActiveModel {
                                products: Set(assembled.products.clone()),
                                order_history: Set(assembled.order_history.clone()),
                                ..Default::default()
                            }
                            .insert(txn)
                            .await
                            .map_err(|e| {
                                error!(error = %e, "Failed to insert order detail");
                                ServiceError::DatabaseError(e)
                            })?;

                            let saved_order = order::ActiveModel {
                                user_id: Set(assembled.user_id),
                                amount: Set(assembled.total_amount),
                                total_qty: Set(assembled.total_qty),
                                order_detail_id: Set(detail.id),
                                status: Set(assembled.status.code()),
                                payment_method: Set(assembled.payment_method.clone()),
                                shipping_address: Set(assembled.shipping_address.clone()),
                                created_at: Set(assembled.created_at),
                                ..Default::default()
                            }
                            .insert(txn)
                            .await
                            .map_err(|e| {
                                error!(detail_id = detail.id, error = %e, "Failed to insert order");
                                ServiceError::DatabaseError(e)
                            })?;

                            if let Some(token) = token.as_deref() {
                                IdempotencyGuard::record(txn, token, assembled.created_at).await?;
                            }

                            debug!(
                                order_id = saved_order.id,
                                detail_id = detail.id,
                                "Order aggregate written"
                            );
                            Ok(saved_order.id)
                        })
                        .await
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
    }

    /// Orders of one user joined with their detail rows, newest first.
    #[instrument(skip(self, deadline))]
    pub async fn find_history(
        &self,
        query: &OrderHistoryQuery,
        deadline: &Deadline,
    ) -> Result<Vec<OrderWithDetail>, ServiceError> {
        let mut select = order::Entity::find().filter(order::Column::UserId.eq(query.user_id));
        if let Some(status) = query.status_filter() {
            select = select.filter(order::Column::Status.eq(status));
        }

        let rows = select
            .order_by_desc(order::Column::Id)
            .find_also_related(order_detail::Entity)
            .all(self.db.as_ref());

        deadline
            .run("order history lookup", async {
                rows.await.map_err(ServiceError::DatabaseError)
            })
            .await
    }

    pub async fn count_orders(&self) -> Result<u64, ServiceError> {
        Ok(order::Entity::find().count(self.db.as_ref()).await?)
    }

    pub async fn count_details(&self) -> Result<u64, ServiceError> {
        Ok(order_detail::Entity::find().count(self.db.as_ref()).await?)
    }
}
