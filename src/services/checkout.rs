use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use tracing::{error, info, instrument, warn};

use crate::deadline::Deadline;
use crate::errors::{ErrorKind, ServiceError};
use crate::events::{EventPublisher, OrderCreatedEvent};
use crate::models::CheckoutRequest;
use crate::repositories::order_repository::OrderRepository;
use crate::services::idempotency::IdempotencyGuard;
use crate::services::order_assembler::OrderAssembler;
use crate::services::product_validator::ProductValidator;

lazy_static! {
    static ref CHECKOUTS: IntCounter = register_int_counter!(
        "order_checkouts_total",
        "Total number of checkouts that persisted an order"
    )
    .expect("metric can be created");
    static ref CHECKOUT_REJECTIONS: IntCounter = register_int_counter!(
        "order_checkout_rejections_total",
        "Total number of checkouts rejected as invalid or duplicate"
    )
    .expect("metric can be created");
    static ref CHECKOUT_FAILURES: IntCounter = register_int_counter!(
        "order_checkout_failures_total",
        "Total number of checkouts failed by a dependency or the database"
    )
    .expect("metric can be created");
    static ref NOTIFICATIONS_PENDING: IntCounter = register_int_counter!(
        "order_notifications_pending_total",
        "Total number of committed orders whose order-created event was not published"
    )
    .expect("metric can be created");
}

/// Progress of one checkout. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutStage {
    Received,
    IdempotencyChecked,
    Validated,
    Persisted,
    Published,
    Done,
    Rejected,
    Failed,
}

/// Whether the order-created event reached the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Published,
    Pending { reason: String },
}

/// Result of a checkout that persisted an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: i64,
    pub notification: NotificationStatus,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutPolicy {
    /// Fail the checkout with `NotificationPending` when the publish fails.
    pub require_notification: bool,
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Turns a cart into a persisted order and announces it.
///
/// Stages run strictly in sequence:
/// `Received -> IdempotencyChecked -> Validated -> Persisted -> Published -> Done`.
/// Anything before `Persisted` that fails leaves no trace in storage. The
/// event is published only after the transaction commits, and a publish
/// failure never undoes the order.
#[derive(Clone)]
pub struct CheckoutService {
    idempotency: IdempotencyGuard,
    validator: ProductValidator,
    repository: OrderRepository,
    publisher: EventPublisher,
    policy: CheckoutPolicy,
    clock: Clock,
}

impl CheckoutService {
    pub fn new(
        idempotency: IdempotencyGuard,
        validator: ProductValidator,
        repository: OrderRepository,
        publisher: EventPublisher,
        policy: CheckoutPolicy,
    ) -> Self {
        Self {
            idempotency,
            validator,
            repository,
            publisher,
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[instrument(skip(self, request, deadline), fields(user_id = request.user_id, items = request.items.len()))]
    pub async fn checkout(
        &self,
        request: &CheckoutRequest,
        deadline: &Deadline,
    ) -> Result<CheckoutReceipt, ServiceError> {
        let mut stage = CheckoutStage::Received;

        let (order_id, total_amount) = match self.place_order(request, deadline, &mut stage).await {
            Ok(placed) => placed,
            Err(err) => {
                let terminal = match err.kind() {
                    ErrorKind::Validation | ErrorKind::Duplicate => {
                        CHECKOUT_REJECTIONS.inc();
                        CheckoutStage::Rejected
                    }
                    _ => {
                        CHECKOUT_FAILURES.inc();
                        CheckoutStage::Failed
                    }
                };
                warn!(%stage, outcome = %terminal, error = %err, "Checkout stopped");
                return Err(err);
            }
        };

        stage = CheckoutStage::Persisted;
        CHECKOUTS.inc();
        info!(order_id, %stage, "Order persisted");

        let event = OrderCreatedEvent {
            order_id,
            user_id: request.user_id,
            total_amount,
            payment_method: request.payment_method.clone(),
            shipping_address: request.shipping_address.clone(),
            occurred_at: (self.clock)(),
        };
        self.notify(event, stage, deadline).await
    }

    async fn place_order(
        &self,
        request: &CheckoutRequest,
        deadline: &Deadline,
        stage: &mut CheckoutStage,
    ) -> Result<(i64, Decimal), ServiceError> {
        request.validate_shape()?;

        let token = request.idempotency_token();
        if let Some(token) = token {
            if self.idempotency.exists(token, deadline).await? {
                return Err(ServiceError::DuplicateRequest(token.to_string()));
            }
        }
        *stage = CheckoutStage::IdempotencyChecked;

        let items = self.validator.validate(&request.items, deadline).await?;
        *stage = CheckoutStage::Validated;

        let assembled = OrderAssembler::assemble(
            request.user_id,
            items,
            &request.payment_method,
            &request.shipping_address,
            (self.clock)(),
        )?;

        let order_id = self.repository.persist(&assembled, token, deadline).await?;
        Ok((order_id, assembled.total_amount))
    }

    async fn notify(
        &self,
        event: OrderCreatedEvent,
        mut stage: CheckoutStage,
        deadline: &Deadline,
    ) -> Result<CheckoutReceipt, ServiceError> {
        let order_id = event.order_id;

        match self.publisher.publish_order_created(&event, deadline).await {
            Ok(()) => {
                stage = CheckoutStage::Published;
                info!(order_id, %stage, "Order-created event delivered");
                stage = CheckoutStage::Done;
                info!(order_id, %stage, "Checkout complete");
                Ok(CheckoutReceipt {
                    order_id,
                    notification: NotificationStatus::Published,
                })
            }
            Err(err) => {
                NOTIFICATIONS_PENDING.inc();
                let reason = err.to_string();
                warn!(order_id, %stage, %reason, "Order committed but notification pending");

                if self.policy.require_notification {
                    error!(order_id, outcome = %CheckoutStage::Failed, "Checkout requires notification");
                    return Err(ServiceError::NotificationPending { order_id, reason });
                }

                Ok(CheckoutReceipt {
                    order_id,
                    notification: NotificationStatus::Pending { reason },
                })
            }
        }
    }
}
