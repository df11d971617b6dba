use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::deadline::Deadline;
use crate::errors::ServiceError;
use crate::message_queue::MessageBroker;

/// Fact published once per committed checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub total_amount: Decimal,
    pub payment_method: String,
    pub shipping_address: String,
    pub occurred_at: DateTime<Utc>,
}

impl OrderCreatedEvent {
    /// Partition key; keeps every message for one order on one partition.
    pub fn key(&self) -> String {
        format!("order-{}", self.order_id)
    }
}

/// Publishes order events to the broker. Must only be called after commit.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[instrument(skip(self, event, deadline), fields(order_id = event.order_id, topic = %self.topic))]
    pub async fn publish_order_created(
        &self,
        event: &OrderCreatedEvent,
        deadline: &Deadline,
    ) -> Result<(), ServiceError> {
        let payload = serde_json::to_vec(event)?;
        let key = event.key();

        let publish = self.broker.publish(&self.topic, &key, &payload, deadline);
        deadline
            .run("order-created publish", async {
                publish.await.map_err(ServiceError::from)
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to publish order-created event");
                e
            })?;

        info!("Order-created event published");
        Ok(())
    }
}
