/*!
 * # Message Broker
 *
 * Outbound messaging used to notify downstream consumers. Messages are
 * published to a topic with a partition key; delivery acknowledgement is
 * limited to the success or failure of the publish call itself.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::deadline::Deadline;
use crate::errors::ServiceError;

/// Message broker errors
#[derive(Error, Debug)]
pub enum MessageQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Publish failed: {0}")]
    PublishFailed(String),
    #[error("Publish timed out")]
    Timeout,
}

impl From<MessageQueueError> for ServiceError {
    fn from(err: MessageQueueError) -> Self {
        ServiceError::QueueError(err.to_string())
    }
}

/// A message as recorded by [`InMemoryBroker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Publishing side of a durable message broker.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        deadline: &Deadline,
    ) -> Result<(), MessageQueueError>;
}

/// In-memory broker keeping every published message per topic.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, Vec<BrokerMessage>>>>,
    max_size: usize,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_max_size(10_000)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            max_size,
        }
    }

    /// Messages published to `topic`, oldest first.
    pub fn messages(&self, topic: &str) -> Vec<BrokerMessage> {
        let topics = match self.topics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        topics.get(topic).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        deadline: &Deadline,
    ) -> Result<(), MessageQueueError> {
        if deadline.is_expired() {
            return Err(MessageQueueError::Timeout);
        }

        let mut topics = match self.topics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let queue = topics.entry(topic.to_string()).or_default();

        if queue.len() >= self.max_size {
            return Err(MessageQueueError::QueueFull);
        }

        queue.push(BrokerMessage::new(topic, key, payload.to_vec()));
        Ok(())
    }
}

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaBrokerConfig};

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::ClientConfig;
    use std::time::Duration;
    use tracing::{debug, info};

    /// Upper bound for a single produce call, below the request deadline.
    const MAX_SEND_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Clone, Debug)]
    pub struct KafkaBrokerConfig {
        /// Kafka bootstrap servers (comma-separated).
        pub bootstrap_servers: String,
    }

    impl KafkaBrokerConfig {
        fn build_producer_config(&self) -> ClientConfig {
            let mut config = ClientConfig::new();
            config.set("bootstrap.servers", &self.bootstrap_servers);
            config.set("message.timeout.ms", "5000");
            config.set("acks", "all");
            config.set("enable.idempotence", "true");
            config
        }
    }

    /// Kafka producer keyed by message key, so all messages of one order land
    /// on the same partition.
    pub struct KafkaBroker {
        producer: FutureProducer,
    }

    impl KafkaBroker {
        pub fn new(config: KafkaBrokerConfig) -> Result<Self, MessageQueueError> {
            let producer: FutureProducer =
                config.build_producer_config().create().map_err(|e| {
                    MessageQueueError::ConnectionError(format!(
                        "Failed to create Kafka producer: {}",
                        e
                    ))
                })?;

            info!(
                bootstrap_servers = %config.bootstrap_servers,
                "Connected to Kafka"
            );

            Ok(Self { producer })
        }
    }

    #[async_trait]
    impl MessageBroker for KafkaBroker {
        async fn publish(
            &self,
            topic: &str,
            key: &str,
            payload: &[u8],
            deadline: &Deadline,
        ) -> Result<(), MessageQueueError> {
            if deadline.is_expired() {
                return Err(MessageQueueError::Timeout);
            }

            let record = FutureRecord::to(topic).key(key).payload(payload);

            self.producer
                .send(record, deadline.budget(MAX_SEND_TIMEOUT))
                .await
                .map_err(|(e, _)| MessageQueueError::PublishFailed(e.to_string()))?;

            debug!(topic = %topic, key = %key, "Published message to Kafka");
            Ok(())
        }
    }
}
