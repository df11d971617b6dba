use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::errors::ServiceError;
use crate::repositories::order_repository::OrderRepository;

pub mod order_history;

/// Trait representing a generic asynchronous read-only query.
#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    /// Executes the query against the order store
    async fn execute(
        &self,
        repository: &OrderRepository,
        deadline: &Deadline,
    ) -> Result<Self::Result, ServiceError>;
}
