use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::deadline::Deadline;
use crate::entities::order_request_log;
use crate::errors::ServiceError;

/// Duplicate-submission guard backed by the `order_request_log` table.
///
/// A token row is written in the same transaction as the order it produced,
/// so its presence means that checkout committed. Lookup errors propagate;
/// they are never read as "token unused".
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    db: Arc<DatabaseConnection>,
}

impl IdempotencyGuard {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, deadline))]
    pub async fn exists(&self, token: &str, deadline: &Deadline) -> Result<bool, ServiceError> {
        let lookup = order_request_log::Entity::find()
            .filter(order_request_log::Column::IdempotencyToken.eq(token))
            .count(self.db.as_ref());

        let count = deadline
            .run("idempotency lookup", async {
                lookup.await.map_err(ServiceError::DatabaseError)
            })
            .await?;

        debug!(found = count > 0, "Idempotency token checked");
        Ok(count > 0)
    }

    /// Records `token` on `conn`, normally the open checkout transaction.
    ///
    /// A concurrent checkout that already wrote the same token surfaces as a
    /// unique violation and is reported as [`ServiceError::DuplicateRequest`].
    pub async fn record<C>(conn: &C, token: &str, now: DateTime<Utc>) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        order_request_log::ActiveModel {
            idempotency_token: Set(token.to_string()),
            create_time: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(|e| map_record_error(token, e))?;

        Ok(())
    }
}

fn map_record_error(token: &str, err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            warn!(token, "Idempotency token inserted concurrently");
            ServiceError::DuplicateRequest(token.to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}
