use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

/// Error payload returned by every HTTP endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Conflict")
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Present when an order was created even though the request did not fully succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

/// Coarse classification of a [`ServiceError`], used by callers to decide
/// whether a request may be retried and how it should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad request shape or invalid line items. Never retried.
    Validation,
    /// The idempotency token was already used. Equivalent to "already processed".
    Duplicate,
    /// The product service (or another upstream) failed. Safe to retry.
    Dependency,
    /// The checkout transaction failed and was rolled back. Safe to retry.
    Persistence,
    /// The order was committed but the order-created notification was not delivered.
    Notification,
    /// Unexpected internal failure.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Product {0} not found")]
    ProductNotFound(i64),

    #[error("Duplicate product {0} in checkout")]
    DuplicateProduct(i64),

    #[error("Product {product_id} has invalid price {price}")]
    InvalidPrice { product_id: i64, price: Decimal },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("Duplicate request: idempotency token '{0}' already processed")]
    DuplicateRequest(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Circuit breaker open")]
    CircuitBreakerOpen,

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Order {order_id} created, notification pending: {reason}")]
    NotificationPending { order_id: i64, reason: String },

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Convenience constructor for wrapping string-based database errors.
    pub fn database_error_message(message: impl Into<String>) -> Self {
        ServiceError::DatabaseError(DbErr::Custom(message.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_)
            | Self::ProductNotFound(_)
            | Self::DuplicateProduct(_)
            | Self::InvalidPrice { .. }
            | Self::InsufficientStock { .. } => ErrorKind::Validation,
            Self::DuplicateRequest(_) => ErrorKind::Duplicate,
            Self::ExternalServiceError(_)
            | Self::CircuitBreakerOpen
            | Self::DeadlineExceeded(_) => ErrorKind::Dependency,
            Self::DatabaseError(_) => ErrorKind::Persistence,
            Self::NotificationPending { .. } | Self::QueueError(_) => ErrorKind::Notification,
            Self::SerializationError(_) | Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Whether resubmitting the same checkout can succeed without creating a duplicate.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Dependency | ErrorKind::Persistence)
    }

    /// Id of an order that exists despite this error.
    pub fn committed_order_id(&self) -> Option<i64> {
        match self {
            Self::NotificationPending { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_)
            | Self::ProductNotFound(_)
            | Self::DuplicateProduct(_)
            | Self::InvalidPrice { .. } => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DuplicateRequest(_) => StatusCode::CONFLICT,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::CircuitBreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::NotificationPending { .. } => StatusCode::ACCEPTED,
            Self::DatabaseError(_)
            | Self::QueueError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code included in error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "persistence_error",
            Self::ValidationError(_) => "validation_error",
            Self::ProductNotFound(_) => "product_not_found",
            Self::DuplicateProduct(_) => "duplicate_product",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::DuplicateRequest(_) => "duplicate_request",
            Self::ExternalServiceError(_) => "dependency_error",
            Self::CircuitBreakerOpen => "dependency_unavailable",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::NotificationPending { .. } => "notification_pending",
            Self::QueueError(_) => "notification_error",
            Self::SerializationError(_) => "serialization_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::QueueError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::CircuitBreakerOpen => "Product service temporarily unavailable".to_string(),
            Self::NotificationPending { order_id, .. } => {
                format!("Order {} created, notification pending", order_id)
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            order_id: self.committed_order_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ProductNotFound(9).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                product_id: 1,
                requested: 3,
                available: 2
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::DuplicateRequest("tok".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ExternalServiceError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::CircuitBreakerOpen.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::database_error_message("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_kinds_follow_taxonomy() {
        assert_eq!(ServiceError::DuplicateProduct(1).kind(), ErrorKind::Validation);
        assert_eq!(
            ServiceError::DuplicateRequest("t".into()).kind(),
            ErrorKind::Duplicate
        );
        assert_eq!(
            ServiceError::ExternalServiceError("down".into()).kind(),
            ErrorKind::Dependency
        );
        assert_eq!(
            ServiceError::database_error_message("x").kind(),
            ErrorKind::Persistence
        );
        assert_eq!(
            ServiceError::NotificationPending {
                order_id: 1,
                reason: "broker down".into()
            }
            .kind(),
            ErrorKind::Notification
        );
    }

    #[test]
    fn only_dependency_and_persistence_errors_are_retryable() {
        assert!(ServiceError::ExternalServiceError("x".into()).is_retryable());
        assert!(ServiceError::database_error_message("x").is_retryable());
        assert!(!ServiceError::ProductNotFound(1).is_retryable());
        assert!(!ServiceError::DuplicateRequest("t".into()).is_retryable());
        assert!(!ServiceError::NotificationPending {
            order_id: 3,
            reason: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::database_error_message("connection string leaked").response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::SerializationError("bad json".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::ProductNotFound(42).response_message(),
            "Product 42 not found"
        );
    }

    #[tokio::test]
    async fn notification_pending_response_carries_order_id() {
        let response = ServiceError::NotificationPending {
            order_id: 77,
            reason: "broker unreachable".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.order_id, Some(77));
        assert_eq!(payload.code, "notification_pending");
    }
}
