use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    auth::AuthenticatedUser,
    deadline::Deadline,
    errors::ServiceError,
    models::{CheckoutRequest, OrderHistoryEntry, OrderHistoryQuery},
    queries::{order_history::GetOrderHistoryQuery, Query as _},
    services::checkout::NotificationStatus,
    AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub ok: bool,
    pub order_id: i64,
    pub notification: NotificationStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderHistoryResponse {
    pub data: Vec<OrderHistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OrderHistoryParams {
    /// Raw status code; parsed by the handler so bad input gets a JSON error.
    pub status: Option<String>,
}

fn parse_status(raw: Option<&str>) -> Result<Option<i32>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<i32>().map(Some).map_err(|_| {
            ServiceError::ValidationError(format!("status must be numeric, got '{}'", value))
        }),
    }
}

/// Place an order for the authenticated user.
#[instrument(skip(state, payload), fields(user_id = user.user_id))]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(mut request) = payload.map_err(|rejection| {
        ServiceError::ValidationError(format!("invalid checkout payload: {}", rejection.body_text()))
    })?;
    request.user_id = user.user_id;

    let deadline = Deadline::after(state.config.request_timeout());
    let receipt = state.checkout.checkout(&request, &deadline).await?;

    info!(order_id = receipt.order_id, "Checkout accepted");
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            ok: true,
            order_id: receipt.order_id,
            notification: receipt.notification,
        }),
    ))
}

/// List the authenticated user's orders, optionally filtered by status code.
#[instrument(skip(state, params), fields(user_id = user.user_id))]
pub async fn order_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<OrderHistoryParams>,
) -> Result<Json<OrderHistoryResponse>, ServiceError> {
    let filter = OrderHistoryQuery {
        user_id: user.user_id,
        status: parse_status(params.status.as_deref())?,
    };

    let deadline = Deadline::after(state.config.request_timeout());
    let data = GetOrderHistoryQuery::new(filter)
        .execute(&state.orders, &deadline)
        .await?;

    Ok(Json(OrderHistoryResponse { data }))
}
