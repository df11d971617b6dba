use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub database: ComponentStatus,
    pub database_latency_ms: u64,
}

/// Liveness plus a database ping; 503 when the database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();
    let db_ok = crate::db::check_connection(&state.db).await.is_ok();
    let latency = start.elapsed().as_millis() as u64;

    let (code, status) = if db_ok {
        (StatusCode::OK, ComponentStatus::Up)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, ComponentStatus::Down)
    };

    (
        code,
        Json(HealthResponse {
            status: status.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            database: status,
            database_latency_ms: latency,
        }),
    )
}
