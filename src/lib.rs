//! Order Checkout Service
//!
//! Turns shopping carts into persisted orders exactly once per idempotency
//! token and announces each new order on a message broker.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod deadline;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod message_queue;
pub mod migrator;
pub mod models;
pub mod queries;
pub mod repositories;
pub mod services;

use axum::{
    extract::FromRef,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use prometheus::{Encoder, TextEncoder};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventPublisher;
use crate::message_queue::{InMemoryBroker, MessageBroker};
use crate::repositories::order_repository::OrderRepository;
use crate::services::checkout::{CheckoutPolicy, CheckoutService};
use crate::services::idempotency::IdempotencyGuard;
use crate::services::product_catalog::ProductCatalog;
use crate::services::product_validator::ProductValidator;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub checkout: CheckoutService,
    pub orders: OrderRepository,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires the checkout pipeline on top of the given collaborators.
    pub fn new(
        config: AppConfig,
        db: Arc<DatabaseConnection>,
        catalog: Arc<dyn ProductCatalog>,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        let orders = OrderRepository::new(db.clone());
        let checkout = CheckoutService::new(
            IdempotencyGuard::new(db.clone()),
            ProductValidator::new(catalog),
            orders.clone(),
            EventPublisher::new(broker, config.order_created_topic.clone()),
            CheckoutPolicy {
                require_notification: config.require_notification,
            },
        );
        let auth = Arc::new(AuthService::new(&config.jwt_secret));

        Self {
            db,
            config,
            checkout,
            orders,
            auth,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Selects the broker named by `broker_backend`.
pub fn build_broker(config: &AppConfig) -> Result<Arc<dyn MessageBroker>, ServiceError> {
    match config.broker_backend.to_ascii_lowercase().as_str() {
        "kafka" => kafka_broker(config),
        _ => {
            info!("Using in-memory message broker");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

#[cfg(feature = "kafka")]
fn kafka_broker(config: &AppConfig) -> Result<Arc<dyn MessageBroker>, ServiceError> {
    use crate::message_queue::{KafkaBroker, KafkaBrokerConfig};

    let bootstrap_servers = config.kafka_brokers.clone().ok_or_else(|| {
        ServiceError::InternalError("kafka_brokers must be set for the kafka backend".into())
    })?;
    Ok(Arc::new(KafkaBroker::new(KafkaBrokerConfig {
        bootstrap_servers,
    })?))
}

#[cfg(not(feature = "kafka"))]
fn kafka_broker(_config: &AppConfig) -> Result<Arc<dyn MessageBroker>, ServiceError> {
    Err(ServiceError::InternalError(
        "broker_backend is kafka but the binary was built without the `kafka` feature".into(),
    ))
}

async fn metrics_handler() -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            String::from_utf8_lossy(&buffer).into_owned(),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("metrics error"),
        ),
    }
}

/// API routes under `/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::orders::checkout))
        .route("/order_history", get(handlers::orders::order_history))
}

/// Full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(metrics_handler))
        .nest("/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
