#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseBackend as DbBackend, Statement};
use serde_json::Value;
use tower::ServiceExt;

use order_checkout::{
    config::AppConfig,
    db::{self, DbConfig},
    deadline::Deadline,
    errors::ServiceError,
    message_queue::{InMemoryBroker, MessageBroker, MessageQueueError},
    models::Product,
    services::product_catalog::ProductCatalog,
    AppState,
};

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const ORDER_CREATED_TOPIC: &str = "order.created";

/// Product service double holding a fixed price list.
#[derive(Default)]
pub struct StubCatalog {
    products: Mutex<HashMap<i64, Product>>,
    lookups: AtomicUsize,
    unavailable: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl StubCatalog {
    pub fn with_product(self, id: i64, price: Decimal, stock: i64) -> Self {
        self.put(id, price, stock);
        self
    }

    pub fn put(&self, id: i64, price: Decimal, stock: i64) {
        self.products.lock().unwrap().insert(
            id,
            Product {
                id,
                name: Some(format!("product-{id}")),
                price,
                stock,
            },
        );
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Answer every lookup only after `delay`, ignoring the caller's deadline.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductCatalog for StubCatalog {
    async fn fetch_product(
        &self,
        product_id: i64,
        _deadline: &Deadline,
    ) -> Result<Option<Product>, ServiceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.unavailable.lock().unwrap() {
            return Err(ServiceError::ExternalServiceError(
                "product service unreachable".into(),
            ));
        }
        Ok(self.products.lock().unwrap().get(&product_id).cloned())
    }
}

/// Broker that rejects every publish.
pub struct FailingBroker;

#[async_trait]
impl MessageBroker for FailingBroker {
    async fn publish(
        &self,
        _topic: &str,
        _key: &str,
        _payload: &[u8],
        _deadline: &Deadline,
    ) -> Result<(), MessageQueueError> {
        Err(MessageQueueError::ConnectionError("broker down".into()))
    }
}

pub enum BrokerKind {
    InMemory,
    Failing,
}

pub struct TestOptions {
    pub broker: BrokerKind,
    pub require_notification: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            broker: BrokerKind::InMemory,
            require_notification: false,
        }
    }
}

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub catalog: Arc<StubCatalog>,
    pub broker: InMemoryBroker,
}

impl TestApp {
    pub async fn new(catalog: StubCatalog) -> Self {
        Self::with_options(catalog, TestOptions::default()).await
    }

    pub async fn with_options(catalog: StubCatalog, options: TestOptions) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "http://127.0.0.1:1".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.require_notification = options.require_notification;

        // A single connection keeps every query on the same in-memory database.
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let catalog = Arc::new(catalog);
        let broker = InMemoryBroker::new();
        let broker_handle: Arc<dyn MessageBroker> = match options.broker {
            BrokerKind::InMemory => Arc::new(broker.clone()),
            BrokerKind::Failing => Arc::new(FailingBroker),
        };

        let state = AppState::new(cfg, Arc::new(pool), catalog.clone(), broker_handle);
        let router = order_checkout::app_router(state.clone());

        Self {
            router,
            state,
            catalog,
            broker,
        }
    }

    /// Bearer token for `user_id`.
    pub fn token_for(&self, user_id: i64) -> String {
        self.state
            .auth
            .issue_token(user_id, chrono::Duration::hours(1))
            .expect("encode access token")
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    pub async fn execute_sql(&self, sql: &str) {
        self.state
            .db
            .execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await
            .expect("sql statement");
    }

    pub async fn order_count(&self) -> u64 {
        self.state.orders.count_orders().await.expect("count orders")
    }

    pub async fn detail_count(&self) -> u64 {
        self.state
            .orders
            .count_details()
            .await
            .expect("count order details")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as(
        &self,
        user_id: i64,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let token = self.token_for(user_id);
        self.request(method, uri, body, Some(&token)).await
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body bytes")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json response")
}
