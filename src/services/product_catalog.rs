use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::AppConfig;
use crate::deadline::Deadline;
use crate::errors::ServiceError;
use crate::models::Product;

/// Source of authoritative product price and stock.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up one product. `Ok(None)` means the service answered "not found".
    async fn fetch_product(
        &self,
        product_id: i64,
        deadline: &Deadline,
    ) -> Result<Option<Product>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    #[serde(alias = "data")]
    product: Product,
}

/// Product service client speaking `GET {base}/v1/product/{id}`.
#[derive(Clone)]
pub struct HttpProductCatalog {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    breaker: CircuitBreaker,
}

impl HttpProductCatalog {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        breaker: CircuitBreaker,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            breaker,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let breaker = CircuitBreaker::new(
            "product-service",
            CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker_failure_threshold,
                timeout: config.circuit_breaker_timeout(),
                ..Default::default()
            },
        );
        Self::new(
            config.product_service_url.clone(),
            config.product_service_timeout(),
            breaker,
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn request_product(
        &self,
        product_id: i64,
        deadline: &Deadline,
    ) -> Result<Option<Product>, ServiceError> {
        let url = format!("{}/v1/product/{}", self.base_url, product_id);
        debug!(%url, "Requesting product info");

        let response = self
            .client
            .get(&url)
            .timeout(deadline.budget(self.request_timeout))
            .send()
            .await
            .map_err(|e| {
                error!(product_id, error = %e, "Product service request failed");
                ServiceError::ExternalServiceError(format!(
                    "product service request for {} failed: {}",
                    product_id, e
                ))
            })?;

        match response.status() {
            StatusCode::OK => {
                let envelope = response.json::<ProductEnvelope>().await.map_err(|e| {
                    ServiceError::ExternalServiceError(format!(
                        "invalid product service response for {}: {}",
                        product_id, e
                    ))
                })?;
                Ok(Some(envelope.product))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ServiceError::ExternalServiceError(format!(
                "product service returned {} for product {}",
                status, product_id
            ))),
        }
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    #[instrument(skip(self, deadline))]
    async fn fetch_product(
        &self,
        product_id: i64,
        deadline: &Deadline,
    ) -> Result<Option<Product>, ServiceError> {
        let lookup = self.breaker.call(self.request_product(product_id, deadline));
        deadline.run("product lookup", lookup).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog(server: &MockServer, threshold: u32) -> HttpProductCatalog {
        HttpProductCatalog::new(
            server.uri(),
            Duration::from_secs(2),
            CircuitBreaker::new(
                "product-service",
                CircuitBreakerConfig {
                    failure_threshold: threshold,
                    timeout: Duration::from_secs(60),
                    success_threshold: 1,
                },
            ),
        )
        .unwrap()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn decodes_product_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "product": {"id": 42, "name": "mug", "price": "10.0", "stock": 5}
            })))
            .mount(&server)
            .await;

        let product = catalog(&server, 5)
            .fetch_product(42, &deadline())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.id, 42);
        assert_eq!(product.price, dec!(10.0));
        assert_eq!(product.stock, 5);
    }

    #[tokio::test]
    async fn accepts_data_alias() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": 7, "price": 3.5, "stock": 1}
            })))
            .mount(&server)
            .await;

        let product = catalog(&server, 5)
            .fetch_product(7, &deadline())
            .await
            .unwrap();
        assert_eq!(product.map(|p| p.price), Some(dec!(3.5)));
    }

    #[tokio::test]
    async fn not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let product = catalog(&server, 5)
            .fetch_product(1, &deadline())
            .await
            .unwrap();
        assert!(product.is_none());
    }

    #[tokio::test]
    async fn malformed_body_fails_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = catalog(&server, 5).fetch_product(1, &deadline()).await;
        assert_matches!(result, Err(ServiceError::ExternalServiceError(_)));
    }

    #[tokio::test]
    async fn repeated_server_errors_open_the_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let catalog = catalog(&server, 2);
        for _ in 0..2 {
            assert_matches!(
                catalog.fetch_product(1, &deadline()).await,
                Err(ServiceError::ExternalServiceError(_))
            );
        }
        assert_eq!(catalog.breaker().state(), CircuitState::Open);
        assert_matches!(
            catalog.fetch_product(1, &deadline()).await,
            Err(ServiceError::CircuitBreakerOpen)
        );
    }

    #[tokio::test]
    async fn slow_service_hits_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"product": {"id": 1, "price": 1, "stock": 1}})),
            )
            .mount(&server)
            .await;

        let short = Deadline::after(Duration::from_millis(50));
        let result = catalog(&server, 5).fetch_product(1, &short).await;
        assert!(matches!(
            result,
            Err(ServiceError::DeadlineExceeded(_)) | Err(ServiceError::ExternalServiceError(_))
        ));
    }
}
