use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_BROKER_BACKEND: &str = "in-memory";
const DEFAULT_ORDER_CREATED_TOPIC: &str = "order.created";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Base URL of the product service (e.g. `http://products:8081`)
    #[validate(url)]
    pub product_service_url: String,

    /// Upper bound for a single product lookup, applied below the request deadline
    #[serde(default = "default_product_service_timeout_ms")]
    pub product_service_timeout_ms: u64,

    /// Number of consecutive product service failures before the breaker opens
    #[serde(default = "default_circuit_breaker_failures")]
    pub circuit_breaker_failure_threshold: u32,

    /// Circuit breaker reset timeout in seconds
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_secs: u64,

    /// Broker backend selection ("in-memory" or "kafka")
    #[serde(default = "default_broker_backend")]
    #[validate(custom = "validate_broker_backend")]
    pub broker_backend: String,

    /// Comma-separated Kafka bootstrap servers
    #[serde(default)]
    pub kafka_brokers: Option<String>,

    /// Topic receiving order-created notifications
    #[serde(default = "default_order_created_topic")]
    #[validate(length(min = 1))]
    pub order_created_topic: String,

    /// Deadline applied to a whole checkout request
    #[serde(default = "default_request_timeout_ms")]
    #[validate(range(min = 1, max = 120000))]
    pub request_timeout_ms: u64,

    /// Report checkout failure (with the order id) when the notification cannot be published
    #[serde(default)]
    pub require_notification: bool,

    /// HS256 secret used to verify bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the connection endpoints.
    pub fn new(
        database_url: String,
        product_service_url: String,
        jwt_secret: String,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            product_service_url,
            product_service_timeout_ms: default_product_service_timeout_ms(),
            circuit_breaker_failure_threshold: default_circuit_breaker_failures(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout(),
            broker_backend: default_broker_backend(),
            kafka_brokers: None,
            order_created_topic: default_order_created_topic(),
            request_timeout_ms: default_request_timeout_ms(),
            require_notification: false,
            jwt_secret,
        }
    }

    /// Deadline budget for one checkout request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn product_service_timeout(&self) -> Duration {
        Duration::from_millis(self.product_service_timeout_ms)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationError> {
        if self.broker_backend.eq_ignore_ascii_case("kafka")
            && self
                .kafka_brokers
                .as_deref()
                .map_or(true, |b| b.trim().is_empty())
        {
            let mut err = ValidationError::new("kafka_brokers_required");
            err.message = Some("Set APP__KAFKA_BROKERS when broker_backend is kafka".into());
            return Err(err);
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Configuration constraint violated: {0}")]
    Constraint(ValidationError),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_product_service_timeout_ms() -> u64 {
    3_000
}

fn default_circuit_breaker_failures() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    30
}

fn default_broker_backend() -> String {
    DEFAULT_BROKER_BACKEND.to_string()
}

fn default_order_created_topic() -> String {
    DEFAULT_ORDER_CREATED_TOPIC.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn validate_broker_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "kafka" => Ok(()),
        _ => {
            let mut err = ValidationError::new("broker_backend");
            err.message = Some("Must be one of: in-memory, kafka".into());
            Err(err)
        }
    }
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("order_checkout={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://orders.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("product_service_url", "http://localhost:8081")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint failed: {:?}", e);
        AppConfigError::Constraint(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "http://127.0.0.1:8081".into(),
            "a_test_secret_that_is_long_enough_for_hs256".into(),
            "test".into(),
        )
    }

    #[test]
    fn base_config_is_valid() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.order_created_topic, "order.created");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_unknown_broker_backend() {
        let mut cfg = base_config();
        cfg.broker_backend = "carrier-pigeon".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn kafka_backend_requires_brokers() {
        let mut cfg = base_config();
        cfg.broker_backend = "kafka".into();
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.kafka_brokers = Some("localhost:9093".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn rejects_invalid_product_service_url() {
        let mut cfg = base_config();
        cfg.product_service_url = "not a url".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "loud".into();
        assert!(cfg.validate().is_err());
    }
}
