use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_SHIPPING_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHIPPING_RETRIES: u32 = 2;
const DEFAULT_PAYMENT_EXPIRY_HOURS: i64 = 24;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret used to validate bearer tokens issued by the auth collaborator
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Flat service fee added to every cart, in IDR
    #[serde(default)]
    pub service_fee: f64,

    /// Base URL of the domestic shipping-rate API
    #[serde(default = "default_shipping_base_url")]
    pub shipping_base_url: String,

    /// API key for the shipping-rate API
    #[serde(default)]
    pub shipping_api_key: String,

    /// Per-request timeout for shipping-rate lookups, seconds
    #[serde(default = "default_shipping_timeout_secs")]
    pub shipping_timeout_secs: u64,

    /// Bounded retry count for shipping-rate lookups
    #[serde(default = "default_shipping_retries")]
    pub shipping_retries: u32,

    /// Base URL of the payment gateway
    #[serde(default = "default_payment_base_url")]
    pub payment_base_url: String,

    /// Server key for the payment gateway; also used to verify webhook
    /// signatures. When unset, webhook signatures are not enforced.
    #[serde(default)]
    pub payment_server_key: Option<String>,

    /// Hours until an unpaid order's payment handle expires
    #[serde(default = "default_payment_expiry_hours")]
    pub payment_expiry_hours: i64,

    /// Comma-separated explicit CORS origins; permissive in development when unset
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_shipping_base_url() -> String {
    "https://rajaongkir.komerce.id/api/v1".to_string()
}

fn default_shipping_timeout_secs() -> u64 {
    DEFAULT_SHIPPING_TIMEOUT_SECS
}

fn default_shipping_retries() -> u32 {
    DEFAULT_SHIPPING_RETRIES
}

fn default_payment_base_url() -> String {
    "https://api.sandbox.midtrans.com/v2".to_string()
}

fn default_payment_expiry_hours() -> i64 {
    DEFAULT_PAYMENT_EXPIRY_HOURS
}

impl AppConfig {
    /// Construct a configuration programmatically (used by tests).
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            service_fee: 0.0,
            shipping_base_url: default_shipping_base_url(),
            shipping_api_key: String::new(),
            shipping_timeout_secs: default_shipping_timeout_secs(),
            shipping_retries: default_shipping_retries(),
            payment_base_url: default_payment_base_url(),
            payment_server_key: None,
            payment_expiry_hours: default_payment_expiry_hours(),
            cors_allowed_origins: None,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Load configuration from defaults, `config/` files, and `APP__`-prefixed
/// environment variables, in increasing order of precedence.
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
        .set_default("database_url", "sqlite://lokapasar.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // jwt_secret has no default: it MUST come from a config file or the
    // environment so an insecure placeholder can never reach production.
    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET with a secure random string (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("lokapasar_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}
