use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.razorpay.com";
const DEV_GATEWAY_KEY_SECRET: &str = "dev_gateway_secret_do_not_use_in_production";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
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

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB pool: connect timeout in seconds
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// DB pool: acquire timeout in seconds
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// DB pool: idle timeout in seconds
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Capacity of the in-process domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Per-request timeout applied by the HTTP layer
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Tax rate applied to the checkout subtotal (0.18 = 18%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub tax_rate: Decimal,

    /// Flat service fee added to every checkout
    #[serde(default = "default_service_fee")]
    #[validate(custom = "validate_service_fee")]
    pub service_fee: Decimal,

    /// Commission percentage stamped onto new orders (10.00 = 10%)
    #[serde(default = "default_commission_percentage")]
    #[validate(custom = "validate_commission_percentage")]
    pub default_commission_percentage: Decimal,

    /// ISO 4217 currency used for gateway orders
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,

    /// Lifetime of a staged buy-now slot
    #[serde(default = "default_buy_now_ttl_secs")]
    pub buy_now_ttl_secs: u64,

    /// Payment gateway API base URL
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Payment gateway public key id (exposed to the checkout page)
    #[serde(default)]
    pub gateway_key_id: String,

    /// Payment gateway shared secret; signs payment callbacks
    #[validate(length(min = 8))]
    pub gateway_key_secret: String,

    /// Payment gateway request timeout in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1))]
    pub gateway_timeout_secs: u64,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, gateway_key_secret: String, environment: String) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            tax_rate: default_tax_rate(),
            service_fee: default_service_fee(),
            default_commission_percentage: default_commission_percentage(),
            currency: default_currency(),
            buy_now_ttl_secs: default_buy_now_ttl_secs(),
            gateway_base_url: default_gateway_base_url(),
            gateway_key_id: String::new(),
            gateway_key_secret,
            gateway_timeout_secs: default_gateway_timeout_secs(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|s| s.split(',').any(|o| !o.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.gateway_key_secret.trim() == DEV_GATEWAY_KEY_SECRET {
            let mut err = ValidationError::new("gateway_key_secret_default_dev");
            err.message = Some(
                "The bundled development gateway secret must not be used outside development. Set APP__GATEWAY_KEY_SECRET."
                    .into(),
            );
            errors.add("gateway_key_secret", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_tax_rate() -> Decimal {
    dec!(0.18)
}

fn default_service_fee() -> Decimal {
    dec!(100.00)
}

fn default_commission_percentage() -> Decimal {
    dec!(10.00)
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_buy_now_ttl_secs() -> u64 {
    1800
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    10
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

fn validate_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_service_fee(fee: &Decimal) -> Result<(), ValidationError> {
    if fee.is_sign_negative() {
        let mut err = ValidationError::new("service_fee");
        err.message = Some("service_fee must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_commission_percentage(pct: &Decimal) -> Result<(), ValidationError> {
    if pct.is_sign_negative() || *pct > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("default_commission_percentage");
        err.message = Some("default_commission_percentage must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("currency must be a three-letter ISO 4217 code".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("lumoskart_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
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
    // Support both RUN_ENV and APP_ENV for selecting config profile
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

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://lumoskart.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?;

    // Only development gets a bundled gateway secret
    if run_env.eq_ignore_ascii_case(DEFAULT_ENV) {
        builder = builder.set_default("gateway_key_secret", DEV_GATEWAY_KEY_SECRET)?;
    }

    let config = builder
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("gateway_key_secret").is_err() {
        error!("Payment gateway secret is not configured. Set APP__GATEWAY_KEY_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "gateway_key_secret is required but not configured. Set APP__GATEWAY_KEY_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
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
            "gateway_secret_for_tests".into(),
            "production".into(),
        )
    }

    #[test]
    fn defaults_match_commerce_policy() {
        let cfg = base_config();
        assert_eq!(cfg.tax_rate, dec!(0.18));
        assert_eq!(cfg.service_fee, dec!(100.00));
        assert_eq!(cfg.default_commission_percentage, dec!(10.00));
        assert_eq!(cfg.currency, "INR");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_policy_values() {
        let mut cfg = base_config();
        cfg.tax_rate = dec!(1.5);
        cfg.default_commission_percentage = dec!(120);
        cfg.service_fee = dec!(-1);
        cfg.currency = "rupees".into();

        let errors = cfg.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("tax_rate"));
        assert!(fields.contains_key("default_commission_percentage"));
        assert!(fields.contains_key("service_fee"));
        assert!(fields.contains_key("currency"));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn dev_gateway_secret_rejected_outside_development() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.gateway_key_secret = DEV_GATEWAY_KEY_SECRET.into();
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }
}
