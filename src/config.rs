use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";
const DEFAULT_CURRENCY: &str = "GHS";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (Postgres in production, SQLite for local runs)
    #[validate(length(min = 1, message = "database_url is required"))]
    pub database_url: String,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 500))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Run embedded migrations at startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    /// Host address to bind
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    /// development, staging or production
    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// HS256 secret used to verify bearer tokens issued by the auth service
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Comma-separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub cors_allow_any_origin: bool,

    // ========== Paystack ==========
    #[validate(length(min = 1, message = "paystack_secret_key is required"))]
    pub paystack_secret_key: String,

    #[serde(default = "default_paystack_base_url")]
    #[validate(length(min = 1))]
    pub paystack_base_url: String,

    /// Where the hosted payment page redirects the customer afterwards
    #[serde(default)]
    pub paystack_callback_url: Option<String>,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3, message = "currency must be an ISO 4217 code"))]
    pub currency: String,

    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    // ========== Pending payment sweeper ==========
    #[serde(default = "default_true_bool")]
    pub payment_sweeper_enabled: bool,

    /// Age after which a PENDING online-payment order is reconciled
    #[serde(default = "default_pending_payment_ttl_secs")]
    #[validate(range(min = 60))]
    pub pending_payment_ttl_secs: u64,

    #[serde(default = "default_payment_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub payment_sweep_interval_secs: u64,

    #[serde(default = "default_payment_sweep_batch_size")]
    #[validate(range(min = 1, max = 1000))]
    pub payment_sweep_batch_size: u64,

    // ========== Mail relay ==========
    /// Transactional mail relay endpoint; emails are only logged when unset
    #[serde(default)]
    pub mail_relay_url: Option<String>,

    #[serde(default)]
    pub mail_relay_api_key: Option<String>,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,
}

impl AppConfig {
    /// Builds a config with defaults for everything but the required settings.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        paystack_secret_key: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            auto_migrate: false,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            jwt_secret,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            paystack_secret_key,
            paystack_base_url: default_paystack_base_url(),
            paystack_callback_url: None,
            currency: default_currency(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            payment_sweeper_enabled: false,
            pending_payment_ttl_secs: default_pending_payment_ttl_secs(),
            payment_sweep_interval_secs: default_payment_sweep_interval_secs(),
            payment_sweep_batch_size: default_payment_sweep_batch_size(),
            mail_relay_url: None,
            mail_relay_api_key: None,
            mail_from: default_mail_from(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn pending_payment_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_payment_ttl_secs)
    }

    pub fn payment_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.payment_sweep_interval_secs)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
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

        if self.is_production() && self.paystack_secret_key.starts_with("sk_test_") {
            let mut err = ValidationError::new("paystack_secret_key_test_mode");
            err.message = Some("A Paystack test key must not be used in production".into());
            errors.add("paystack_secret_key", err);
        }

        if self.mail_relay_url.is_some() && self.mail_relay_api_key.is_none() {
            let mut err = ValidationError::new("mail_relay_api_key_required");
            err.message = Some("mail_relay_api_key is required when mail_relay_url is set".into());
            errors.add("mail_relay_api_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Deserializes and validates an already-built configuration.
    pub fn from_config(config: Config) -> Result<Self, AppConfigError> {
        for required in ["jwt_secret", "paystack_secret_key"] {
            if config.get_string(required).is_err() {
                error!(
                    "{} is not configured. Set APP__{} in the environment.",
                    required,
                    required.to_uppercase()
                );
                return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                    "{} is required but not configured",
                    required
                ))));
            }
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

        Ok(app_config)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
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
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_true_bool() -> bool {
    true
}
fn default_paystack_base_url() -> String {
    DEFAULT_PAYSTACK_BASE_URL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    15
}
fn default_pending_payment_ttl_secs() -> u64 {
    30 * 60
}
fn default_payment_sweep_interval_secs() -> u64 {
    5 * 60
}
fn default_payment_sweep_batch_size() -> u64 {
    50
}
fn default_mail_from() -> String {
    "orders@streetwear.local".to_string()
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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 32 characters".into());
        return Err(err);
    }

    const DISALLOWED: [&str; 3] = [
        "CHANGE_THIS_SECRET_IN_PRODUCTION",
        "your-secret-key",
        "default-secret-key",
    ];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=info", level);
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

fn base_builder() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)
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

    let config = base_builder()?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config = AppConfig::from_config(config)?;
    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const SECRET: &str = "k3y-for-tests-0123456789-abcdefghijklmnop";

    fn load_from(toml: &str) -> Result<AppConfig, AppConfigError> {
        let config = base_builder()
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        AppConfig::from_config(config)
    }

    fn minimal() -> String {
        format!(
            "jwt_secret = \"{SECRET}\"\npaystack_secret_key = \"sk_test_abc\"\n"
        )
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let cfg = load_from(&minimal()).unwrap();
        assert!(cfg.is_development());
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.currency, "GHS");
        assert_eq!(cfg.paystack_base_url, "https://api.paystack.co");
        assert_eq!(cfg.pending_payment_ttl(), Duration::from_secs(1800));
        assert_eq!(cfg.payment_sweep_batch_size, 50);
        assert!(cfg.mail_relay_url.is_none());
    }

    #[test]
    fn missing_paystack_secret_fails() {
        let toml = format!("jwt_secret = \"{SECRET}\"\n");
        let result = load_from(&toml);
        assert!(matches!(result, Err(AppConfigError::Load(_))));
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let result = load_from("jwt_secret = \"short\"\npaystack_secret_key = \"sk\"\n");
        match result {
            Err(AppConfigError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("jwt_secret"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|c| c.port)),
        }
    }

    #[test]
    fn production_requires_cors_origins_and_live_key() {
        let toml = format!("{}environment = \"production\"\n", minimal());
        let Err(AppConfigError::Validation(errors)) = load_from(&toml) else {
            panic!("expected validation failure");
        };
        let fields = errors.errors();
        assert!(fields.contains_key("cors_allowed_origins"));
        assert!(fields.contains_key("paystack_secret_key"));

        let toml = format!(
            "jwt_secret = \"{SECRET}\"\npaystack_secret_key = \"sk_live_abc\"\nenvironment = \"production\"\ncors_allowed_origins = \"https://shop.example\"\n"
        );
        assert!(load_from(&toml).unwrap().is_production());
    }

    #[test]
    fn mail_relay_needs_api_key() {
        let toml = format!("{}mail_relay_url = \"https://mail.example/send\"\n", minimal());
        assert!(matches!(
            load_from(&toml),
            Err(AppConfigError::Validation(_))
        ));
    }
}
