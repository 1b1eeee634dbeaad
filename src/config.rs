use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CACHE_BACKEND: &str = "in-memory";
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_KEY_PREFIX: &str = "storefront";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.sandbox.midtrans.com";
const DEFAULT_ORDER_ID_PREFIX: &str = "ORD";
const DEFAULT_LOCK_TTL_SECS: u64 = 30;

/// Product read cache
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CacheConfig {
    /// "in-memory" or "redis"
    #[serde(default = "default_backend")]
    #[validate(custom = "validate_backend")]
    pub backend: String,

    #[serde(default = "default_cache_ttl_secs")]
    #[validate(range(min = 1))]
    pub ttl_secs: u64,

    #[serde(default = "default_key_prefix")]
    #[validate(length(min = 1))]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            key_prefix: default_key_prefix(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Payment gateway (Core API style) connection settings
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    #[validate(length(min = 1))]
    pub base_url: String,

    /// Server key, sent as the basic auth username and used for notification signatures
    #[serde(default)]
    pub server_key: String,

    /// Prefix of the gateway order reference `<prefix>-<transaction id>-<unix seconds>`
    #[serde(default = "default_order_id_prefix")]
    #[validate(length(min = 1, max = 16))]
    pub order_id_prefix: String,

    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,

    #[serde(default)]
    pub verify_notification_signature: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            server_key: String::new(),
            order_id_prefix: default_order_id_prefix(),
            timeout_secs: default_gateway_timeout_secs(),
            verify_notification_signature: false,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// What to store when the gateway reports a status with no domain mapping.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedStatusPolicy {
    /// Overwrite the stored status with an empty string.
    #[default]
    Record,
    /// Leave the stored status untouched.
    Ignore,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub unmapped_status: UnmappedStatusPolicy,

    /// Refuse to move a payment record out of `success`/`failure`
    #[serde(default = "default_true_bool")]
    pub guard_terminal_status: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            unmapped_status: UnmappedStatusPolicy::default(),
            guard_terminal_status: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct LockConfig {
    /// "in-memory" or "redis"
    #[serde(default = "default_backend")]
    #[validate(custom = "validate_backend")]
    pub backend: String,

    #[serde(default = "default_lock_ttl_secs")]
    #[validate(range(min = 1, max = 600))]
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ttl_secs: DEFAULT_LOCK_TTL_SECS,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    pub database_url: String,

    pub redis_url: String,

    /// HS256 signing secret
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[validate(range(min = 60, max = 86400))]
    pub jwt_expiration: u64,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Run embedded migrations at startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Comma separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    #[validate]
    pub cache: CacheConfig,

    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    #[validate]
    pub locks: LockConfig,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the essentials.
    pub fn new(
        database_url: String,
        redis_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            jwt_secret,
            jwt_expiration: 3600,
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            cors_allowed_origins: None,
            cache: CacheConfig::default(),
            gateway: GatewayConfig::default(),
            webhook: WebhookConfig::default(),
            locks: LockConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
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

fn default_backend() -> String {
    DEFAULT_CACHE_BACKEND.to_string()
}
fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}
fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}
fn default_order_id_prefix() -> String {
    DEFAULT_ORDER_ID_PREFIX.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    15
}
fn default_lock_ttl_secs() -> u64 {
    DEFAULT_LOCK_TTL_SECS
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true_bool() -> bool {
    true
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
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_auth_issuer() -> String {
    "storefront-auth".to_string()
}
fn default_auth_audience() -> String {
    "storefront-api".to_string()
}

fn validate_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("backend");
            err.message = Some("backend must be either 'in-memory' or 'redis'".into());
            Err(err)
        }
    }
}

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

    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    let lower = trimmed.to_ascii_lowercase();
    if DISALLOWED.iter().any(|bad| lower.contains(bad)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
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
/// 3. Environment-specific config (config/{RUN_ENV}.toml)
/// 4. Environment variables (APP__*, `__` separates nested keys)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

pub fn load_config_from(config_dir: &str) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(config_dir).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir
        );
    }

    // jwt_secret deliberately has no default
    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a random string of at least 32 characters.");
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

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SECRET: &str = "a4f9c1e07b2d4e6f8a0b3c5d7e9f1a2b4c6d8e0f";

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "redis://127.0.0.1:6379".into(),
            SECRET.into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cache.ttl(), Duration::from_secs(60));
        assert_eq!(cfg.gateway.order_id_prefix, "ORD");
        assert_eq!(cfg.webhook.unmapped_status, UnmappedStatusPolicy::Record);
        assert!(cfg.webhook.guard_terminal_status);
    }

    #[test]
    fn rejects_short_jwt_secret() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_cache_backend() {
        let mut cfg = base_config();
        cfg.cache.backend = "memcached".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_cache_ttl() {
        let mut cfg = base_config();
        cfg.cache.ttl_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_nested_sections_from_file() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
jwt_secret = "{SECRET}"

[gateway]
server_key = "SB-Mid-server-test"
order_id_prefix = "SYN"

[webhook]
unmapped_status = "ignore"
guard_terminal_status = false
"#
        )
        .unwrap();

        let cfg = load_config_from(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.gateway.server_key, "SB-Mid-server-test");
        assert_eq!(cfg.gateway.order_id_prefix, "SYN");
        assert_eq!(cfg.webhook.unmapped_status, UnmappedStatusPolicy::Ignore);
        assert!(!cfg.webhook.guard_terminal_status);
        assert_eq!(cfg.cache.backend, "in-memory");
    }
}
