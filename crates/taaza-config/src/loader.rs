//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use std::path::Path;
use taaza_core::TaazaError;
use tracing::{debug, info, warn};

/// Snapshot of environment variables consulted by the loader.
pub type EnvMap = config::Map<String, String>;

/// Legacy deployment variables and the keys they override.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("REDIS_URL", "redis.url"),
    ("SMTP_HOST", "smtp.host"),
    ("SMTP_PORT", "smtp.port"),
    ("SMTP_USER", "smtp.username"),
    ("SMTP_PASS", "smtp.password"),
    ("SMTP_FROM", "smtp.from"),
    ("APP_URL", "email.templates.app_url"),
];

/// Configuration read once at startup.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Uncommitted local overrides
    /// 4. Environment variables with `TAAZA_` prefix
    /// 5. Legacy variables (`PORT`, `REDIS_URL`, `SMTP_*`, `APP_URL`)
    pub fn new(config_dir: &str) -> Result<Self, TaazaError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let config = load_config(config_dir, &std::env::vars().collect())?;
        info!(config_dir, "Configuration loaded");

        Ok(Self { config })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, TaazaError> {
        Self::new("./config")
    }

    /// Returns the loaded configuration.
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }
}

/// Loads configuration from `config_dir` using `env` in place of the process environment.
pub fn load_config(config_dir: &str, env: &EnvMap) -> Result<AppConfig, TaazaError> {
    let environment = env
        .get("TAAZA_ENVIRONMENT")
        .cloned()
        .unwrap_or_else(|| "development".to_string());

    info!(environment = %environment, config_dir, "Loading configuration");

    let mut builder = Config::builder();

    // 1. Load default configuration
    let default_path = format!("{config_dir}/default.toml");
    if Path::new(&default_path).exists() {
        debug!("Loading default config from: {}", default_path);
        builder = builder.add_source(File::with_name(&default_path).required(false));
    }

    // 2. Load environment-specific configuration
    let env_path = format!("{config_dir}/{environment}.toml");
    if Path::new(&env_path).exists() {
        debug!("Loading environment config from: {}", env_path);
        builder = builder.add_source(File::with_name(&env_path).required(false));
    }

    // 3. Load local overrides (not committed to version control)
    let local_path = format!("{config_dir}/local.toml");
    if Path::new(&local_path).exists() {
        debug!("Loading local config from: {}", local_path);
        builder = builder.add_source(File::with_name(&local_path).required(false));
    }

    // 4. Override with environment variables (TAAZA_ prefix)
    builder = builder.add_source(
        Environment::with_prefix("TAAZA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("server.cors_origins")
            .source(Some(env.clone())),
    );

    // 5. Legacy variables win over everything else
    builder = apply_legacy_overrides(builder, env).map_err(config_error_to_taaza_error)?;
    builder = builder
        .set_override("app.environment", environment)
        .map_err(config_error_to_taaza_error)?;

    let config = builder.build().map_err(config_error_to_taaza_error)?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(config_error_to_taaza_error)?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn apply_legacy_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    env: &EnvMap,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (var, key) in LEGACY_VARS {
        let Some(value) = env.get(*var).filter(|v| !v.is_empty()) else {
            continue;
        };
        debug!(var, key, "Applying legacy environment override");
        builder = match *key {
            "redis.url" => builder.set_override(*key, normalize_redis_url(value))?,
            "server.port" | "smtp.port" => {
                let port: i64 = value.parse().map_err(|_| {
                    ConfigError::Message(format!("{var} must be a port number, got '{value}'"))
                })?;
                builder.set_override(*key, port)?
            }
            _ => builder.set_override(*key, value.as_str())?,
        };
    }
    Ok(builder)
}

/// Adds the `redis://` scheme to bare `host:port` addresses.
#[must_use]
pub fn normalize_redis_url(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("redis://{url}")
    }
}

/// Validates the configuration.
fn validate_config(config: &AppConfig) -> Result<(), TaazaError> {
    if config.redis.url.is_empty() {
        return Err(TaazaError::Configuration("Redis URL is required".to_string()));
    }

    if config.smtp.host.is_empty() {
        return Err(TaazaError::Configuration("SMTP host is required".to_string()));
    }

    if config.email.worker_count == 0 {
        return Err(TaazaError::Configuration(
            "email.worker_count must be at least 1".to_string(),
        ));
    }

    if config.email.max_attempts == 0 {
        return Err(TaazaError::Configuration(
            "email.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.email.store_write_attempts == 0 {
        return Err(TaazaError::Configuration(
            "email.store_write_attempts must be at least 1".to_string(),
        ));
    }

    if config.email.dequeue_wait_secs == 0 {
        return Err(TaazaError::Configuration(
            "email.dequeue_wait_secs must be at least 1".to_string(),
        ));
    }

    if config.email.rate_limit.per_recipient_limit == 0 || config.email.rate_limit.window_secs == 0 {
        return Err(TaazaError::Configuration(
            "email.rate_limit limit and window must be at least 1".to_string(),
        ));
    }

    if config.app.environment == "production" && config.smtp.sender().is_empty() {
        warn!("No SMTP sender configured in production; deliveries will fail");
    }

    Ok(())
}

fn config_error_to_taaza_error(err: ConfigError) -> TaazaError {
    TaazaError::Configuration(err.to_string())
}
