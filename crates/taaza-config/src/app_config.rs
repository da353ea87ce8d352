//! Application configuration structures.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use taaza_core::LoggingConfig;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis connection configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// SMTP relay configuration.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Email queue and worker configuration.
    #[serde(default)]
    pub email: EmailConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "taaza-email".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// CORS allowed origins.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8084,
            request_timeout_secs: 30,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Key prefix for all email queue keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_key_prefix() -> String {
    "taaza:email".to_string()
}

/// SMTP relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host.
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Login user. Empty disables authentication.
    #[serde(default)]
    pub username: String,

    /// Login password.
    #[serde(default)]
    pub password: String,

    /// Envelope and header sender. Falls back to `username` when empty.
    #[serde(default)]
    pub from: String,

    /// Display name attached to `from`.
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Upgrade the connection with STARTTLS. Disable only for local relays.
    #[serde(default = "default_starttls")]
    pub starttls: bool,

    /// Per-send timeout in seconds.
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            from_name: default_from_name(),
            starttls: default_starttls(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

impl SmtpConfig {
    /// Returns the sender address, falling back to the login user.
    #[must_use]
    pub fn sender(&self) -> &str {
        if self.from.is_empty() {
            &self.username
        } else {
            &self.from
        }
    }

    /// Returns the send timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Taaza".to_string()
}

fn default_starttls() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Email queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Number of delivery workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Delivery attempts before a job is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound on one blocking dequeue, in seconds.
    #[serde(default = "default_dequeue_wait")]
    pub dequeue_wait_secs: u64,

    /// Dispatcher pause after a store error, in seconds. Also the pause
    /// between tries of a failed reschedule, requeue, or dead-letter write.
    #[serde(default = "default_store_error_pause")]
    pub store_error_pause_secs: u64,

    /// Tries for a store write that returns a job to the store.
    #[serde(default = "default_store_write_attempts")]
    pub store_write_attempts: u32,

    /// Dispatcher pause after requeueing because every worker was busy, in milliseconds.
    #[serde(default = "default_saturation_pause")]
    pub saturation_pause_ms: u64,

    /// How long shutdown waits for in-flight deliveries, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Per-recipient rate limit.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry backoff.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Template rendering.
    #[serde(default)]
    pub templates: TemplateConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_attempts: default_max_attempts(),
            dequeue_wait_secs: default_dequeue_wait(),
            store_error_pause_secs: default_store_error_pause(),
            store_write_attempts: default_store_write_attempts(),
            saturation_pause_ms: default_saturation_pause(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            templates: TemplateConfig::default(),
        }
    }
}

impl EmailConfig {
    /// Returns the dequeue wait as a Duration.
    #[must_use]
    pub const fn dequeue_wait(&self) -> Duration {
        Duration::from_secs(self.dequeue_wait_secs)
    }

    /// Returns the store error pause as a Duration.
    #[must_use]
    pub const fn store_error_pause(&self) -> Duration {
        Duration::from_secs(self.store_error_pause_secs)
    }

    /// Returns the saturation pause as a Duration.
    #[must_use]
    pub const fn saturation_pause(&self) -> Duration {
        Duration::from_millis(self.saturation_pause_ms)
    }

    /// Returns the shutdown timeout as a Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_worker_count() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_dequeue_wait() -> u64 {
    5
}

fn default_store_error_pause() -> u64 {
    5
}

fn default_store_write_attempts() -> u32 {
    3
}

fn default_saturation_pause() -> u64 {
    100
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Fixed-window rate limit applied per recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Sends allowed per window.
    #[serde(default = "default_per_recipient_limit")]
    pub per_recipient_limit: u64,

    /// Window length in seconds.
    #[serde(default = "default_window")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            per_recipient_limit: default_per_recipient_limit(),
            window_secs: default_window(),
        }
    }
}

impl RateLimitConfig {
    /// Returns the window as a Duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_per_recipient_limit() -> u64 {
    10
}

fn default_window() -> u64 {
    3600 // 1 hour
}

/// Backoff curve for rescheduled deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `attempt² × base`.
    #[default]
    Quadratic,
    /// `2^(attempt-1) × base`.
    Exponential,
    /// `base` every time.
    Fixed,
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Base delay unit in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    /// Optional cap on any single delay, in seconds.
    #[serde(default)]
    pub max_delay_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: None,
        }
    }
}

fn default_base_delay() -> u64 {
    60 // one minute
}

/// Template rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Directory holding `<name>.html` templates.
    #[serde(default = "default_template_dir")]
    pub dir: String,

    /// Public URL of the customer app, exposed to templates as `app_url`.
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: default_template_dir(),
            app_url: default_app_url(),
        }
    }
}

fn default_template_dir() -> String {
    "templates".to_string()
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}
