//! Configuration module for Album Relay
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, `.env` overrides and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Leave the placeholder as written.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from defaults and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigLoader::from_env()
    }

    /// Override upstream settings from `API_KEY`, `ENDPOINT` and `ALBUM`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(api_key) = std::env::var("API_KEY") {
            self.upstream.api_key = api_key;
        }
        if let Ok(endpoint) = std::env::var("ENDPOINT") {
            self.upstream.endpoint = endpoint;
        }
        if let Ok(album) = std::env::var("ALBUM") {
            self.upstream.album = album;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.upstream.endpoint) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid upstream endpoint '{}': must start with http:// or https://",
                self.upstream.endpoint
            )));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Upstream timeout must be greater than zero".into(),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Queue capacity must be greater than zero".into(),
            ));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Retry base delay must be greater than zero".into(),
            ));
        }

        if self.retry.max_delay() < self.retry.base_delay() {
            return Err(ConfigError::ValidationError(format!(
                "Retry max delay ({}s) is shorter than the base delay ({}ms)",
                self.retry.max_delay_secs, self.retry.base_delay_ms
            )));
        }

        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "Retry max_attempts must be at least 1 (use null for unlimited)".into(),
            ));
        }

        if self.retry.dead_letter_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Dead-letter capacity must be greater than zero".into(),
            ));
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format '{}': must be 'json' or 'text'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Ingress server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
    /// How long an upload may wait for a free queue slot. `null` waits forever.
    #[serde(default = "default_enqueue_timeout")]
    pub enqueue_timeout_secs: Option<u64>,
}

impl ServerConfig {
    pub fn enqueue_timeout(&self) -> Option<Duration> {
        self.enqueue_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            enqueue_timeout_secs: default_enqueue_timeout(),
        }
    }
}

fn default_server_address() -> String {
    "127.0.0.1:14994".to_string()
}

fn default_enqueue_timeout() -> Option<u64> {
    Some(30)
}

/// Upstream media-album API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    /// Album identifier sent as `albumuuid`. May be empty.
    #[serde(default)]
    pub album: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
    /// Look up the part content type from the file extension
    #[serde(default = "default_detect_content_type")]
    pub detect_content_type: bool,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            album: String::new(),
            timeout_secs: default_upstream_timeout(),
            detect_content_type: default_detect_content_type(),
        }
    }
}

fn default_upstream_timeout() -> u64 {
    60
}

fn default_detect_content_type() -> bool {
    true
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,
}

impl QueueConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            idle_poll_ms: default_idle_poll(),
        }
    }
}

fn default_queue_capacity() -> usize {
    300
}

fn default_idle_poll() -> u64 {
    5000
}

/// What to do with an entry whose upload returned 200 but an unreadable body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Treat the entry as delivered
    Drop,
    /// Re-enqueue it like a rejected upload
    Retry,
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First backoff step after a failure
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff sleep
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Failed attempts before an entry is dead-lettered. `null` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
    /// Age after which a failing entry is dead-lettered. `null` disables the check.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
    #[serde(default = "default_decode_failure_policy")]
    pub on_decode_failure: DecodeFailurePolicy,
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_attempts: default_max_attempts(),
            max_age_secs: None,
            on_decode_failure: default_decode_failure_policy(),
            dead_letter_capacity: default_dead_letter_capacity(),
        }
    }
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    900 // 15 minutes
}

fn default_max_attempts() -> Option<u32> {
    Some(50)
}

fn default_decode_failure_policy() -> DecodeFailurePolicy {
    DecodeFailurePolicy::Drop
}

fn default_dead_letter_capacity() -> usize {
    100
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
