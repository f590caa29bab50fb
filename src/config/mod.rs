pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    7016
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Upstream conversational API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_session_title")]
    pub default_session_title: String,
    /// Per-call timeout for session creation and message submission.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Overall budget for one completion, owned by the event listener.
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// Delay between starting the event listener and submitting the message,
    /// giving the SSE connection time to be accepted upstream.
    #[serde(default = "default_pre_send_delay_ms")]
    pub pre_send_delay_ms: u64,
}

fn default_base_url() -> String {
    "http://opencode:7012".to_string()
}
fn default_provider() -> String {
    "github-copilot".to_string()
}
fn default_model() -> String {
    "gpt-4.1".to_string()
}
fn default_session_title() -> String {
    "Auto Session".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_message_timeout_ms() -> u64 {
    120_000
}
fn default_pre_send_delay_ms() -> u64 {
    100
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_session_title: default_session_title(),
            request_timeout_ms: default_request_timeout_ms(),
            message_timeout_ms: default_message_timeout_ms(),
            pre_send_delay_ms: default_pre_send_delay_ms(),
        }
    }
}

/// Upstream credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Reject requests without a client Authorization header.
    #[serde(default)]
    pub require_client_auth: bool,
    /// Static bearer token; takes priority over the token file.
    #[serde(default)]
    pub static_token: String,
    /// Path to a file holding the bearer token; may appear after start.
    #[serde(default)]
    pub token_file: String,
    #[serde(default = "default_token_poll_interval_ms")]
    pub token_file_poll_interval_ms: u64,
    #[serde(default = "default_token_max_wait_ms")]
    pub token_file_max_wait_ms: u64,
}

fn default_token_poll_interval_ms() -> u64 {
    5_000
}
fn default_token_max_wait_ms() -> u64 {
    120_000
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_client_auth: false,
            static_token: String::new(),
            token_file: String::new(),
            token_file_poll_interval_ms: default_token_poll_interval_ms(),
            token_file_max_wait_ms: default_token_max_wait_ms(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}
