//! Configuration loading and validation for threadline.
//!
//! Loads configuration from `~/.threadline/config.toml` with environment
//! variable overrides for the secrets and the most common deployment knobs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.threadline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name, for logging
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Provider base URL (any OpenAI-compatible endpoint)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model when a request doesn't name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Relay loop configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Transcript store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            base_url: default_base_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            relay: RelayConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("relay", &self.relay)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Maximum provider/tool iterations per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Provider call timeout, seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Per-tool-call timeout, seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Attempts for transient provider failures (including the first)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_max_iterations() -> u32 {
    25
}
fn default_provider_timeout() -> u64 {
    120
}
fn default_tool_timeout() -> u64 {
    60
}
fn default_retry_attempts() -> u32 {
    3
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            provider_timeout_secs: default_provider_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. `sqlite::memory:` for ephemeral runs.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    AppConfig::workspace_dir()
        .join("threads.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Sliding-window rate limit, requests per minute per client
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8081
}
fn default_rate_limit() -> usize {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

impl AppConfig {
    /// The workspace directory: `~/.threadline`.
    pub fn workspace_dir() -> PathBuf {
        std::env::var("THREADLINE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(|home| Path::new(&home).join(".threadline"))
                    .unwrap_or_else(|_| PathBuf::from(".threadline"))
            })
    }

    /// Default config file path: `~/.threadline/config.toml`.
    pub fn default_path() -> PathBuf {
        Self::workspace_dir().join("config.toml")
    }

    /// Load from the default path, falling back to defaults when the file
    /// doesn't exist, then apply environment overrides.
    pub fn load() -> Result<Self, String> {
        Self::load_from(&Self::default_path())
    }

    /// Load from a specific path with environment overrides applied.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            toml::from_str(&raw)
                .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("THREADLINE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("THREADLINE_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(model) = std::env::var("THREADLINE_MODEL") {
            self.default_model = model;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(format!(
                "default_temperature must be in [0.0, 2.0], got {}",
                self.default_temperature
            ));
        }
        if self.relay.max_iterations == 0 {
            return Err("relay.max_iterations must be at least 1".into());
        }
        if self.base_url.is_empty() {
            return Err("base_url must not be empty".into());
        }
        Ok(())
    }
}
