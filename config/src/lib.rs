//! Configuration for Leadflow.
//!
//! ```toml
//! [api]
//! base_url = "https://api.example.com"
//! validator_url = "https://brasilapi.com.br"
//! allow_insecure_http = false
//! connect_timeout_secs = 10
//! request_timeout_secs = 30
//!
//! [autosave]
//! debounce_ms = 1000
//!
//! [validator]
//! enabled = true
//! timeout_ms = 5000
//!
//! [telemetry]
//! enabled = true
//! queue_capacity = 256
//! close_timeout_ms = 1500
//!
//! [retry]
//! max_retries = 2
//! initial_delay_ms = 300
//! max_delay_ms = 4000
//! ```
//!
//! Every section is optional. String values support `${VAR}` expansion.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "LEADFLOW_CONFIG";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_VALIDATOR_URL: &str = "https://brasilapi.com.br";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;
pub const DEFAULT_VALIDATOR_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 300;
pub const DEFAULT_MAX_DELAY_MS: u64 = 4000;

pub(crate) const fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadflowConfig {
    pub api: Option<ApiConfig>,
    pub autosave: Option<AutosaveConfig>,
    pub validator: Option<ValidatorConfig>,
    pub telemetry: Option<TelemetryConfig>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    /// Root of the national-id registry.
    pub validator_url: Option<String>,
    /// Permit plain `http://` endpoints. Defaults to true only for loopback hosts.
    pub allow_insecure_http: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AutosaveConfig {
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ValidatorConfig {
    /// When false only the local precheck runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub timeout_ms: Option<u64>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub queue_capacity: Option<usize>,
    pub close_timeout_ms: Option<u64>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: None,
            close_timeout_ms: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Replace `${VAR}` with the variable's value (empty when unset).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".leadflow").join("config.toml"))
}

fn is_loopback(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("http://") else {
        return false;
    };
    if rest.starts_with("[::1]") {
        return true;
    }
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    matches!(host, "localhost" | "127.0.0.1")
}

impl LeadflowConfig {
    /// Load from `LEADFLOW_CONFIG` or `~/.leadflow/config.toml`.
    ///
    /// A missing file is not an error: callers fall back to defaults.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        self.api
            .as_ref()
            .and_then(|api| api.base_url.as_deref())
            .map_or_else(|| DEFAULT_BASE_URL.to_string(), expand_env_vars)
    }

    #[must_use]
    pub fn validator_url(&self) -> String {
        self.api
            .as_ref()
            .and_then(|api| api.validator_url.as_deref())
            .map_or_else(|| DEFAULT_VALIDATOR_URL.to_string(), expand_env_vars)
    }

    #[must_use]
    pub fn allow_insecure_http(&self) -> bool {
        self.api
            .as_ref()
            .and_then(|api| api.allow_insecure_http)
            .unwrap_or_else(|| is_loopback(&self.base_url()))
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        let secs = self
            .api
            .as_ref()
            .and_then(|api| api.connect_timeout_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .api
            .as_ref()
            .and_then(|api| api.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        let ms = self
            .autosave
            .as_ref()
            .and_then(|autosave| autosave.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn validator_enabled(&self) -> bool {
        self.validator.as_ref().is_none_or(|v| v.enabled)
    }

    #[must_use]
    pub fn validator_timeout(&self) -> Duration {
        let ms = self
            .validator
            .as_ref()
            .and_then(|v| v.timeout_ms)
            .unwrap_or(DEFAULT_VALIDATOR_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry.as_ref().is_none_or(|t| t.enabled)
    }

    #[must_use]
    pub fn telemetry_queue_capacity(&self) -> usize {
        self.telemetry
            .as_ref()
            .and_then(|t| t.queue_capacity)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
            .max(1)
    }

    #[must_use]
    pub fn telemetry_close_timeout(&self) -> Duration {
        let ms = self
            .telemetry
            .as_ref()
            .and_then(|t| t.close_timeout_ms)
            .unwrap_or(DEFAULT_CLOSE_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.retry
            .as_ref()
            .and_then(|r| r.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    #[must_use]
    pub fn retry_initial_delay(&self) -> Duration {
        let ms = self
            .retry
            .as_ref()
            .and_then(|r| r.initial_delay_ms)
            .unwrap_or(DEFAULT_INITIAL_DELAY_MS);
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn retry_max_delay(&self) -> Duration {
        let ms = self
            .retry
            .as_ref()
            .and_then(|r| r.max_delay_ms)
            .unwrap_or(DEFAULT_MAX_DELAY_MS);
        Duration::from_millis(ms)
    }
}
