//! Translation of the loaded configuration into engine and backend settings.

use std::time::Duration;

use leadflow_backend::{BackendOptions, RetryConfig};
use leadflow_config::LeadflowConfig;
use thiserror::Error;
use url::Url;

use crate::autosave::DEFAULT_DEBOUNCE;
use crate::validator::DEFAULT_VALIDATOR_TIMEOUT;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid {name} `{value}`: {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Knobs of one form session.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub debounce: Duration,
    pub validator_enabled: bool,
    pub validator_timeout: Duration,
    pub telemetry_enabled: bool,
    pub telemetry_queue_capacity: usize,
    pub telemetry_close_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            validator_enabled: true,
            validator_timeout: DEFAULT_VALIDATOR_TIMEOUT,
            telemetry_enabled: true,
            telemetry_queue_capacity: leadflow_config::DEFAULT_QUEUE_CAPACITY,
            telemetry_close_timeout: Duration::from_millis(leadflow_config::DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &LeadflowConfig) -> Self {
        Self {
            debounce: config.debounce(),
            validator_enabled: config.validator_enabled(),
            validator_timeout: config.validator_timeout(),
            telemetry_enabled: config.telemetry_enabled(),
            telemetry_queue_capacity: config.telemetry_queue_capacity(),
            telemetry_close_timeout: config.telemetry_close_timeout(),
        }
    }
}

pub fn backend_options(config: &LeadflowConfig) -> Result<BackendOptions, SettingsError> {
    let base_url = parse_url("api.base_url", config.base_url())?;
    let verifier_url = parse_url("api.validator_url", config.validator_url())?;
    let retry = RetryConfig {
        max_retries: config.max_retries(),
        initial_delay: config.retry_initial_delay(),
        max_delay: config.retry_max_delay(),
        ..RetryConfig::default()
    };
    Ok(BackendOptions::new(base_url, verifier_url)
        .allow_insecure_http(config.allow_insecure_http())
        .with_timeouts(config.connect_timeout(), config.request_timeout())
        .with_retry(retry))
}

fn parse_url(name: &'static str, value: String) -> Result<Url, SettingsError> {
    Url::parse(&value).map_err(|source| SettingsError::InvalidUrl {
        name,
        value,
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use leadflow_config::LeadflowConfig;

    use super::{EngineSettings, SettingsError, backend_options};

    fn config(toml: &str) -> LeadflowConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn defaults_match_engine_defaults() {
        assert_eq!(EngineSettings::from_config(&config("")), EngineSettings::default());
    }

    #[test]
    fn backend_options_follow_config() {
        let options = backend_options(&config(
            "[api]\nbase_url = \"https://api.example.com\"\nrequest_timeout_secs = 7\n\n[retry]\nmax_retries = 4\n",
        ))
        .unwrap();
        assert_eq!(options.base_url.as_str(), "https://api.example.com/");
        assert!(!options.allow_insecure_http);
        assert_eq!(options.request_timeout, Duration::from_secs(7));
        assert_eq!(options.retry.max_retries, 4);
    }

    #[test]
    fn malformed_url_is_reported_by_name() {
        let err = backend_options(&config("[api]\nbase_url = \"not a url\"\n")).unwrap_err();
        let SettingsError::InvalidUrl { name, .. } = err;
        assert_eq!(name, "api.base_url");
    }
}
