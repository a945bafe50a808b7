//! HTTP retry policy with exponential backoff.
//!
//! Only calls whose replay is harmless go through here: the form config
//! fetch, the partial upsert (keyed by lead id) and the final submission
//! (keyed by lead id and a session-stable idempotency key). Telemetry and
//! board mutations are single-shot.
//!
//! # Policy
//!
//! - Max retries: 2 (3 total attempts)
//! - Initial delay: 300ms, doubling per attempt
//! - Max delay: 4 seconds
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])
//! - Retryable: HTTP 408, 425, 429, 500, 502, 503, 504 and connection errors
//! - `Retry-After` (seconds) overrides the computed delay when in (0, 30s)
//!
//! # Headers
//!
//! - `X-Leadflow-Retry-Count`: 0 for the initial attempt, 1+ for retries
//! - `Idempotency-Key`: supplied by the caller, identical on every attempt

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

pub const RETRY_COUNT_HEADER: &str = "X-Leadflow-Retry-Count";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay that may be shaved off at random.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(4),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }
}

#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let delay = Duration::from_secs(secs);
    (delay > Duration::ZERO && delay < MAX_RETRY_AFTER).then_some(delay)
}

#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

/// Delay before retry number `attempt + 1`.
#[must_use]
pub fn backoff_delay(attempt: u32, config: &RetryConfig, headers: Option<&HeaderMap>) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }

    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt as i32);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

#[must_use]
pub fn generate_idempotency_key(scope: &str) -> String {
    format!("leadflow-{scope}-{}", Uuid::new_v4())
}

/// Result of a (possibly retried) request.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response, either non-retryable or the last one after retries ran out.
    HttpError(Response),
    /// Transport failure on the final attempt.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
}

impl RetryOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Send a request, rebuilding it for every attempt.
///
/// The same `idempotency_key` is attached to each attempt so the backend can
/// collapse replays of one logical write.
pub async fn send_with_retry<F>(
    build_request: F,
    idempotency_key: &str,
    config: &RetryConfig,
) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let request = build_request()
            .header(RETRY_COUNT_HEADER, attempt.to_string())
            .header(IDEMPOTENCY_HEADER, idempotency_key);
        let retries_left = attempt < config.max_retries;

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                return RetryOutcome::Success(response);
            }
            Ok(response) => {
                let status = response.status();
                if !(retries_left && is_retryable_status(status)) {
                    return RetryOutcome::HttpError(response);
                }
                let delay = backoff_delay(attempt, config, Some(response.headers()));
                tracing::debug!(
                    %status,
                    retry_count = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if !(retries_left && is_retryable_error(&e)) {
                    return RetryOutcome::ConnectionError {
                        attempts: attempt + 1,
                        source: e,
                    };
                }
                let delay = backoff_delay(attempt, config, None);
                tracing::debug!(
                    error = %e,
                    retry_count = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying request after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}
