use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("backend returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    /// 2xx response whose body reports a failure.
    #[error("backend rejected the request: {detail}")]
    Rejected { detail: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("cannot build endpoint URL from {0}")]
    Url(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl BackendError {
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable reason suitable for showing next to the form.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Status { detail, .. } | Self::Rejected { detail } => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Pull a failure reason out of an error body.
///
/// The backend answers with `{"detail": "..."}`; validation errors carry a
/// list of `{"msg": "..."}` objects under the same key. Anything else is
/// passed through as text.
#[must_use]
pub fn extract_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(serde_json::Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(serde_json::Value::as_str))
                .collect();
            if messages.is_empty() {
                body.trim().to_string()
            } else {
                messages.join("; ")
            }
        }
        _ => body.trim().to_string(),
    }
}
