//! HTTP contract between the Leadflow engine and the lead backend.
//!
//! The engine only sees the [`LeadBackend`] and [`NationalIdVerifier`]
//! traits; [`HttpBackend`] and [`HttpNationalIdVerifier`] are the reqwest
//! implementations used by the binary and the integration tests.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_wrap)] // retry attempts stay tiny

mod error;
mod http;
pub mod retry;
mod wire;

use std::time::Duration;

use futures_util::future::BoxFuture;
pub use leadflow_types;
use leadflow_types::{ClientId, FormConfig, FunnelEvent, KanbanStatus, LeadId, SuccessPayload};
use leadflow_types::national_id::NationalIdDigits;
use url::Url;

pub use error::{BackendError, extract_detail};
pub use http::{HttpBackend, HttpNationalIdVerifier};
pub use retry::RetryConfig;
pub use wire::{PartialLeadRequest, SubmitLeadRequest, UpsertAck};

/// Connection timeout for all HTTP requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request timeout for backend calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 4;

/// Upper bound on error bodies kept for diagnostics.
pub const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Calls the form engine makes against the lead backend.
///
/// Futures are boxed so the engine can hold an `Arc<dyn LeadBackend>` and
/// tests can substitute an in-memory recorder.
pub trait LeadBackend: Send + Sync {
    fn fetch_form_config<'a>(
        &'a self,
        client: &'a ClientId,
    ) -> BoxFuture<'a, Result<FormConfig, BackendError>>;

    /// Create or update the partial record for this session.
    fn upsert_partial<'a>(
        &'a self,
        request: &'a PartialLeadRequest,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<UpsertAck, BackendError>>;

    /// Finalize the lead. Resolves only for `status == "success"` responses.
    fn submit_lead<'a>(
        &'a self,
        request: &'a SubmitLeadRequest,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<SuccessPayload, BackendError>>;

    fn patch_status<'a>(
        &'a self,
        lead: &'a LeadId,
        status: KanbanStatus,
    ) -> BoxFuture<'a, Result<(), BackendError>>;

    /// Single attempt, no retry.
    fn send_event<'a>(&'a self, event: &'a FunnelEvent) -> BoxFuture<'a, Result<(), BackendError>>;
}

/// Answer of the external national-id registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Accepted,
    Refused,
}

pub trait NationalIdVerifier: Send + Sync {
    /// `Err` covers server errors and transport failures; the caller decides
    /// whether those fail open.
    fn verify<'a>(
        &'a self,
        digits: &'a NationalIdDigits,
    ) -> BoxFuture<'a, Result<Verification, BackendError>>;
}

/// Everything needed to talk to the backend over HTTP.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub base_url: Url,
    pub verifier_url: Url,
    /// Permit `http://` endpoints (local development, test servers).
    pub allow_insecure_http: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl BackendOptions {
    #[must_use]
    pub fn new(base_url: Url, verifier_url: Url) -> Self {
        Self {
            base_url,
            verifier_url,
            allow_insecure_http: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }
}

/// Shared client settings for every backend and verifier client.
fn base_client_builder(options: &BackendOptions) -> reqwest::ClientBuilder {
    use reqwest::header::{HeaderMap, HeaderValue};

    let mut default_headers = HeaderMap::new();
    default_headers.insert("X-Leadflow-Client", HeaderValue::from_static("rust"));
    default_headers.insert(
        "X-Leadflow-OS",
        HeaderValue::from_static(std::env::consts::OS),
    );

    reqwest::Client::builder()
        .connect_timeout(options.connect_timeout)
        .timeout(options.request_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .https_only(!options.allow_insecure_http)
        .tcp_keepalive(Some(TCP_KEEPALIVE))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .default_headers(default_headers)
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of an error response.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
