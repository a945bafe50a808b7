use futures_util::future::BoxFuture;
use leadflow_types::national_id::NationalIdDigits;
use leadflow_types::{ClientId, FormConfig, FunnelEvent, KanbanStatus, LeadId, SuccessPayload};
use reqwest::Response;
use serde::de::DeserializeOwned;
use url::Url;

use crate::retry::{self, RetryConfig, RetryOutcome};
use crate::wire::{StatusPatch, SubmitAck, is_accepted_upsert, is_confirmed_submission};
use crate::{
    BackendError, BackendOptions, LeadBackend, NationalIdVerifier, PartialLeadRequest,
    SubmitLeadRequest, UpsertAck, Verification, base_client_builder, extract_detail,
    read_capped_error_body,
};

/// Lead backend reached over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryConfig,
}

impl HttpBackend {
    pub fn new(options: &BackendOptions) -> Result<Self, BackendError> {
        ensure_base(&options.base_url)?;
        let client = base_client_builder(options)
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self {
            client,
            base_url: options.base_url.clone(),
            retry: options.retry.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        join_segments(&self.base_url, segments)
    }

    async fn fetch_form_config_inner(&self, client: &ClientId) -> Result<FormConfig, BackendError> {
        let url = self.endpoint(&["forms", "config", client.as_str()])?;
        let key = retry::generate_idempotency_key("config");
        let outcome = retry::send_with_retry(|| self.client.get(url.clone()), &key, &self.retry).await;
        let response = into_response(outcome).await?;
        decode(response).await
    }

    async fn upsert_partial_inner(
        &self,
        request: &PartialLeadRequest,
        idempotency_key: &str,
    ) -> Result<UpsertAck, BackendError> {
        let url = self.endpoint(&["leads", "partial"])?;
        let outcome = retry::send_with_retry(
            || self.client.post(url.clone()).json(request),
            idempotency_key,
            &self.retry,
        )
        .await;
        let response = into_response(outcome).await?;
        let ack: UpsertAck = decode(response).await?;
        if ack.status.as_deref().is_some_and(|status| !is_accepted_upsert(status)) {
            return Err(BackendError::Rejected {
                detail: ack.status.unwrap_or_default(),
            });
        }
        Ok(ack)
    }

    async fn submit_lead_inner(
        &self,
        request: &SubmitLeadRequest,
        idempotency_key: &str,
    ) -> Result<SuccessPayload, BackendError> {
        let url = self.endpoint(&["leads"])?;
        let outcome = retry::send_with_retry(
            || self.client.post(url.clone()).json(request),
            idempotency_key,
            &self.retry,
        )
        .await;
        let response = into_response(outcome).await?;
        let ack: SubmitAck = decode(response).await?;
        if !is_confirmed_submission(ack.status.as_deref()) {
            let detail = ack
                .detail
                .or(ack.status)
                .unwrap_or_else(|| "lead was not confirmed".to_string());
            return Err(BackendError::Rejected { detail });
        }
        Ok(ack.payload)
    }

    async fn patch_status_inner(
        &self,
        lead: &LeadId,
        status: KanbanStatus,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&["leads", lead.as_str()])?;
        let body = StatusPatch { status };
        let key = retry::generate_idempotency_key("status");
        let outcome = retry::send_with_retry(
            || self.client.patch(url.clone()).json(&body),
            &key,
            &RetryConfig::none(),
        )
        .await;
        into_response(outcome).await.map(drop)
    }

    async fn send_event_inner(&self, event: &FunnelEvent) -> Result<(), BackendError> {
        let url = self.endpoint(&["funnel", "event"])?;
        let response = self
            .client
            .post(url)
            .json(event)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                attempts: 1,
                source,
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}

impl LeadBackend for HttpBackend {
    fn fetch_form_config<'a>(
        &'a self,
        client: &'a ClientId,
    ) -> BoxFuture<'a, Result<FormConfig, BackendError>> {
        Box::pin(self.fetch_form_config_inner(client))
    }

    fn upsert_partial<'a>(
        &'a self,
        request: &'a PartialLeadRequest,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<UpsertAck, BackendError>> {
        Box::pin(self.upsert_partial_inner(request, idempotency_key))
    }

    fn submit_lead<'a>(
        &'a self,
        request: &'a SubmitLeadRequest,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<SuccessPayload, BackendError>> {
        Box::pin(self.submit_lead_inner(request, idempotency_key))
    }

    fn patch_status<'a>(
        &'a self,
        lead: &'a LeadId,
        status: KanbanStatus,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(self.patch_status_inner(lead, status))
    }

    fn send_event<'a>(&'a self, event: &'a FunnelEvent) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(self.send_event_inner(event))
    }
}

/// Registry lookup at `{verifier_url}/api/cpf/v1/{digits}`.
#[derive(Debug, Clone)]
pub struct HttpNationalIdVerifier {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpNationalIdVerifier {
    pub fn new(options: &BackendOptions) -> Result<Self, BackendError> {
        ensure_base(&options.verifier_url)?;
        let client = base_client_builder(options)
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self {
            client,
            base_url: options.verifier_url.clone(),
        })
    }

    async fn verify_inner(&self, digits: &NationalIdDigits) -> Result<Verification, BackendError> {
        let url = join_segments(&self.base_url, &["api", "cpf", "v1", digits.as_str()])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                attempts: 1,
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            Ok(Verification::Accepted)
        } else if status.is_client_error() {
            tracing::debug!(%status, "National id refused by registry");
            Ok(Verification::Refused)
        } else {
            Err(status_error(response).await)
        }
    }
}

impl NationalIdVerifier for HttpNationalIdVerifier {
    fn verify<'a>(
        &'a self,
        digits: &'a NationalIdDigits,
    ) -> BoxFuture<'a, Result<Verification, BackendError>> {
        Box::pin(self.verify_inner(digits))
    }
}

fn ensure_base(url: &Url) -> Result<(), BackendError> {
    if url.cannot_be_a_base() {
        return Err(BackendError::Url(url.to_string()));
    }
    Ok(())
}

/// Append percent-encoded path segments to `base`, keeping any base path.
fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, BackendError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| BackendError::Url(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn into_response(outcome: RetryOutcome) -> Result<Response, BackendError> {
    match outcome {
        RetryOutcome::Success(response) => Ok(response),
        RetryOutcome::HttpError(response) => Err(status_error(response).await),
        RetryOutcome::ConnectionError { attempts, source } => {
            Err(BackendError::Transport { attempts, source })
        }
    }
}

async fn status_error(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let body = read_capped_error_body(response).await;
    BackendError::Status {
        status,
        detail: extract_detail(&body),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}
