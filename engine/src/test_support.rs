//! In-memory backend and verifier used by the engine's unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use leadflow_backend::{
    BackendError, LeadBackend, NationalIdVerifier, PartialLeadRequest, SubmitLeadRequest,
    UpsertAck, Verification,
};
use leadflow_types::national_id::NationalIdDigits;
use leadflow_types::{
    AttributionContext, ClientId, FieldKind, FormConfig, FormField, FunnelEvent, FunnelEventType,
    KanbanStatus, LeadId, LinkId, SessionId, StepPlan, SuccessPayload,
};

#[derive(Default)]
pub(crate) struct FakeBackend {
    partials: Mutex<Vec<PartialLeadRequest>>,
    submits: Mutex<Vec<(SubmitLeadRequest, String)>>,
    patches: Mutex<Vec<(LeadId, KanbanStatus)>>,
    events: Mutex<Vec<FunnelEvent>>,
    partial_lead_id: Option<LeadId>,
    submit_payload: Option<SuccessPayload>,
    submit_failure: Option<(u16, String)>,
    fail_partials: AtomicBool,
    fail_patches: AtomicBool,
    latency: Duration,
    config: Option<FormConfig>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partial_lead_id(mut self, id: &str) -> Self {
        self.partial_lead_id = Some(LeadId::new(id));
        self
    }

    pub fn with_submit_payload(mut self, payload: SuccessPayload) -> Self {
        self.submit_payload = Some(payload);
        self
    }

    pub fn with_submit_failure(mut self, status: u16, detail: &str) -> Self {
        self.submit_failure = Some((status, detail.to_string()));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_config(mut self, config: FormConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn failing_partials(self) -> Self {
        self.fail_partials.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_patches(self) -> Self {
        self.fail_patches.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_fail_patches(&self, fail: bool) {
        self.fail_patches.store(fail, Ordering::SeqCst);
    }

    pub fn partials(&self) -> Vec<PartialLeadRequest> {
        self.partials.lock().unwrap().clone()
    }

    pub fn submits(&self) -> Vec<(SubmitLeadRequest, String)> {
        self.submits.lock().unwrap().clone()
    }

    pub fn patches(&self) -> Vec<(LeadId, KanbanStatus)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<FunnelEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<FunnelEventType> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }

    pub fn events_of(&self, kind: FunnelEventType) -> Vec<FunnelEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == kind)
            .collect()
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl LeadBackend for FakeBackend {
    fn fetch_form_config<'a>(
        &'a self,
        _client: &'a ClientId,
    ) -> BoxFuture<'a, Result<FormConfig, BackendError>> {
        Box::pin(async move {
            self.config.clone().ok_or(BackendError::Status {
                status: 404,
                detail: "Client not found".to_string(),
            })
        })
    }

    fn upsert_partial<'a>(
        &'a self,
        request: &'a PartialLeadRequest,
        _idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<UpsertAck, BackendError>> {
        Box::pin(async move {
            self.pause().await;
            self.partials.lock().unwrap().push(request.clone());
            if self.fail_partials.load(Ordering::SeqCst) {
                return Err(BackendError::Status {
                    status: 503,
                    detail: "unavailable".to_string(),
                });
            }
            Ok(UpsertAck {
                status: Some("success".to_string()),
                lead_id: self.partial_lead_id.clone(),
            })
        })
    }

    fn submit_lead<'a>(
        &'a self,
        request: &'a SubmitLeadRequest,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<SuccessPayload, BackendError>> {
        Box::pin(async move {
            self.pause().await;
            self.submits
                .lock()
                .unwrap()
                .push((request.clone(), idempotency_key.to_string()));
            if let Some((status, detail)) = &self.submit_failure {
                return Err(BackendError::Status {
                    status: *status,
                    detail: detail.clone(),
                });
            }
            Ok(self.submit_payload.clone().unwrap_or_default())
        })
    }

    fn patch_status<'a>(
        &'a self,
        lead: &'a LeadId,
        status: KanbanStatus,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            self.pause().await;
            self.patches.lock().unwrap().push((lead.clone(), status));
            if self.fail_patches.load(Ordering::SeqCst) {
                return Err(BackendError::Status {
                    status: 500,
                    detail: "Internal Server Error".to_string(),
                });
            }
            Ok(())
        })
    }

    fn send_event<'a>(&'a self, event: &'a FunnelEvent) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        })
    }
}

pub(crate) struct FakeVerifier {
    answer: Result<Verification, u16>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::answering(Ok(Verification::Accepted), Duration::ZERO))
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self::answering(Ok(Verification::Refused), Duration::ZERO))
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self::answering(Err(status), Duration::ZERO))
    }

    /// Answers `Accepted`, but only after `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self::answering(Ok(Verification::Accepted), delay))
    }

    fn answering(answer: Result<Verification, u16>, delay: Duration) -> Self {
        Self {
            answer,
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NationalIdVerifier for FakeVerifier {
    fn verify<'a>(
        &'a self,
        _digits: &'a NationalIdDigits,
    ) -> BoxFuture<'a, Result<Verification, BackendError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answer.map_err(|status| BackendError::Status {
                status,
                detail: "registry error".to_string(),
            })
        })
    }
}

pub(crate) fn context() -> AttributionContext {
    AttributionContext::new(ClientId::new("c1"))
        .with_link(LinkId::new("l1"))
        .with_session(SessionId::new("s1"))
}

/// Three steps: identity, one property question, qualification with an
/// optional national id.
pub(crate) fn form_config() -> FormConfig {
    let options = |values: &[&str]| values.iter().map(ToString::to_string).collect();
    FormConfig::new(
        "Acme Realty",
        vec![
            FormField::new("full_name", "Name", FieldKind::Text)
                .required(true)
                .with_order(1),
            FormField::new("phone", "Phone", FieldKind::Text)
                .required(true)
                .with_order(2),
            FormField::new("email", "Email", FieldKind::Text).with_order(3),
            FormField::new(
                "property_type",
                "Property",
                FieldKind::Radio {
                    options: options(&["House", "Apartment"]),
                },
            )
            .required(true)
            .with_order(4),
            FormField::new(
                "income_range",
                "Income",
                FieldKind::Select {
                    options: options(&["<5k", "5k-10k", ">10k"]),
                },
            )
            .required(true)
            .with_order(5),
            FormField::new("cpf", "CPF", FieldKind::Text).with_order(6),
        ],
    )
    .unwrap()
}

pub(crate) fn step_plan() -> StepPlan {
    StepPlan::partition(&form_config()).unwrap()
}
