//! Final submission of a completed form.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use leadflow_backend::{BackendError, LeadBackend, SubmitLeadRequest};
use leadflow_types::{AttributionContext, FieldKey, FunnelEventType, SuccessPayload};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::autosave::AutosavePipeline;
use crate::session::LeadIdSlot;
use crate::steps::{FormStepEngine, StepError, StepPosition};
use crate::telemetry::{TelemetryEmitter, metadata};
use crate::validator::ExternalFieldValidator;

/// Field checked against the external registry before submitting.
pub const NATIONAL_ID_KEY: &str = "cpf";

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Incomplete(#[from] StepError),
    #[error("consent was not given")]
    ConsentRequired,
    #[error("field `{key}` failed external verification")]
    InvalidField { key: FieldKey },
    #[error("a submission is already in progress")]
    InProgress,
    #[error("the form was already submitted")]
    AlreadySubmitted,
    #[error("submission was cancelled")]
    Cancelled,
    #[error("submission failed: {0}")]
    Backend(#[source] BackendError),
}

impl SubmissionError {
    /// Text shown next to the submit button.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Incomplete(StepError::MissingRequired { first, .. }) => {
                format!("Please fill in `{first}` before continuing.")
            }
            Self::Incomplete(_) => "Please complete the previous steps first.".to_string(),
            Self::ConsentRequired => {
                "Please accept the data processing terms to continue.".to_string()
            }
            Self::InvalidField { key } => format!("The value entered for `{key}` is not valid."),
            Self::InProgress => "Your answers are being sent, please wait.".to_string(),
            Self::AlreadySubmitted => "Your answers were already received.".to_string(),
            Self::Cancelled => "The form was closed before sending.".to_string(),
            Self::Backend(BackendError::Rejected { detail } | BackendError::Status { detail, .. })
                if !detail.is_empty() =>
            {
                format!("We could not send your answers: {detail}")
            }
            Self::Backend(_) => {
                "We could not send your answers. Please try again in a moment.".to_string()
            }
        }
    }
}

/// State of the submit button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    Enabled,
    Busy,
    Done,
}

pub struct SubmissionController {
    backend: Arc<dyn LeadBackend>,
    context: Arc<AttributionContext>,
    lead_id: LeadIdSlot,
    autosave: AutosavePipeline,
    validator: ExternalFieldValidator,
    telemetry: TelemetryEmitter,
    cancel: CancellationToken,
    idempotency_key: String,
    busy: AtomicBool,
    done: AtomicBool,
}

/// Clears the busy flag however the attempt ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SubmissionController {
    #[must_use]
    pub fn new(
        backend: Arc<dyn LeadBackend>,
        context: Arc<AttributionContext>,
        lead_id: LeadIdSlot,
        autosave: AutosavePipeline,
        validator: ExternalFieldValidator,
        telemetry: TelemetryEmitter,
        cancel: CancellationToken,
    ) -> Self {
        let idempotency_key = match context.session_id() {
            Some(session) => format!("leadflow-submit-{session}"),
            None => format!("leadflow-submit-{}-{}", context.client_id(), Uuid::new_v4()),
        };
        Self {
            backend,
            context,
            lead_id,
            autosave,
            validator,
            telemetry,
            cancel,
            idempotency_key,
            busy: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn affordance(&self) -> Affordance {
        if self.done.load(Ordering::SeqCst) {
            Affordance::Done
        } else if self.busy.load(Ordering::SeqCst) {
            Affordance::Busy
        } else {
            Affordance::Enabled
        }
    }

    /// Key sent with every attempt of this session's final submission.
    #[must_use]
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub async fn submit(
        &self,
        engine: &FormStepEngine,
        consent: bool,
    ) -> Result<SuccessPayload, SubmissionError> {
        if self.done.load(Ordering::SeqCst) {
            return Err(SubmissionError::AlreadySubmitted);
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(SubmissionError::InProgress);
        }
        let _busy = BusyGuard(&self.busy);

        let last = engine.final_step();
        if engine.position() == StepPosition::Success {
            return Err(SubmissionError::AlreadySubmitted);
        }
        let lock = engine.lock_for_submit(last)?;
        engine.validate(last)?;
        if !consent {
            return Err(SubmissionError::ConsentRequired);
        }
        engine.commit(last)?;

        let national_key = FieldKey::new(NATIONAL_ID_KEY);
        let answers = engine.form_data();
        if let Some(value) = answers.get(&national_key) {
            match self.validator.check_with_cancel(value, &self.cancel).await {
                None => return Err(SubmissionError::Cancelled),
                Some(false) => return Err(SubmissionError::InvalidField { key: national_key }),
                Some(true) => {}
            }
        }

        self.autosave.flush_now().await;

        let request =
            SubmitLeadRequest::new(&self.context, self.lead_id.get(), answers, consent);
        let result = tokio::select! {
            () = self.cancel.cancelled() => return Err(SubmissionError::Cancelled),
            result = self.backend.submit_lead(&request, &self.idempotency_key) => result,
        };
        let payload = result.map_err(|e| {
            tracing::warn!(lead_id = ?request.lead_id, "Submission failed: {e}");
            SubmissionError::Backend(e)
        })?;

        if let Some(id) = payload.lead_id.clone() {
            self.lead_id.record(id);
        }
        let score = payload.score.map_or(serde_json::Value::Null, Into::into);
        self.telemetry
            .emit(FunnelEventType::FormSubmit, Some(last), None, metadata("score", score));
        lock.succeed();
        self.done.store(true, Ordering::SeqCst);
        tracing::info!(lead_id = ?self.lead_id.get(), score = ?payload.score, "Lead submitted");
        Ok(payload)
    }
}
