//! Form session engine for Leadflow.
//!
//! A [`LeadForm`] owns everything one visitor's session needs: the
//! attribution snapshot, the step state machine, the debounced autosave,
//! funnel telemetry and the final submission. The board-side
//! [`KanbanStatusController`] is independent of any form session.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use leadflow_backend::{BackendError, LeadBackend, NationalIdVerifier};
use leadflow_types::{
    AttributionContext, FormConfig, FormConfigError, LeadId, SessionId, StepPlan, SuccessPayload,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

mod autosave;
mod kanban;
mod session;
mod settings;
mod steps;
mod submission;
mod telemetry;
mod validator;

#[cfg(test)]
mod test_support;

pub use autosave::{AutosavePipeline, DEFAULT_DEBOUNCE};
pub use kanban::{BoardNotice, Card, KanbanError, KanbanStatusController, MoveOutcome};
pub use leadflow_backend;
pub use leadflow_types;
pub use session::LeadIdSlot;
pub use settings::{EngineSettings, SettingsError, backend_options};
pub use steps::{Advance, FormStepEngine, NAME_KEY, PHONE_KEY, StepError, StepPosition};
pub use submission::{Affordance, NATIONAL_ID_KEY, SubmissionController, SubmissionError};
pub use telemetry::{Metadata, TelemetryEmitter};
pub use validator::{DEFAULT_VALIDATOR_TIMEOUT, ExternalFieldValidator};

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("could not load the form configuration: {0}")]
    Config(#[source] BackendError),
    #[error(transparent)]
    Form(#[from] FormConfigError),
}

/// One visitor's form session.
pub struct LeadForm {
    context: Arc<AttributionContext>,
    config: FormConfig,
    lead_id: LeadIdSlot,
    telemetry: TelemetryEmitter,
    steps: FormStepEngine,
    submission: SubmissionController,
    cancel: CancellationToken,
    close_timeout: Duration,
}

impl LeadForm {
    /// Fetch the client's form configuration and start the session.
    ///
    /// A missing session id is replaced by a fresh UUID.
    pub async fn open(
        context: AttributionContext,
        backend: Arc<dyn LeadBackend>,
        verifier: Option<Arc<dyn NationalIdVerifier>>,
        settings: &EngineSettings,
    ) -> Result<Self, OpenError> {
        let context = context.or_session_with(|| SessionId::new(Uuid::new_v4().to_string()));
        let config = backend
            .fetch_form_config(context.client_id())
            .await
            .map_err(OpenError::Config)?;
        tracing::info!(
            client = %context.client_id(),
            form = config.client_name(),
            fields = config.fields().len(),
            "Form configuration loaded"
        );
        Ok(Self::with_config(context, config, backend, verifier, settings)?)
    }

    /// Start a session from an already-fetched configuration.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_config(
        context: AttributionContext,
        config: FormConfig,
        backend: Arc<dyn LeadBackend>,
        verifier: Option<Arc<dyn NationalIdVerifier>>,
        settings: &EngineSettings,
    ) -> Result<Self, FormConfigError> {
        let plan = StepPlan::partition(&config)?;
        let context = Arc::new(context);
        let cancel = CancellationToken::new();
        let lead_id = LeadIdSlot::new();

        let telemetry = if settings.telemetry_enabled {
            TelemetryEmitter::new(
                Arc::clone(&backend),
                &context,
                settings.telemetry_queue_capacity,
            )
        } else {
            TelemetryEmitter::disabled(Arc::clone(&backend))
        };
        let autosave = AutosavePipeline::new(
            Arc::clone(&backend),
            Arc::clone(&context),
            lead_id.clone(),
            settings.debounce,
            cancel.child_token(),
        );
        let validator = match verifier {
            Some(verifier) if settings.validator_enabled => {
                ExternalFieldValidator::new(verifier, settings.validator_timeout)
            }
            _ => ExternalFieldValidator::local_only(),
        };
        let steps = FormStepEngine::new(plan, telemetry.clone(), autosave.clone());
        let submission = SubmissionController::new(
            backend,
            Arc::clone(&context),
            lead_id.clone(),
            autosave,
            validator,
            telemetry.clone(),
            cancel.child_token(),
        );

        steps.start();
        Ok(Self {
            context,
            config,
            lead_id,
            telemetry,
            steps,
            submission,
            cancel,
            close_timeout: settings.telemetry_close_timeout,
        })
    }

    #[must_use]
    pub fn context(&self) -> &AttributionContext {
        &self.context
    }

    #[must_use]
    pub fn form_config(&self) -> &FormConfig {
        &self.config
    }

    #[must_use]
    pub fn steps(&self) -> &FormStepEngine {
        &self.steps
    }

    #[must_use]
    pub fn lead_id(&self) -> Option<LeadId> {
        self.lead_id.get()
    }

    #[must_use]
    pub fn affordance(&self) -> Affordance {
        self.submission.affordance()
    }

    /// Token that tears the session down when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn submit(&self, consent: bool) -> Result<SuccessPayload, SubmissionError> {
        self.submission.submit(&self.steps, consent).await
    }

    /// Leave the form: report abandonment unless it succeeded, drain
    /// telemetry, then discard pending autosaves and in-flight work.
    pub async fn close(self) {
        self.steps.abandon();
        self.telemetry.close(self.close_timeout).await;
        self.cancel.cancel();
        tracing::info!(session = ?self.context.session_id(), "Form session closed");
    }
}
