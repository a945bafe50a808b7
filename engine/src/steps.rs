//! Multi-step form state machine.
//!
//! Drafts are kept per step and only merged into the aggregate answers once
//! the step validates. Forward movement goes through [`FormStepEngine::advance`];
//! backward movement never validates. The terminal `Success` state is entered
//! by the submission controller alone.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use leadflow_types::{FieldKey, FormData, FormField, FunnelEventType, PartialLead, StepPlan};
use thiserror::Error;
use tokio::time::Instant;

use crate::autosave::AutosavePipeline;
use crate::telemetry::{Metadata, TelemetryEmitter, metadata};

/// Keys whose values identify the lead in partial saves.
pub const NAME_KEY: &str = "full_name";
pub const PHONE_KEY: &str = "phone";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPosition {
    Step(u32),
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to this step.
    Next(u32),
    /// The last step validated; the form can be submitted.
    ReadyToSubmit,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("step {step} is missing required field `{first}`")]
    MissingRequired {
        step: u32,
        /// First invalid field in display order.
        first: FieldKey,
        missing: Vec<FieldKey>,
    },
    #[error("operation targets step {requested} but the form is at {current:?}")]
    StepMismatch {
        requested: u32,
        current: StepPosition,
    },
    #[error("unknown field `{0}`")]
    UnknownField(FieldKey),
    /// Answers and position are frozen while a submission is pending.
    #[error("the form is being submitted")]
    Submitting,
}

struct StepState {
    position: StepPosition,
    furthest: u32,
    drafts: BTreeMap<u32, FormData>,
    data: FormData,
    focused: HashMap<FieldKey, Instant>,
    step_entered: Instant,
    submitting: bool,
}

pub struct FormStepEngine {
    plan: StepPlan,
    state: Mutex<StepState>,
    telemetry: TelemetryEmitter,
    autosave: AutosavePipeline,
}

impl FormStepEngine {
    #[must_use]
    pub fn new(plan: StepPlan, telemetry: TelemetryEmitter, autosave: AutosavePipeline) -> Self {
        Self {
            plan,
            state: Mutex::new(StepState {
                position: StepPosition::Step(1),
                furthest: 1,
                drafts: BTreeMap::new(),
                data: FormData::new(),
                focused: HashMap::new(),
                step_entered: Instant::now(),
                submitting: false,
            }),
            telemetry,
            autosave,
        }
    }

    fn state(&self) -> MutexGuard<'_, StepState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Announce the form: `page_view` then `step_start(1)`.
    pub fn start(&self) {
        self.state().step_entered = Instant::now();
        self.telemetry
            .emit(FunnelEventType::PageView, Some(1), None, Metadata::new());
        self.telemetry
            .emit(FunnelEventType::StepStart, Some(1), None, Metadata::new());
    }

    #[must_use]
    pub fn plan(&self) -> &StepPlan {
        &self.plan
    }

    #[must_use]
    pub fn position(&self) -> StepPosition {
        self.state().position
    }

    #[must_use]
    pub fn final_step(&self) -> u32 {
        self.plan.len()
    }

    /// Committed answers of all steps.
    #[must_use]
    pub fn form_data(&self) -> FormData {
        self.state().data.clone()
    }

    /// Current value of a field: the uncommitted draft, else the committed answer.
    #[must_use]
    pub fn value(&self, key: &FieldKey) -> Option<String> {
        let state = self.state();
        self.current_value(&state, key)
    }

    fn ensure_current(state: &StepState, step: u32) -> Result<(), StepError> {
        match state.position {
            StepPosition::Step(current) if current == step => Ok(()),
            current => Err(StepError::StepMismatch {
                requested: step,
                current,
            }),
        }
    }

    fn ensure_editable(state: &StepState, step: u32) -> Result<(), StepError> {
        if state.submitting {
            return Err(StepError::Submitting);
        }
        Self::ensure_current(state, step)
    }

    fn check_required(&self, state: &StepState, step: u32) -> Result<(), StepError> {
        let fields: &[FormField] = self.plan.fields(step).unwrap_or_default();
        let draft = state.drafts.get(&step);
        let missing: Vec<FieldKey> = fields
            .iter()
            .filter(|field| field.is_required())
            .filter(|field| {
                let value = draft
                    .and_then(|d| d.get(field.key()))
                    .or_else(|| state.data.get(field.key()));
                value.is_none_or(|v| v.trim().is_empty())
            })
            .map(|field| field.key().clone())
            .collect();

        match missing.first() {
            None => Ok(()),
            Some(first) => Err(StepError::MissingRequired {
                step,
                first: first.clone(),
                missing: missing.clone(),
            }),
        }
    }

    /// Check that every required field of `step` has a non-blank value.
    pub fn validate(&self, step: u32) -> Result<(), StepError> {
        let state = self.state();
        Self::ensure_current(&state, step)?;
        self.check_required(&state, step)
    }

    /// Merge the draft of `step` into the aggregate answers.
    pub fn commit(&self, step: u32) -> Result<(), StepError> {
        let mut state = self.state();
        Self::ensure_current(&state, step)?;
        Self::merge_draft(&mut state, step);
        Ok(())
    }

    fn merge_draft(state: &mut StepState, step: u32) {
        if let Some(draft) = state.drafts.remove(&step) {
            state.data.extend(draft);
        }
    }

    pub fn advance(&self, step: u32) -> Result<Advance, StepError> {
        let (outcome, snapshot) = {
            let mut state = self.state();
            Self::ensure_editable(&state, step)?;
            self.check_required(&state, step)?;
            Self::merge_draft(&mut state, step);

            if step >= self.plan.len() {
                (Advance::ReadyToSubmit, self.snapshot(&state))
            } else {
                let next = step + 1;
                state.position = StepPosition::Step(next);
                state.furthest = state.furthest.max(next);
                state.step_entered = Instant::now();
                state.focused.clear();
                (Advance::Next(next), self.snapshot(&state))
            }
        };

        if let Advance::Next(next) = outcome {
            tracing::debug!(from = step, to = next, "Step advanced");
            self.telemetry
                .emit(FunnelEventType::StepComplete, Some(step), None, Metadata::new());
            self.telemetry
                .emit(FunnelEventType::StepStart, Some(next), None, Metadata::new());
        }
        self.autosave.schedule(snapshot);
        Ok(outcome)
    }

    /// Go back one step without validating. Drafts are kept.
    pub fn retreat(&self, step: u32) -> Result<u32, StepError> {
        let previous = {
            let mut state = self.state();
            Self::ensure_editable(&state, step)?;
            if step <= 1 {
                return Ok(1);
            }
            let previous = step - 1;
            state.position = StepPosition::Step(previous);
            state.step_entered = Instant::now();
            state.focused.clear();
            previous
        };
        self.telemetry
            .emit(FunnelEventType::StepStart, Some(previous), None, Metadata::new());
        Ok(previous)
    }

    /// Record a draft value on the current step and schedule an autosave.
    pub fn set_value(&self, key: &FieldKey, value: impl Into<String>) -> Result<(), StepError> {
        let snapshot = {
            let mut state = self.state();
            let step = self.step_of(key)?;
            Self::ensure_editable(&state, step)?;
            state
                .drafts
                .entry(step)
                .or_default()
                .insert(key.clone(), value.into());
            self.snapshot(&state)
        };
        self.autosave.schedule(snapshot);
        Ok(())
    }

    pub fn focus_field(&self, key: &FieldKey) -> Result<(), StepError> {
        let step = self.step_of(key)?;
        {
            let mut state = self.state();
            Self::ensure_current(&state, step)?;
            state.focused.insert(key.clone(), Instant::now());
        }
        self.telemetry
            .emit(FunnelEventType::FieldFocus, Some(step), Some(key), Metadata::new());
        Ok(())
    }

    /// Emit `field_blur` with the dwell time since the matching focus.
    /// Without a recorded focus nothing is emitted.
    pub fn blur_field(&self, key: &FieldKey) -> Result<(), StepError> {
        let step = self.step_of(key)?;
        let focused_at = {
            let mut state = self.state();
            Self::ensure_current(&state, step)?;
            state.focused.remove(key)
        };
        if let Some(focused_at) = focused_at {
            let time_ms = focused_at.elapsed().as_millis() as u64;
            self.telemetry.emit(
                FunnelEventType::FieldBlur,
                Some(step),
                Some(key),
                metadata("time_ms", time_ms),
            );
        }
        Ok(())
    }

    pub fn cta_click(&self, label: &str) {
        let step = match self.position() {
            StepPosition::Step(step) => Some(step),
            StepPosition::Success => None,
        };
        self.telemetry
            .emit(FunnelEventType::CtaClick, step, None, metadata("label", label));
    }

    /// Report that the user left. Returns `false` once the form succeeded.
    pub fn abandon(&self) -> bool {
        let (step, time_on_step_ms) = {
            let state = self.state();
            let StepPosition::Step(step) = state.position else {
                return false;
            };
            (step, state.step_entered.elapsed().as_millis() as u64)
        };
        let mut meta = metadata("step_reached", step);
        meta.insert("time_on_step_ms".to_string(), time_on_step_ms.into());
        self.telemetry
            .emit(FunnelEventType::FormAbandon, Some(step), None, meta);
        true
    }

    /// Freeze `step` for submission. Edits, `advance` and `retreat` fail
    /// with [`StepError::Submitting`] until the lock is dropped.
    pub(crate) fn lock_for_submit(&self, step: u32) -> Result<SubmitLock<'_>, StepError> {
        let mut state = self.state();
        Self::ensure_editable(&state, step)?;
        state.submitting = true;
        Ok(SubmitLock { engine: self })
    }

    fn step_of(&self, key: &FieldKey) -> Result<u32, StepError> {
        self.plan
            .locate(key)
            .map(|(step, _)| step)
            .ok_or_else(|| StepError::UnknownField(key.clone()))
    }

    fn snapshot(&self, state: &StepState) -> PartialLead {
        let name = self.current_value(state, &FieldKey::new(NAME_KEY));
        let phone = self.current_value(state, &FieldKey::new(PHONE_KEY));
        PartialLead::new(name.as_deref(), phone.as_deref(), state.furthest)
    }

    fn current_value(&self, state: &StepState, key: &FieldKey) -> Option<String> {
        let (step, _) = self.plan.locate(key)?;
        state
            .drafts
            .get(&step)
            .and_then(|draft| draft.get(key))
            .or_else(|| state.data.get(key))
            .cloned()
    }
}

/// Held by the submission controller while a submit is pending.
pub(crate) struct SubmitLock<'a> {
    engine: &'a FormStepEngine,
}

impl SubmitLock<'_> {
    /// Enter the terminal `Success` state.
    pub(crate) fn succeed(self) {
        let mut state = self.engine.state();
        state.position = StepPosition::Success;
        state.focused.clear();
    }
}

impl Drop for SubmitLock<'_> {
    fn drop(&mut self) {
        self.engine.state().submitting = false;
    }
}
