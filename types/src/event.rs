//! Funnel telemetry events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{FieldKey, LinkId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelEventType {
    PageView,
    FieldFocus,
    FieldBlur,
    StepStart,
    StepComplete,
    FormAbandon,
    FormSubmit,
    CtaClick,
}

impl FunnelEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::FieldFocus => "field_focus",
            Self::FieldBlur => "field_blur",
            Self::StepStart => "step_start",
            Self::StepComplete => "step_complete",
            Self::FormAbandon => "form_abandon",
            Self::FormSubmit => "form_submit",
            Self::CtaClick => "cta_click",
        }
    }
}

/// One behavioral signal. Built once, sent once, never mutated or retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelEvent {
    pub session_id: Option<SessionId>,
    pub link_id: LinkId,
    pub event_type: FunnelEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_key: Option<FieldKey>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// RFC 3339 timestamp taken when the event was emitted.
    pub occurred_at: String,
}
