//! Request and response bodies of the lead backend.

use leadflow_types::{
    AttributionContext, ClientId, FormData, KanbanStatus, LeadId, LinkId, PartialLead, SessionId,
    SuccessPayload, UtmTags,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /leads/partial`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialLeadRequest {
    pub client_id: ClientId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<LinkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Present once the backend has issued an id; turns the call into an update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<LeadId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub last_step: u32,
    pub utm_data: UtmTags,
}

impl PartialLeadRequest {
    #[must_use]
    pub fn new(context: &AttributionContext, lead_id: Option<LeadId>, partial: &PartialLead) -> Self {
        Self {
            client_id: context.client_id().clone(),
            link_id: context.link_id().cloned(),
            session_id: context.session_id().cloned(),
            lead_id,
            name: partial.name.clone(),
            phone: partial.phone.clone(),
            last_step: partial.last_step,
            utm_data: context.utm().clone(),
        }
    }
}

/// Body of `POST /leads`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitLeadRequest {
    pub client_id: ClientId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<LinkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<LeadId>,
    pub form_data: FormData,
    pub consent_given: bool,
    pub utm_data: UtmTags,
}

impl SubmitLeadRequest {
    #[must_use]
    pub fn new(
        context: &AttributionContext,
        lead_id: Option<LeadId>,
        form_data: FormData,
        consent_given: bool,
    ) -> Self {
        Self {
            client_id: context.client_id().clone(),
            link_id: context.link_id().cloned(),
            session_id: context.session_id().cloned(),
            lead_id,
            form_data,
            consent_given,
            utm_data: context.utm().clone(),
        }
    }
}

/// Response of `POST /leads/partial`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpsertAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
}

/// Raw response of `POST /leads`; only `status == "success"` confirms the lead.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SubmitAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub payload: SuccessPayload,
}

/// Body of `PATCH /leads/{id}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct StatusPatch {
    pub status: KanbanStatus,
}

/// A final submission counts only when the backend answers `"success"`.
pub(crate) fn is_confirmed_submission(status: Option<&str>) -> bool {
    status == Some("success")
}

/// Partial upserts also accept `"ok"`; a missing status is checked by the caller.
pub(crate) fn is_accepted_upsert(status: &str) -> bool {
    status.eq_ignore_ascii_case("success") || status.eq_ignore_ascii_case("ok")
}
