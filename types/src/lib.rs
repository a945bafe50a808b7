//! Core domain types for Leadflow.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod attribution;
mod event;
mod form;
mod ids;
mod kanban;
mod lead;
pub mod national_id;

pub use attribution::{AttributionContext, AttributionError, UtmTags};
pub use event::{FunnelEvent, FunnelEventType};
pub use form::{FieldKey, FieldKind, FormConfig, FormConfigError, FormField, StepPlan};
pub use ids::{ClientId, LeadId, LinkId, SessionId};
pub use kanban::KanbanStatus;
pub use lead::{FormData, PartialLead, SuccessPayload};
