//! Lead payloads exchanged with the backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{FieldKey, LeadId};

/// Aggregate answers of the whole form, keyed by field.
pub type FormData = BTreeMap<FieldKey, String>;

/// Snapshot of partial progress handed to the autosave pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialLead {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub last_step: u32,
}

impl PartialLead {
    /// Build a snapshot, treating blank values as absent.
    #[must_use]
    pub fn new(name: Option<&str>, phone: Option<&str>, last_step: u32) -> Self {
        Self {
            name: non_blank(name),
            phone: non_blank(phone),
            last_step,
        }
    }

    /// A partial record is only worth creating when it identifies someone.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.name.is_some() || self.phone.is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// What a confirmed submission hands back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessPayload {
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
    #[serde(default)]
    pub whatsapp_link: Option<String>,
}
