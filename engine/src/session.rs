//! Per-session lead identity.

use std::sync::{Arc, Mutex, PoisonError};

use leadflow_types::LeadId;

/// Holds the backend-issued lead id for one form session.
///
/// The first id recorded wins. Autosave, submission and telemetry share one
/// slot so every write after the first successful partial save references it.
#[derive(Debug, Clone, Default)]
pub struct LeadIdSlot {
    inner: Arc<Mutex<Option<LeadId>>>,
}

impl LeadIdSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<LeadId> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record an id issued by the backend.
    ///
    /// Returns `false` when a different id is already held; the new one is
    /// ignored.
    pub fn record(&self, id: LeadId) -> bool {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            None => {
                tracing::info!(lead_id = %id, "Lead id assigned");
                *slot = Some(id);
                true
            }
            Some(held) if *held == id => true,
            Some(held) => {
                tracing::warn!(
                    held = %held,
                    ignored = %id,
                    "Backend returned a different lead id; keeping the first"
                );
                false
            }
        }
    }
}
