//! National-id check: local precheck first, then the external registry.
//!
//! The remote answer is advisory. A slow, unreachable or failing registry
//! never blocks a submission; only an explicit refusal does.

use std::sync::Arc;
use std::time::Duration;

use leadflow_backend::{NationalIdVerifier, Verification};
use leadflow_types::national_id::{Precheck, precheck};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_VALIDATOR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ExternalFieldValidator {
    verifier: Option<Arc<dyn NationalIdVerifier>>,
    timeout: Duration,
}

impl ExternalFieldValidator {
    #[must_use]
    pub fn new(verifier: Arc<dyn NationalIdVerifier>, timeout: Duration) -> Self {
        Self {
            verifier: Some(verifier),
            timeout,
        }
    }

    /// Precheck only; every locally plausible value is accepted.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            verifier: None,
            timeout: DEFAULT_VALIDATOR_TIMEOUT,
        }
    }

    pub async fn check(&self, raw: &str) -> bool {
        let digits = match precheck(raw) {
            Precheck::Empty => return true,
            Precheck::Rejected(reason) => {
                tracing::debug!(%reason, "National id rejected locally");
                return false;
            }
            Precheck::NeedsRemote(digits) => digits,
        };
        let Some(verifier) = &self.verifier else {
            return true;
        };

        match tokio::time::timeout(self.timeout, verifier.verify(&digits)).await {
            Ok(Ok(Verification::Accepted)) => true,
            Ok(Ok(Verification::Refused)) => false,
            Ok(Err(e)) => {
                tracing::warn!("National id registry unavailable, accepting: {e}");
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis(),
                    "National id registry timed out, accepting"
                );
                true
            }
        }
    }

    /// Like [`check`](Self::check), but resolves to `None` once `cancel`
    /// fires so a stale answer is never applied.
    pub async fn check_with_cancel(&self, raw: &str, cancel: &CancellationToken) -> Option<bool> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            valid = self.check(raw) => Some(valid),
        }
    }
}
