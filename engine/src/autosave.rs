//! Debounced partial-lead persistence.
//!
//! A burst of edits inside the debounce window collapses into one write
//! carrying the latest snapshot. Writes are serialized: the next one starts
//! only after the previous one settled, so it can carry the lead id the
//! previous one obtained.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use leadflow_backend::retry::generate_idempotency_key;
use leadflow_backend::{LeadBackend, PartialLeadRequest};
use leadflow_types::{AttributionContext, PartialLead};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::session::LeadIdSlot;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Clone)]
pub struct AutosavePipeline {
    inner: Arc<AutosaveInner>,
}

struct AutosaveInner {
    backend: Arc<dyn LeadBackend>,
    context: Arc<AttributionContext>,
    lead_id: LeadIdSlot,
    debounce: Duration,
    cancel: CancellationToken,
    pending: Mutex<PendingState>,
    write_lock: tokio::sync::Mutex<()>,
    in_flight: watch::Sender<usize>,
}

#[derive(Default)]
struct PendingState {
    generation: u64,
    timer: Option<PendingWrite>,
}

struct PendingWrite {
    generation: u64,
    abort: AbortHandle,
    snapshot: PartialLead,
}

/// Counts a taken snapshot until its write settles.
struct InFlight<'a>(&'a watch::Sender<usize>);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl AutosavePipeline {
    #[must_use]
    pub fn new(
        backend: Arc<dyn LeadBackend>,
        context: Arc<AttributionContext>,
        lead_id: LeadIdSlot,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(AutosaveInner {
                backend,
                context,
                lead_id,
                debounce,
                cancel,
                pending: Mutex::new(PendingState::default()),
                write_lock: tokio::sync::Mutex::new(()),
                in_flight,
            }),
        }
    }

    /// Replace the pending snapshot and restart the debounce timer.
    ///
    /// A write that already started is left alone.
    pub fn schedule(&self, snapshot: PartialLead) {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("No runtime for autosave timer; snapshot dropped");
            return;
        };

        let (abort, registration) = AbortHandle::new_pair();
        let generation = {
            let mut pending = inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = pending.timer.take() {
                previous.abort.abort();
            }
            pending.generation += 1;
            pending.timer = Some(PendingWrite {
                generation: pending.generation,
                abort,
                snapshot,
            });
            pending.generation
        };
        tracing::debug!(generation, "Autosave scheduled");

        let pipeline = self.clone();
        handle.spawn(async move {
            let timer = Abortable::new(tokio::time::sleep(pipeline.inner.debounce), registration);
            tokio::select! {
                () = pipeline.inner.cancel.cancelled() => {}
                fired = timer => {
                    if fired.is_ok() {
                        pipeline.fire(generation).await;
                    }
                }
            }
        });
    }

    /// Write the pending snapshot immediately, then wait until no write is
    /// in flight.
    pub async fn flush_now(&self) {
        let inner = &self.inner;
        let pending = inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timer
            .take()
            .map(|timer| {
                timer.abort.abort();
                (timer.snapshot, InFlight::enter(&inner.in_flight))
            });
        if let Some((snapshot, _in_flight)) = pending {
            self.write(snapshot).await;
        }

        let mut settled = inner.in_flight.subscribe();
        // The sender lives as long as `inner`, so this only resolves on zero.
        let _ = settled.wait_for(|count| *count == 0).await;
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timer
            .is_some()
    }

    async fn fire(&self, generation: u64) {
        let inner = &self.inner;
        let taken = {
            let mut pending = inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending
                .timer
                .take_if(|timer| timer.generation == generation)
                .map(|timer| (timer.snapshot, InFlight::enter(&inner.in_flight)))
        };
        let Some((snapshot, _in_flight)) = taken else {
            return;
        };
        self.write(snapshot).await;
    }

    async fn write(&self, snapshot: PartialLead) {
        let inner = &self.inner;
        if !snapshot.has_identity() {
            tracing::debug!("Skipping autosave without name or phone");
            return;
        }

        let _serialized = inner.write_lock.lock().await;
        if inner.cancel.is_cancelled() {
            return;
        }

        let request = PartialLeadRequest::new(&inner.context, inner.lead_id.get(), &snapshot);
        let key = generate_idempotency_key("partial");
        let result = tokio::select! {
            () = inner.cancel.cancelled() => {
                tracing::debug!("Discarding autosave result after teardown");
                return;
            }
            result = inner.backend.upsert_partial(&request, &key) => result,
        };

        match result {
            Ok(ack) => {
                tracing::debug!(last_step = snapshot.last_step, "Partial lead saved");
                if let Some(id) = ack.lead_id {
                    inner.lead_id.record(id);
                }
            }
            Err(e) => {
                tracing::warn!(last_step = snapshot.last_step, "Autosave failed: {e}");
            }
        }
    }
}
