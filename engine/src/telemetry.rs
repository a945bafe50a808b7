//! Fire-and-forget funnel telemetry.
//!
//! Events go through a bounded in-process queue drained by one background
//! sender. When the queue is full or already closed, the event is sent by a
//! detached one-shot task instead. Neither path retries, waits for an
//! acknowledgment, or reports failures to the caller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use leadflow_backend::LeadBackend;
use leadflow_types::{AttributionContext, FieldKey, FunnelEvent, FunnelEventType, LinkId, SessionId};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

pub type Metadata = Map<String, Value>;

#[derive(Clone)]
pub struct TelemetryEmitter {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    backend: Arc<dyn LeadBackend>,
    link_id: Option<LinkId>,
    session_id: Option<SessionId>,
    enabled: bool,
    queue: Mutex<Option<mpsc::Sender<FunnelEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryEmitter {
    /// Start the background sender. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LeadBackend>,
        context: &AttributionContext,
        queue_capacity: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<FunnelEvent>(queue_capacity.max(1));
        let worker_backend = Arc::clone(&backend);
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = worker_backend.send_event(&event).await {
                    tracing::warn!(event = event.event_type.as_str(), "Telemetry send failed: {e}");
                }
            }
        });

        Self {
            inner: Arc::new(TelemetryInner {
                backend,
                link_id: context.link_id().cloned(),
                session_id: context.session_id().cloned(),
                enabled: true,
                queue: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// An emitter that drops everything.
    #[must_use]
    pub fn disabled(backend: Arc<dyn LeadBackend>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                backend,
                link_id: None,
                session_id: None,
                enabled: false,
                queue: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn emit(
        &self,
        event_type: FunnelEventType,
        step: Option<u32>,
        field_key: Option<&FieldKey>,
        metadata: Metadata,
    ) {
        let inner = &self.inner;
        if !inner.enabled {
            return;
        }
        let Some(link_id) = inner.link_id.clone() else {
            tracing::debug!(event = event_type.as_str(), "Dropping event without link id");
            return;
        };

        let event = FunnelEvent {
            session_id: inner.session_id.clone(),
            link_id,
            event_type,
            step,
            field_key: field_key.cloned(),
            metadata,
            occurred_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let rejected = {
            let queue = inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
            match queue.as_ref() {
                Some(tx) => match tx.try_send(event) {
                    Ok(()) => None,
                    Err(TrySendError::Full(event) | TrySendError::Closed(event)) => Some(event),
                },
                None => Some(event),
            }
        };

        if let Some(event) = rejected {
            self.send_detached(event);
        }
    }

    /// One-shot send outside the queue.
    fn send_detached(&self, event: FunnelEvent) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(
                event = event.event_type.as_str(),
                "No runtime for telemetry fallback; event dropped"
            );
            return;
        };
        let backend = Arc::clone(&self.inner.backend);
        handle.spawn(async move {
            if let Err(e) = backend.send_event(&event).await {
                tracing::warn!(event = event.event_type.as_str(), "Telemetry fallback failed: {e}");
            }
        });
    }

    /// Stop queueing and give the sender until `deadline` to drain.
    ///
    /// Events emitted after this go through the one-shot path.
    pub async fn close(&self, deadline: Duration) {
        drop(
            self.inner
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut worker) = worker else {
            return;
        };

        if tokio::time::timeout(deadline, &mut worker).await.is_err() {
            tracing::warn!(
                deadline_ms = deadline.as_millis(),
                "Telemetry queue not drained before deadline"
            );
            worker.abort();
        }
    }
}

/// Build a one-entry metadata map.
pub(crate) fn metadata(key: &str, value: impl Into<Value>) -> Metadata {
    let mut map = Map::new();
    map.insert(key.to_string(), value.into());
    map
}
