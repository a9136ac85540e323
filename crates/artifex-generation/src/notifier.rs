//! Event notifier — the bridge from committed events to read models and
//! real-time subscribers.
//!
//! Subscribed to every commit of the event store. For each event it (a)
//! folds the projections forward and (b), only when the fold newly applied
//! the event, hands it to every registered sink. Stale redeliveries update
//! nothing and are not re-broadcast.

use std::sync::{Arc, RwLock};

use artifex_core::repository::StoredEvent;
use artifex_event_store::{EventStore, SubscriptionId};

use crate::domain::events::GenerationEvent;
use crate::projections::ProjectionStore;

/// Receives committed events for real-time fan-out. Implemented by the
/// gateway's connection registry; delivery must be non-blocking.
pub trait EventSink: Send + Sync {
    /// Delivers one newly committed event.
    fn deliver(&self, event: &GenerationEvent);
}

/// Keeps projections and sinks in sync with the event store.
pub struct EventNotifier {
    projections: Arc<ProjectionStore>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventNotifier {
    /// Creates a notifier over the given projection store.
    #[must_use]
    pub fn new(projections: Arc<ProjectionStore>) -> Self {
        Self {
            projections,
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Registers a sink for real-time fan-out.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(sink);
    }

    /// Subscribes this notifier to every commit of `store`.
    pub fn attach(self: &Arc<Self>, store: &EventStore) -> SubscriptionId {
        let notifier = Arc::clone(self);
        store.subscribe_to_all(Arc::new(move |stored: &StoredEvent| {
            notifier.handle(stored);
        }))
    }

    /// Handles one committed event: fold projections, then fan out.
    pub fn handle(&self, stored: &StoredEvent) {
        let event = match GenerationEvent::from_stored(stored) {
            Ok(event) => event,
            Err(err) => {
                // An undecodable event must not poison the subscription.
                tracing::warn!(
                    aggregate_id = %stored.aggregate_id,
                    sequence_number = stored.sequence_number,
                    error = %err,
                    "skipping undecodable committed event"
                );
                return;
            }
        };

        if self.projections.apply(&event) {
            let sinks = self
                .sinks
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone();
            for sink in sinks {
                sink.deliver(&event);
            }
        } else {
            tracing::debug!(
                aggregate_id = %stored.aggregate_id,
                sequence_number = stored.sequence_number,
                "ignoring redelivered event"
            );
        }
    }
}
