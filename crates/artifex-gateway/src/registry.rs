//! Connection registry and fan-out.
//!
//! One registry per process, shared by every connection task. All indices
//! live under a single short-lived lock; the lock covers map mutation only,
//! never I/O. Fan-out collects the matching senders under the lock and sends
//! after releasing it, so one slow client cannot stall the rest.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use artifex_generation::domain::events::{EventView, GenerationEvent, GenerationEventType};
use artifex_generation::notifier::EventSink;

use crate::frames::{Frame, ServerMessage};

/// Outbound channel half for one connection.
pub type OutboundSender = mpsc::UnboundedSender<Frame<ServerMessage>>;

struct ClientHandle {
    user_id: Option<Uuid>,
    sender: OutboundSender,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<Uuid, ClientHandle>,
    by_event_type: HashMap<GenerationEventType, HashSet<Uuid>>,
    by_aggregate: HashMap<Uuid, HashSet<Uuid>>,
    wildcard: HashSet<Uuid>,
}

/// Tracks live connections and their subscriptions.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers a freshly connected, unauthenticated client.
    pub fn register(&self, client_id: Uuid, sender: OutboundSender) {
        self.lock().connections.insert(
            client_id,
            ClientHandle {
                user_id: None,
                sender,
            },
        );
    }

    /// Marks a client as authenticated.
    pub fn authenticate(&self, client_id: Uuid, user_id: Uuid) {
        if let Some(handle) = self.lock().connections.get_mut(&client_id) {
            handle.user_id = Some(user_id);
        }
    }

    /// Subscribes a client to the given event types, or to every type when
    /// `wildcard` is set.
    pub fn subscribe(&self, client_id: Uuid, event_types: &[GenerationEventType], wildcard: bool) {
        let mut inner = self.lock();
        if !inner.connections.contains_key(&client_id) {
            return;
        }
        if wildcard {
            inner.wildcard.insert(client_id);
        }
        for event_type in event_types {
            inner
                .by_event_type
                .entry(*event_type)
                .or_default()
                .insert(client_id);
        }
    }

    /// Removes the given event-type subscriptions, or the wildcard.
    pub fn unsubscribe(
        &self,
        client_id: Uuid,
        event_types: &[GenerationEventType],
        wildcard: bool,
    ) {
        let mut inner = self.lock();
        if wildcard {
            inner.wildcard.remove(&client_id);
        }
        for event_type in event_types {
            if let Some(subscribers) = inner.by_event_type.get_mut(event_type) {
                subscribers.remove(&client_id);
            }
        }
    }

    /// Subscribes a client to every event of one aggregate.
    pub fn subscribe_aggregate(&self, client_id: Uuid, aggregate_id: Uuid) {
        let mut inner = self.lock();
        if !inner.connections.contains_key(&client_id) {
            return;
        }
        inner
            .by_aggregate
            .entry(aggregate_id)
            .or_default()
            .insert(client_id);
    }

    /// Removes a client and purges it from every index. Idempotent.
    pub fn remove(&self, client_id: Uuid) {
        let mut inner = self.lock();
        inner.connections.remove(&client_id);
        inner.wildcard.remove(&client_id);
        inner.by_event_type.retain(|_, subscribers| {
            subscribers.remove(&client_id);
            !subscribers.is_empty()
        });
        inner.by_aggregate.retain(|_, subscribers| {
            subscribers.remove(&client_id);
            !subscribers.is_empty()
        });
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }
}

impl EventSink for ConnectionRegistry {
    fn deliver(&self, event: &GenerationEvent) {
        let event_type = event.kind.event_type();
        let aggregate_id = event.metadata.aggregate_id;

        // Collect matching senders under the lock, send after releasing it.
        let targets: Vec<(Uuid, OutboundSender)> = {
            let inner = self.lock();
            let mut matched: HashSet<Uuid> = inner.wildcard.clone();
            if let Some(subscribers) = inner.by_event_type.get(&event_type) {
                matched.extend(subscribers);
            }
            if let Some(subscribers) = inner.by_aggregate.get(&aggregate_id) {
                matched.extend(subscribers);
            }
            matched
                .into_iter()
                .filter_map(|client_id| {
                    // Only authenticated connections receive events, even if
                    // a subscription was somehow registered earlier.
                    inner
                        .connections
                        .get(&client_id)
                        .filter(|handle| handle.user_id.is_some())
                        .map(|handle| (client_id, handle.sender.clone()))
                })
                .collect()
        };

        let message = ServerMessage::EventOccurred {
            event: EventView::from(event),
        };
        for (client_id, sender) in targets {
            if sender.send(Frame::outbound(message.clone(), None)).is_err() {
                // The connection task is gone; its cleanup will remove it.
                tracing::debug!(%client_id, "dropping event for closed connection");
            }
        }
    }
}
