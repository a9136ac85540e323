//! The `EventStore` façade.
//!
//! Wraps an [`EventRepository`] with per-aggregate append serialization and
//! synchronous commit notification: every subscriber sees each committed
//! event, in commit order, before `append` returns to the caller. A
//! projection update is therefore at least scheduled before the command bus
//! reports success.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use artifex_core::error::DomainError;
use artifex_core::repository::{EventRepository, StoredEvent};

/// Handle returned by [`EventStore::subscribe_to_all`]; pass it to
/// [`EventStore::unsubscribe`] to stop receiving commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handler invoked for every committed event.
pub type CommitHandler = Arc<dyn Fn(&StoredEvent) + Send + Sync>;

/// Append-only event store with optimistic concurrency and commit fan-out.
pub struct EventStore {
    repository: Arc<dyn EventRepository>,
    // One async mutex per aggregate stream. Appends on different aggregates
    // never contend; the lock covers only the append + notify step.
    stream_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    subscribers: Mutex<HashMap<u64, CommitHandler>>,
    next_subscription: AtomicU64,
}

impl EventStore {
    /// Creates a store over the given repository.
    #[must_use]
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self {
            repository,
            stream_locks: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    fn stream_lock(&self, aggregate_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .stream_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(aggregate_id).or_default())
    }

    // Sheds the lock entry once no appender holds a clone, so the map does
    // not grow with every aggregate ever written.
    fn release_stream_lock(&self, aggregate_id: Uuid) {
        let mut locks = self
            .stream_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = locks.get(&aggregate_id) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&aggregate_id);
            }
        }
    }

    fn handlers(&self) -> Vec<CommitHandler> {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Appends `events` to the aggregate stream, expecting the stream to be
    /// at `expected_version`. Returns the committed version.
    ///
    /// Subscribers are notified with each event in commit order before this
    /// method returns.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::VersionConflict`] when `expected_version` does
    /// not match the stream's current version (nothing is committed), or
    /// [`DomainError::Infrastructure`] on storage failure.
    #[allow(clippy::cast_possible_wrap)]
    pub async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        if events.is_empty() {
            return self.repository.aggregate_version(aggregate_id).await;
        }

        let lock = self.stream_lock(aggregate_id);
        let result = async {
            let _guard = lock.lock().await;

            self.repository
                .append_events(aggregate_id, expected_version, events)
                .await?;
            let committed = expected_version + events.len() as i64;

            let handlers = self.handlers();
            for event in events {
                for handler in &handlers {
                    handler(event);
                }
            }

            Ok(committed)
        }
        .await;

        drop(lock);
        self.release_stream_lock(aggregate_id);
        result
    }

    /// Load all events for an aggregate, ordered by sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Infrastructure`] on storage failure.
    pub async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.repository.load_events(aggregate_id).await
    }

    /// Load events with a sequence number strictly greater than
    /// `after_sequence`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Infrastructure`] on storage failure.
    pub async fn load_events_from(
        &self,
        aggregate_id: Uuid,
        after_sequence: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        self.repository
            .load_events_from(aggregate_id, after_sequence)
            .await
    }

    /// Returns the current version of an aggregate stream (0 if unknown).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Infrastructure`] on storage failure.
    pub async fn aggregate_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        self.repository.aggregate_version(aggregate_id).await
    }

    /// Registers a handler invoked for every committed event.
    pub fn subscribe_to_all(&self, handler: CommitHandler) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, handler);
        SubscriptionId(id)
    }

    /// Removes a previously registered commit handler.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&subscription.0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::{TimeZone, Utc};

    use crate::memory_event_repository::InMemoryEventRepository;

    use super::*;

    fn stored_event(aggregate_id: Uuid, sequence_number: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id,
            event_type: "ImageGenerationRequested".to_owned(),
            payload: serde_json::json!({}),
            sequence_number,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            user_id: None,
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    fn memory_store() -> EventStore {
        EventStore::new(Arc::new(InMemoryEventRepository::new()))
    }

    #[tokio::test]
    async fn test_append_returns_committed_version() {
        let store = memory_store();
        let aggregate_id = Uuid::new_v4();

        let committed = store
            .append(aggregate_id, 0, &[stored_event(aggregate_id, 1)])
            .await
            .unwrap();
        assert_eq!(committed, 1);

        let committed = store
            .append(
                aggregate_id,
                1,
                &[stored_event(aggregate_id, 2), stored_event(aggregate_id, 3)],
            )
            .await
            .unwrap();
        assert_eq!(committed, 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_events_in_commit_order_before_append_returns() {
        let store = memory_store();
        let aggregate_id = Uuid::new_v4();

        let seen: Arc<StdMutex<Vec<i64>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe_to_all(Arc::new(move |event: &StoredEvent| {
            sink.lock().unwrap().push(event.sequence_number);
        }));

        store
            .append(
                aggregate_id,
                0,
                &[stored_event(aggregate_id, 1), stored_event(aggregate_id, 2)],
            )
            .await
            .unwrap();

        // Synchronous notification: by the time append returned, both
        // events were delivered, in version order.
        assert_eq!(seen.lock().unwrap().clone(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        let store = memory_store();
        let aggregate_id = Uuid::new_v4();

        let seen: Arc<StdMutex<Vec<i64>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store.subscribe_to_all(Arc::new(move |event: &StoredEvent| {
            sink.lock().unwrap().push(event.sequence_number);
        }));

        store
            .append(aggregate_id, 0, &[stored_event(aggregate_id, 1)])
            .await
            .unwrap();
        store.unsubscribe(subscription);
        store
            .append(aggregate_id, 1, &[stored_event(aggregate_id, 2)])
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().clone(), vec![1]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_at_same_version_commit_exactly_one() {
        let store = Arc::new(memory_store());
        let aggregate_id = Uuid::new_v4();

        let first = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .append(aggregate_id, 0, &[stored_event(aggregate_id, 1)])
                    .await
            })
        };
        let second = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .append(aggregate_id, 0, &[stored_event(aggregate_id, 1)])
                    .await
            })
        };

        let (first, second) = (first.await.unwrap(), second.await.unwrap());
        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one append must win");

        let conflict = if first.is_ok() { second } else { first };
        assert!(matches!(
            conflict.unwrap_err(),
            DomainError::VersionConflict { expected: 0, actual: 1, .. }
        ));
        assert_eq!(store.aggregate_version(aggregate_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_appends_on_different_aggregates_do_not_conflict() {
        let store = Arc::new(memory_store());
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();

        let left_events = [stored_event(left, 1)];
        let right_events = [stored_event(right, 1)];
        let (a, b) = tokio::join!(
            store.append(left, 0, &left_events),
            store.append(right, 0, &right_events),
        );

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_forwards_stream_and_version_to_the_repository() {
        use artifex_test_support::RecordingEventRepository;

        let repository = Arc::new(RecordingEventRepository::new(Ok(vec![])));
        let store = EventStore::new(Arc::clone(&repository) as Arc<dyn EventRepository>);
        let aggregate_id = Uuid::new_v4();

        store
            .append(
                aggregate_id,
                3,
                &[stored_event(aggregate_id, 4), stored_event(aggregate_id, 5)],
            )
            .await
            .unwrap();

        let appended = repository.appended_events();
        assert_eq!(appended.len(), 1);
        let (recorded_aggregate, recorded_expected, recorded_events) = &appended[0];
        assert_eq!(*recorded_aggregate, aggregate_id);
        assert_eq!(*recorded_expected, 3);
        assert_eq!(recorded_events.len(), 2);
        assert_eq!(recorded_events[0].sequence_number, 4);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_infrastructure_error() {
        use artifex_test_support::FailingEventRepository;

        let store = EventStore::new(Arc::new(FailingEventRepository));
        let aggregate_id = Uuid::new_v4();

        let err = store
            .append(aggregate_id, 0, &[stored_event(aggregate_id, 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Infrastructure(_)));
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_stream_locks_are_shed_once_appends_finish() {
        let store = memory_store();
        for _ in 0..16 {
            let aggregate_id = Uuid::new_v4();
            store
                .append(aggregate_id, 0, &[stored_event(aggregate_id, 1)])
                .await
                .unwrap();
        }

        // Failed appends release their entry too.
        let aggregate_id = Uuid::new_v4();
        let _ = store
            .append(aggregate_id, 7, &[stored_event(aggregate_id, 8)])
            .await;

        assert!(store.stream_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_append_is_a_noop_returning_current_version() {
        let store = memory_store();
        let aggregate_id = Uuid::new_v4();

        store
            .append(aggregate_id, 0, &[stored_event(aggregate_id, 1)])
            .await
            .unwrap();
        let version = store.append(aggregate_id, 1, &[]).await.unwrap();
        assert_eq!(version, 1);
    }
}
