//! In-memory implementation of the `EventRepository` trait.
//!
//! The authoritative backend for tests and single-node deployments. Streams
//! live in a `HashMap` keyed by aggregate ID; the expected-version check
//! makes concurrent appends on the same stream lose deterministically.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use artifex_core::error::DomainError;
use artifex_core::repository::{EventRepository, StoredEvent};

/// In-memory, per-aggregate event streams.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: RwLock<HashMap<Uuid, Vec<StoredEvent>>>,
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::cast_possible_wrap)]
#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| DomainError::Infrastructure("stream lock poisoned".into()))?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn load_events_from(
        &self,
        aggregate_id: Uuid,
        after_sequence: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| DomainError::Infrastructure("stream lock poisoned".into()))?;
        Ok(streams
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|event| event.sequence_number > after_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| DomainError::Infrastructure("stream lock poisoned".into()))?;
        let stream = streams.entry(aggregate_id).or_default();
        let actual = stream.len() as i64;

        if expected_version != actual {
            return Err(DomainError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        // Versions must stay contiguous from 1; a gap or duplicate here is a
        // bug in the caller, not a concurrency race.
        for (offset, event) in events.iter().enumerate() {
            let assigned = actual + offset as i64 + 1;
            if event.sequence_number != assigned {
                return Err(DomainError::Infrastructure(format!(
                    "non-contiguous sequence number {} on aggregate {aggregate_id}, expected {assigned}",
                    event.sequence_number
                )));
            }
        }

        stream.extend_from_slice(events);
        Ok(())
    }

    async fn aggregate_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| DomainError::Infrastructure("stream lock poisoned".into()))?;
        Ok(streams.get(&aggregate_id).map_or(0, |s| s.len() as i64))
    }
}
