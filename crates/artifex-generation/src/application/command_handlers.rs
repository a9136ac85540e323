//! Command bus for the Image Generation context.
//!
//! Dispatch orchestrates domain logic: reconstitute the aggregate from its
//! stream, validate the requested transition against the state machine, and
//! append the resulting events with optimistic concurrency. The bus never
//! retries a version conflict — retry policy belongs to the caller.

use std::sync::Arc;

use uuid::Uuid;

use artifex_core::clock::Clock;
use artifex_core::command::Command;
use artifex_core::error::DomainError;
use artifex_core::repository::StoredEvent;
use artifex_event_store::EventStore;

use crate::domain::aggregates::ImageGeneration;
use crate::domain::commands::{GenerationCommand, GenerationCommandKind};
use crate::domain::events::GenerationEvent;

/// The result of an accepted command.
#[derive(Debug)]
pub struct CommandOutcome {
    /// The aggregate that was transitioned.
    pub aggregate_id: Uuid,
    /// The stream version after the append.
    pub version: i64,
    /// The events the command produced, in commit order.
    pub events: Vec<GenerationEvent>,
}

/// Receives typed commands and turns them into committed events.
pub struct CommandBus {
    store: Arc<EventStore>,
    clock: Arc<dyn Clock>,
}

impl CommandBus {
    /// Creates a command bus over the given store and clock.
    #[must_use]
    pub fn new(store: Arc<EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Dispatches one command.
    ///
    /// # Errors
    ///
    /// - [`DomainError::Validation`] for a malformed payload, before the
    ///   store is touched.
    /// - [`DomainError::AggregateNotFound`] for any command other than
    ///   `RequestImageGeneration` on an unknown aggregate.
    /// - [`DomainError::InvalidStateTransition`] when the state machine
    ///   rejects the command; nothing is appended.
    /// - [`DomainError::VersionConflict`] on optimistic-concurrency failure;
    ///   the caller must re-read and decide whether to retry.
    /// - [`DomainError::Infrastructure`] on storage failure.
    pub async fn dispatch(&self, command: GenerationCommand) -> Result<CommandOutcome, DomainError> {
        let aggregate_id = command.aggregate_id;
        let stored = self.store.load_events(aggregate_id).await?;

        if stored.is_empty()
            && !matches!(command.kind, GenerationCommandKind::RequestImageGeneration(_))
        {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }

        let mut aggregate = ImageGeneration::new(aggregate_id);
        for event in &stored {
            aggregate.apply(&GenerationEvent::from_stored(event)?);
        }

        tracing::debug!(
            %aggregate_id,
            command = command.command_type(),
            correlation_id = %command.correlation_id(),
            version = aggregate.version(),
            "dispatching command"
        );

        let clock = self.clock.as_ref();
        let metadata = &command.metadata;
        match command.kind {
            GenerationCommandKind::RequestImageGeneration(payload) => {
                aggregate.request(payload.prompt, payload.parameters, metadata, clock)?;
            }
            GenerationCommandKind::StartImageGeneration => {
                aggregate.start(metadata, clock)?;
            }
            GenerationCommandKind::UpdateProgress(payload) => {
                aggregate.update_progress(payload.progress, metadata, clock)?;
            }
            GenerationCommandKind::CompleteImageGeneration(payload) => {
                aggregate.complete(payload.result, metadata, clock)?;
            }
            GenerationCommandKind::FailImageGeneration(payload) => {
                aggregate.fail(payload.error, metadata, clock)?;
            }
            GenerationCommandKind::CancelImageGeneration(payload) => {
                aggregate.cancel(payload.reason, metadata, clock)?;
            }
            GenerationCommandKind::RetryImageGeneration => {
                aggregate.retry(metadata, clock)?;
            }
        }

        let events = aggregate.uncommitted_events().to_vec();
        let stored_events: Vec<StoredEvent> =
            events.iter().map(GenerationEvent::to_stored).collect();
        let expected_version = command.expected_version.unwrap_or_else(|| aggregate.version());

        let version = self
            .store
            .append(aggregate_id, expected_version, &stored_events)
            .await?;

        Ok(CommandOutcome {
            aggregate_id,
            version,
            events,
        })
    }
}
