//! Aggregate root for the Image Generation context.
//!
//! An `ImageGeneration` is entirely derived from its event stream. Command
//! methods validate the lifecycle state machine and push uncommitted events;
//! `apply` is the pure fold used during reconstitution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artifex_core::clock::Clock;
use artifex_core::command::CommandMetadata;
use artifex_core::error::DomainError;
use artifex_core::event::EventMetadata;

use super::events::{
    GenerationEvent, GenerationEventKind, GenerationParameters, GenerationResult,
    ImageGenerationCancelled, ImageGenerationCompleted, ImageGenerationFailed,
    ImageGenerationProgress, ImageGenerationRequested, ImageGenerationRetried,
};

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Requested,
    Validated,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    /// Terminal states accept no further commands (retry of a failed job
    /// being the single, documented exception).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Lowercase wire name, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Validated => "validated",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregate root for one image-generation job.
#[derive(Debug)]
pub struct ImageGeneration {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (count of applied events).
    version: i64,
    /// Current lifecycle state; `None` until the first event is applied.
    status: Option<GenerationStatus>,
    /// Last reported progress percentage.
    progress: u8,
    /// 1-based attempt counter.
    attempt: u32,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<GenerationEvent>,
}

impl ImageGeneration {
    /// Creates an empty, not-yet-requested aggregate.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            status: None,
            progress: 0,
            attempt: 1,
            uncommitted_events: Vec::new(),
        }
    }

    /// Reconstitutes an aggregate by folding its committed events.
    pub fn from_events(id: Uuid, events: &[GenerationEvent]) -> Self {
        let mut aggregate = Self::new(id);
        for event in events {
            aggregate.apply(event);
        }
        aggregate
    }

    /// Returns the current version (number of events applied).
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the current lifecycle state, `None` before creation.
    #[must_use]
    pub fn status(&self) -> Option<GenerationStatus> {
        self.status
    }

    /// Returns uncommitted events produced by command handling.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[GenerationEvent] {
        &self.uncommitted_events
    }

    /// Clears uncommitted events after persistence.
    pub fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }

    /// Applies a committed event to mutate internal state (pure fold).
    pub fn apply(&mut self, event: &GenerationEvent) {
        match &event.kind {
            GenerationEventKind::Requested(_) => {
                self.status = Some(GenerationStatus::Requested);
            }
            GenerationEventKind::Validated => {
                self.status = Some(GenerationStatus::Validated);
            }
            GenerationEventKind::Queued => {
                self.status = Some(GenerationStatus::Queued);
            }
            GenerationEventKind::Started => {
                self.status = Some(GenerationStatus::Processing);
            }
            GenerationEventKind::Progress(payload) => {
                self.progress = payload.progress;
            }
            GenerationEventKind::Completed(_) => {
                self.status = Some(GenerationStatus::Completed);
                self.progress = 100;
            }
            GenerationEventKind::Failed(_) => {
                self.status = Some(GenerationStatus::Failed);
            }
            GenerationEventKind::Cancelled(_) => {
                self.status = Some(GenerationStatus::Cancelled);
            }
            GenerationEventKind::Retried(payload) => {
                self.status = Some(GenerationStatus::Queued);
                self.progress = 0;
                self.attempt = payload.attempt;
            }
        }
        self.version += 1;
    }

    /// Requests a new generation, producing `ImageGenerationRequested` at
    /// version 1. Only legal on an aggregate with no history.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty prompt; `InvalidStateTransition` when the
    /// aggregate already exists.
    pub fn request(
        &mut self,
        prompt: String,
        parameters: GenerationParameters,
        metadata: &CommandMetadata,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if prompt.trim().is_empty() {
            return Err(DomainError::Validation("prompt must not be empty".into()));
        }
        if self.status.is_some() {
            return Err(self.illegal("RequestImageGeneration"));
        }
        self.emit(
            GenerationEventKind::Requested(ImageGenerationRequested { prompt, parameters }),
            metadata,
            clock,
        );
        Ok(())
    }

    /// Advances the job toward execution. From `requested` this validates
    /// and enqueues (two events); from `queued` it moves to `processing`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` from any other state.
    pub fn start(
        &mut self,
        metadata: &CommandMetadata,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        match self.status {
            Some(GenerationStatus::Requested) => {
                self.emit(GenerationEventKind::Validated, metadata, clock);
                self.emit(GenerationEventKind::Queued, metadata, clock);
                Ok(())
            }
            Some(GenerationStatus::Queued) => {
                self.emit(GenerationEventKind::Started, metadata, clock);
                Ok(())
            }
            _ => Err(self.illegal("StartImageGeneration")),
        }
    }

    /// Records a progress update while processing.
    ///
    /// # Errors
    ///
    /// `Validation` when progress exceeds 100; `InvalidStateTransition`
    /// outside `processing`.
    pub fn update_progress(
        &mut self,
        progress: u8,
        metadata: &CommandMetadata,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if progress > 100 {
            return Err(DomainError::Validation(format!(
                "progress must be 0..=100, got {progress}"
            )));
        }
        if self.status != Some(GenerationStatus::Processing) {
            return Err(self.illegal("UpdateProgress"));
        }
        self.emit(
            GenerationEventKind::Progress(ImageGenerationProgress { progress }),
            metadata,
            clock,
        );
        Ok(())
    }

    /// Completes the job with its output.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty image URL; `InvalidStateTransition` outside
    /// `processing`.
    pub fn complete(
        &mut self,
        result: GenerationResult,
        metadata: &CommandMetadata,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if result.image_url.trim().is_empty() {
            return Err(DomainError::Validation("image URL must not be empty".into()));
        }
        if self.status != Some(GenerationStatus::Processing) {
            return Err(self.illegal("CompleteImageGeneration"));
        }
        self.emit(
            GenerationEventKind::Completed(ImageGenerationCompleted { result }),
            metadata,
            clock,
        );
        Ok(())
    }

    /// Marks the job failed.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty error message; `InvalidStateTransition`
    /// outside `processing`.
    pub fn fail(
        &mut self,
        error: String,
        metadata: &CommandMetadata,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if error.trim().is_empty() {
            return Err(DomainError::Validation("error message must not be empty".into()));
        }
        if self.status != Some(GenerationStatus::Processing) {
            return Err(self.illegal("FailImageGeneration"));
        }
        self.emit(
            GenerationEventKind::Failed(ImageGenerationFailed { error }),
            metadata,
            clock,
        );
        Ok(())
    }

    /// Cancels the job. Legal from any non-terminal state.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` on terminal or nonexistent aggregates.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        metadata: &CommandMetadata,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        match self.status {
            Some(status) if !status.is_terminal() => {
                self.emit(
                    GenerationEventKind::Cancelled(ImageGenerationCancelled { reason }),
                    metadata,
                    clock,
                );
                Ok(())
            }
            _ => Err(self.illegal("CancelImageGeneration")),
        }
    }

    /// Re-queues a failed job on the same aggregate, incrementing the
    /// attempt counter. The one exception to terminal-state immutability.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` from any state other than `failed`.
    pub fn retry(
        &mut self,
        metadata: &CommandMetadata,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.status != Some(GenerationStatus::Failed) {
            return Err(self.illegal("RetryImageGeneration"));
        }
        self.emit(
            GenerationEventKind::Retried(ImageGenerationRetried {
                attempt: self.attempt + 1,
            }),
            metadata,
            clock,
        );
        Ok(())
    }

    fn illegal(&self, command: &str) -> DomainError {
        DomainError::InvalidStateTransition {
            aggregate_id: self.id,
            state: self
                .status
                .map_or_else(|| "none".to_owned(), |s| s.as_str().to_owned()),
            command: command.to_owned(),
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn emit(&mut self, kind: GenerationEventKind, metadata: &CommandMetadata, clock: &dyn Clock) {
        let event = GenerationEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().as_str().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id: metadata.correlation_id,
                causation_id: metadata.correlation_id,
                user_id: metadata.user_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.uncommitted_events.push(event);
    }
}
