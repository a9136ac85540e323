//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// The command is illegal for the aggregate's current state.
    /// Rejected before anything is appended.
    #[error("invalid state transition on aggregate {aggregate_id}: {command} is not legal in state {state}")]
    InvalidStateTransition {
        /// The aggregate that rejected the command.
        aggregate_id: Uuid,
        /// The current state of the aggregate.
        state: String,
        /// The command that was rejected.
        command: String,
    },

    /// Optimistic concurrency conflict. Retryable: the caller must re-read
    /// the aggregate and decide whether to retry.
    #[error("version conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A validation error in a command or query payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Machine-readable error code for wire frames.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AggregateNotFound(_) => "NOT_FOUND",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Infrastructure(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_display_names_versions() {
        let id = Uuid::new_v4();
        let err = DomainError::VersionConflict {
            aggregate_id: id,
            expected: 2,
            actual: 3,
        };
        let message = err.to_string();
        assert!(message.contains("expected version 2"));
        assert!(message.contains("found 3"));
        assert_eq!(err.code(), "VERSION_CONFLICT");
    }

    #[test]
    fn test_invalid_state_transition_display_names_command_and_state() {
        let err = DomainError::InvalidStateTransition {
            aggregate_id: Uuid::new_v4(),
            state: "cancelled".to_owned(),
            command: "CompleteImageGeneration".to_owned(),
        };
        let message = err.to_string();
        assert!(message.contains("CompleteImageGeneration"));
        assert!(message.contains("cancelled"));
        assert_eq!(err.code(), "INVALID_STATE_TRANSITION");
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            DomainError::AggregateNotFound(Uuid::new_v4()).code(),
            "NOT_FOUND"
        );
        assert_eq!(DomainError::Validation("bad".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            DomainError::Infrastructure("db down".into()).code(),
            "INTERNAL_ERROR"
        );
    }
}
