//! Commands for the Image Generation context.

use serde::Deserialize;
use uuid::Uuid;

use artifex_core::command::{Command, CommandMetadata};

use super::events::{GenerationParameters, GenerationResult};

/// Payload of `RequestImageGeneration`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestImageGeneration {
    /// The prompt to generate from. Must be non-empty.
    pub prompt: String,
    /// Generation parameters.
    #[serde(default)]
    pub parameters: GenerationParameters,
}

/// Payload of `UpdateProgress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgress {
    /// Completion percentage, 0..=100.
    pub progress: u8,
}

/// Payload of `CompleteImageGeneration`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteImageGeneration {
    /// The generation output.
    pub result: GenerationResult,
}

/// Payload of `FailImageGeneration`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailImageGeneration {
    /// Human-readable failure description. Must be non-empty.
    pub error: String,
}

/// Payload of `CancelImageGeneration`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelImageGeneration {
    /// Optional cancellation reason.
    pub reason: Option<String>,
}

/// Closed enumeration of command kinds. Deserializes from the wire shape
/// `{"commandType": "...", "payload": {...}}`, so adding a kind is a
/// compile-time-checked change, not a string comparison.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "commandType", content = "payload")]
pub enum GenerationCommandKind {
    RequestImageGeneration(RequestImageGeneration),
    StartImageGeneration,
    UpdateProgress(UpdateProgress),
    CompleteImageGeneration(CompleteImageGeneration),
    FailImageGeneration(FailImageGeneration),
    CancelImageGeneration(CancelImageGeneration),
    RetryImageGeneration,
}

impl GenerationCommandKind {
    /// The type name for this command.
    #[must_use]
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::RequestImageGeneration(_) => "RequestImageGeneration",
            Self::StartImageGeneration => "StartImageGeneration",
            Self::UpdateProgress(_) => "UpdateProgress",
            Self::CompleteImageGeneration(_) => "CompleteImageGeneration",
            Self::FailImageGeneration(_) => "FailImageGeneration",
            Self::CancelImageGeneration(_) => "CancelImageGeneration",
            Self::RetryImageGeneration => "RetryImageGeneration",
        }
    }
}

/// A request to transition one generation aggregate.
#[derive(Debug, Clone)]
pub struct GenerationCommand {
    /// The aggregate to transition.
    pub aggregate_id: Uuid,
    /// Optimistic concurrency token. When absent, the version read during
    /// dispatch is used.
    pub expected_version: Option<i64>,
    /// Correlation and user metadata.
    pub metadata: CommandMetadata,
    /// What to do.
    pub kind: GenerationCommandKind,
}

impl Command for GenerationCommand {
    fn command_type(&self) -> &'static str {
        self.kind.command_type()
    }

    fn correlation_id(&self) -> Uuid {
        self.metadata.correlation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind_deserializes_from_wire_shape() {
        let json = serde_json::json!({
            "commandType": "RequestImageGeneration",
            "payload": {"prompt": "sunset", "parameters": {"width": 512}}
        });
        let kind: GenerationCommandKind = serde_json::from_value(json).unwrap();
        match kind {
            GenerationCommandKind::RequestImageGeneration(payload) => {
                assert_eq!(payload.prompt, "sunset");
                assert_eq!(payload.parameters.width, Some(512));
            }
            other => panic!("expected RequestImageGeneration, got {other:?}"),
        }
    }

    #[test]
    fn test_payloadless_command_deserializes_without_payload_field() {
        let json = serde_json::json!({"commandType": "StartImageGeneration"});
        let kind: GenerationCommandKind = serde_json::from_value(json).unwrap();
        assert!(matches!(kind, GenerationCommandKind::StartImageGeneration));
        assert_eq!(kind.command_type(), "StartImageGeneration");
    }

    #[test]
    fn test_unknown_command_type_is_rejected() {
        let json = serde_json::json!({"commandType": "ReticulateSplines"});
        assert!(serde_json::from_value::<GenerationCommandKind>(json).is_err());
    }
}
