//! Domain events for the Image Generation context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artifex_core::error::DomainError;
use artifex_core::event::{DomainEvent, EventMetadata};
use artifex_core::repository::StoredEvent;

/// Closed enumeration of the event types this context produces. The wire
/// names double as subscription topics, so they are stable protocol surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationEventType {
    ImageGenerationRequested,
    ImageGenerationValidated,
    ImageGenerationQueued,
    ImageGenerationStarted,
    ImageGenerationProgress,
    ImageGenerationCompleted,
    ImageGenerationFailed,
    ImageGenerationCancelled,
    ImageGenerationRetried,
}

impl GenerationEventType {
    /// All event types, in lifecycle order. Sent in the welcome frame.
    pub const ALL: [Self; 9] = [
        Self::ImageGenerationRequested,
        Self::ImageGenerationValidated,
        Self::ImageGenerationQueued,
        Self::ImageGenerationStarted,
        Self::ImageGenerationProgress,
        Self::ImageGenerationCompleted,
        Self::ImageGenerationFailed,
        Self::ImageGenerationCancelled,
        Self::ImageGenerationRetried,
    ];

    /// The wire name of this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageGenerationRequested => "ImageGenerationRequested",
            Self::ImageGenerationValidated => "ImageGenerationValidated",
            Self::ImageGenerationQueued => "ImageGenerationQueued",
            Self::ImageGenerationStarted => "ImageGenerationStarted",
            Self::ImageGenerationProgress => "ImageGenerationProgress",
            Self::ImageGenerationCompleted => "ImageGenerationCompleted",
            Self::ImageGenerationFailed => "ImageGenerationFailed",
            Self::ImageGenerationCancelled => "ImageGenerationCancelled",
            Self::ImageGenerationRetried => "ImageGenerationRetried",
        }
    }
}

impl std::fmt::Display for GenerationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GenerationEventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown event type: {s}")))
    }
}

/// Generation parameters supplied with the initial request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    /// Requested image width in pixels.
    pub width: Option<u32>,
    /// Requested image height in pixels.
    pub height: Option<u32>,
    /// Model identifier, when the client pins one.
    pub model: Option<String>,
}

/// The output of a completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// Where the produced image can be fetched.
    pub image_url: String,
    /// Actual output width in pixels.
    pub width: Option<u32>,
    /// Actual output height in pixels.
    pub height: Option<u32>,
    /// The seed the provider used, for reproducibility.
    pub seed: Option<i64>,
}

/// Emitted when a generation job is first requested (version 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationRequested {
    /// The prompt to generate from.
    pub prompt: String,
    /// Generation parameters.
    #[serde(default)]
    pub parameters: GenerationParameters,
}

/// Emitted when a progress update arrives from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationProgress {
    /// Completion percentage, 0..=100.
    pub progress: u8,
}

/// Emitted when the provider delivers the finished image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationCompleted {
    /// The generation output.
    pub result: GenerationResult,
}

/// Emitted when the provider reports a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationFailed {
    /// Human-readable failure description.
    pub error: String,
}

/// Emitted when a client cancels the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationCancelled {
    /// Optional cancellation reason.
    pub reason: Option<String>,
}

/// Emitted when a failed job is re-queued. Resets the existing aggregate to
/// `queued` rather than forking a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationRetried {
    /// 1-based attempt counter after this retry.
    pub attempt: u32,
}

/// The payload of a generation event, one variant per event type.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEventKind {
    Requested(ImageGenerationRequested),
    Validated,
    Queued,
    Started,
    Progress(ImageGenerationProgress),
    Completed(ImageGenerationCompleted),
    Failed(ImageGenerationFailed),
    Cancelled(ImageGenerationCancelled),
    Retried(ImageGenerationRetried),
}

impl GenerationEventKind {
    /// The event type this payload belongs to.
    #[must_use]
    pub fn event_type(&self) -> GenerationEventType {
        match self {
            Self::Requested(_) => GenerationEventType::ImageGenerationRequested,
            Self::Validated => GenerationEventType::ImageGenerationValidated,
            Self::Queued => GenerationEventType::ImageGenerationQueued,
            Self::Started => GenerationEventType::ImageGenerationStarted,
            Self::Progress(_) => GenerationEventType::ImageGenerationProgress,
            Self::Completed(_) => GenerationEventType::ImageGenerationCompleted,
            Self::Failed(_) => GenerationEventType::ImageGenerationFailed,
            Self::Cancelled(_) => GenerationEventType::ImageGenerationCancelled,
            Self::Retried(_) => GenerationEventType::ImageGenerationRetried,
        }
    }

    /// Serializes the payload to JSON. Payload-less event types serialize as
    /// an empty object.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let payload = match self {
            Self::Requested(payload) => serde_json::to_value(payload),
            Self::Progress(payload) => serde_json::to_value(payload),
            Self::Completed(payload) => serde_json::to_value(payload),
            Self::Failed(payload) => serde_json::to_value(payload),
            Self::Cancelled(payload) => serde_json::to_value(payload),
            Self::Retried(payload) => serde_json::to_value(payload),
            Self::Validated | Self::Queued | Self::Started => {
                return serde_json::Value::Object(serde_json::Map::new());
            }
        };
        // These payload structs contain only JSON-representable fields.
        payload.unwrap_or(serde_json::Value::Null)
    }

    /// Reconstructs the payload from its event type and stored JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` when the payload does not match
    /// the event type's schema.
    pub fn from_payload(
        event_type: GenerationEventType,
        payload: &serde_json::Value,
    ) -> Result<Self, DomainError> {
        let corrupt =
            |err: serde_json::Error| DomainError::Infrastructure(format!("corrupt payload for {event_type}: {err}"));
        Ok(match event_type {
            GenerationEventType::ImageGenerationRequested => {
                Self::Requested(serde_json::from_value(payload.clone()).map_err(corrupt)?)
            }
            GenerationEventType::ImageGenerationValidated => Self::Validated,
            GenerationEventType::ImageGenerationQueued => Self::Queued,
            GenerationEventType::ImageGenerationStarted => Self::Started,
            GenerationEventType::ImageGenerationProgress => {
                Self::Progress(serde_json::from_value(payload.clone()).map_err(corrupt)?)
            }
            GenerationEventType::ImageGenerationCompleted => {
                Self::Completed(serde_json::from_value(payload.clone()).map_err(corrupt)?)
            }
            GenerationEventType::ImageGenerationFailed => {
                Self::Failed(serde_json::from_value(payload.clone()).map_err(corrupt)?)
            }
            GenerationEventType::ImageGenerationCancelled => {
                Self::Cancelled(serde_json::from_value(payload.clone()).map_err(corrupt)?)
            }
            GenerationEventType::ImageGenerationRetried => {
                Self::Retried(serde_json::from_value(payload.clone()).map_err(corrupt)?)
            }
        })
    }
}

/// An immutable fact about one generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationEvent {
    /// Event metadata (identity, stream position, tracing).
    pub metadata: EventMetadata,
    /// The event payload.
    pub kind: GenerationEventKind,
}

impl GenerationEvent {
    /// The typed event type.
    #[must_use]
    pub fn generation_event_type(&self) -> GenerationEventType {
        self.kind.event_type()
    }

    /// Converts to the persisted representation.
    #[must_use]
    pub fn to_stored(&self) -> StoredEvent {
        StoredEvent {
            event_id: self.metadata.event_id,
            aggregate_id: self.metadata.aggregate_id,
            event_type: self.kind.event_type().as_str().to_owned(),
            payload: self.kind.to_payload(),
            sequence_number: self.metadata.sequence_number,
            correlation_id: self.metadata.correlation_id,
            causation_id: self.metadata.causation_id,
            user_id: self.metadata.user_id,
            occurred_at: self.metadata.occurred_at,
        }
    }

    /// Reconstructs a typed event from its persisted representation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` when the event type is unknown or the payload
    /// does not deserialize.
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
        let event_type: GenerationEventType = stored.event_type.parse()?;
        let kind = GenerationEventKind::from_payload(event_type, &stored.payload)?;
        Ok(Self {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_id: stored.aggregate_id,
                sequence_number: stored.sequence_number,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                user_id: stored.user_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        })
    }
}

impl DomainEvent for GenerationEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type().as_str()
    }

    fn to_payload(&self) -> serde_json::Value {
        self.kind.to_payload()
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Wire view of a committed event, carried by `event.occurred` frames and
/// the audit history query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    /// Event type name.
    pub event_type: String,
    /// The aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// The aggregate version this event produced.
    pub version: i64,
    /// Event-specific payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the cause.
    pub causation_id: Uuid,
    /// The user behind the causing command, when known.
    pub user_id: Option<Uuid>,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl From<&GenerationEvent> for EventView {
    fn from(event: &GenerationEvent) -> Self {
        Self {
            event_type: event.kind.event_type().as_str().to_owned(),
            aggregate_id: event.metadata.aggregate_id,
            version: event.metadata.sequence_number,
            payload: event.kind.to_payload(),
            correlation_id: event.metadata.correlation_id,
            causation_id: event.metadata.causation_id,
            user_id: event.metadata.user_id,
            occurred_at: event.metadata.occurred_at,
        }
    }
}

impl From<&StoredEvent> for EventView {
    fn from(stored: &StoredEvent) -> Self {
        Self {
            event_type: stored.event_type.clone(),
            aggregate_id: stored.aggregate_id,
            version: stored.sequence_number,
            payload: stored.payload.clone(),
            correlation_id: stored.correlation_id,
            causation_id: stored.causation_id,
            user_id: stored.user_id,
            occurred_at: stored.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn metadata(aggregate_id: Uuid, sequence_number: i64, event_type: GenerationEventType) -> EventMetadata {
        EventMetadata {
            event_id: Uuid::new_v4(),
            event_type: event_type.as_str().to_owned(),
            aggregate_id,
            sequence_number,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            user_id: None,
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_event_type_wire_names_are_stable() {
        assert_eq!(
            GenerationEventType::ImageGenerationRequested.as_str(),
            "ImageGenerationRequested"
        );
        assert_eq!(
            "ImageGenerationProgress".parse::<GenerationEventType>().unwrap(),
            GenerationEventType::ImageGenerationProgress
        );
        assert!("ImageGenerationExploded".parse::<GenerationEventType>().is_err());
    }

    #[test]
    fn test_stored_round_trip_preserves_kind_and_metadata() {
        let aggregate_id = Uuid::new_v4();
        let event = GenerationEvent {
            metadata: metadata(aggregate_id, 3, GenerationEventType::ImageGenerationProgress),
            kind: GenerationEventKind::Progress(ImageGenerationProgress { progress: 50 }),
        };

        let stored = event.to_stored();
        assert_eq!(stored.event_type, "ImageGenerationProgress");
        assert_eq!(stored.sequence_number, 3);
        assert_eq!(stored.payload["progress"], 50);

        let decoded = GenerationEvent::from_stored(&stored).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_payloadless_events_serialize_as_empty_object() {
        let event = GenerationEvent {
            metadata: metadata(Uuid::new_v4(), 2, GenerationEventType::ImageGenerationQueued),
            kind: GenerationEventKind::Queued,
        };
        assert_eq!(event.kind.to_payload(), serde_json::json!({}));
        let decoded = GenerationEvent::from_stored(&event.to_stored()).unwrap();
        assert_eq!(decoded.kind, GenerationEventKind::Queued);
    }

    #[test]
    fn test_corrupt_payload_is_an_infrastructure_error() {
        let result = GenerationEventKind::from_payload(
            GenerationEventType::ImageGenerationProgress,
            &serde_json::json!({"progress": "half"}),
        );
        assert!(matches!(
            result.unwrap_err(),
            DomainError::Infrastructure(_)
        ));
    }

    #[test]
    fn test_event_view_uses_camel_case_wire_fields() {
        let event = GenerationEvent {
            metadata: metadata(Uuid::new_v4(), 1, GenerationEventType::ImageGenerationRequested),
            kind: GenerationEventKind::Requested(ImageGenerationRequested {
                prompt: "sunset".to_owned(),
                parameters: GenerationParameters::default(),
            }),
        };
        let view = EventView::from(&event);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["eventType"], "ImageGenerationRequested");
        assert_eq!(json["version"], 1);
        assert_eq!(json["payload"]["prompt"], "sunset");
        assert!(json.get("occurredAt").is_some());
    }
}
