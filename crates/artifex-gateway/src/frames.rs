//! Wire frames for the WebSocket protocol.
//!
//! Every frame is an envelope `{type, payload?, correlationId?, timestamp}`
//! around a closed, serde-tagged message enum. Dispatch is on the enum
//! variant, never on a string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artifex_generation::domain::aggregates::GenerationStatus;
use artifex_generation::domain::commands::GenerationCommandKind;
use artifex_generation::domain::events::EventView;

/// Envelope around a message enum. `correlationId` is echoed back on every
/// frame produced in response to a client request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame<T> {
    /// The tagged message.
    #[serde(flatten)]
    pub message: T,
    /// Client-chosen id correlating a response to its request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// When the frame was produced. Optional on inbound frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> Frame<T> {
    /// Wraps an outbound message, stamping the current time.
    #[must_use]
    pub fn outbound(message: T, correlation_id: Option<Uuid>) -> Self {
        Self {
            message,
            correlation_id,
            timestamp: Some(Utc::now()),
        }
    }
}

/// Payload of `authenticate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    /// Opaque token handed to the [`crate::auth::AuthProvider`].
    pub token: String,
}

/// Payload of `subscribe` / `unsubscribe`. The single entry `"*"` means
/// every event type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// Event type names to (un)subscribe.
    pub event_types: Vec<String>,
}

/// Payload of the per-aggregate messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatePayload {
    /// The aggregate in question.
    pub aggregate_id: Uuid,
}

/// Payload of `query.getUserHistory`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHistoryPayload {
    /// 1-based page, defaulting to the first.
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size, defaulting to 20.
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Optional status filter.
    #[serde(default)]
    pub status: Option<GenerationStatus>,
}

/// Payload of `command.execute`. The command kind and its own payload are
/// flattened in, so the wire shape is
/// `{aggregateId, expectedVersion?, commandType, payload?}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecutePayload {
    /// The aggregate to transition.
    pub aggregate_id: Uuid,
    /// Optimistic concurrency token.
    #[serde(default)]
    pub expected_version: Option<i64>,
    /// The command itself.
    #[serde(flatten)]
    pub command: GenerationCommandKind,
}

/// Everything a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "authenticate")]
    Authenticate(AuthenticatePayload),
    #[serde(rename = "subscribe")]
    Subscribe(SubscribePayload),
    #[serde(rename = "unsubscribe")]
    Unsubscribe(SubscribePayload),
    #[serde(rename = "subscribeToAggregate")]
    SubscribeToAggregate(AggregatePayload),
    #[serde(rename = "query.getAggregateState")]
    GetAggregateState(AggregatePayload),
    #[serde(rename = "query.getQueuePosition")]
    GetQueuePosition(AggregatePayload),
    #[serde(rename = "query.getUserHistory")]
    GetUserHistory(UserHistoryPayload),
    #[serde(rename = "query.getSystemMetrics")]
    GetSystemMetrics,
    #[serde(rename = "query.getEventHistory")]
    GetEventHistory(AggregatePayload),
    #[serde(rename = "command.execute")]
    ExecuteCommand(CommandExecutePayload),
    #[serde(rename = "ping")]
    Ping,
}

/// Everything the server may send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// First frame on every connection.
    #[serde(rename = "connection.established")]
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished {
        client_id: Uuid,
        event_types: Vec<&'static str>,
    },
    /// Authentication succeeded.
    #[serde(rename = "auth.success")]
    #[serde(rename_all = "camelCase")]
    AuthSuccess { user_id: Uuid },
    /// A subscription change was applied.
    #[serde(rename = "subscription.confirmed")]
    #[serde(rename_all = "camelCase")]
    SubscriptionConfirmed {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_types: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        aggregate_id: Option<Uuid>,
    },
    /// A command committed; the new stream version is final.
    #[serde(rename = "command_accepted")]
    #[serde(rename_all = "camelCase")]
    CommandAccepted { aggregate_id: Uuid, version: i64 },
    /// A command was refused; nothing was appended.
    #[serde(rename = "command_rejected")]
    #[serde(rename_all = "camelCase")]
    CommandRejected { code: &'static str, message: String },
    /// A query answered. `null` means the subject does not exist.
    #[serde(rename = "query_result")]
    #[serde(rename_all = "camelCase")]
    QueryResult { result: serde_json::Value },
    /// A query failed.
    #[serde(rename = "query_error")]
    #[serde(rename_all = "camelCase")]
    QueryError { code: &'static str, message: String },
    /// A committed event matching one of the client's subscriptions.
    #[serde(rename = "event.occurred")]
    #[serde(rename_all = "camelCase")]
    EventOccurred { event: EventView },
    /// A protocol-level error; the connection stays open.
    #[serde(rename = "error")]
    #[serde(rename_all = "camelCase")]
    Error { code: &'static str, message: String },
    /// Application-level ping reply.
    #[serde(rename = "pong")]
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_deserializes_command_execute() {
        let aggregate_id = Uuid::new_v4();
        let json = serde_json::json!({
            "type": "command.execute",
            "correlationId": "7f1aeb2c-0000-4000-8000-000000000001",
            "payload": {
                "aggregateId": aggregate_id,
                "expectedVersion": 4,
                "commandType": "UpdateProgress",
                "payload": {"progress": 50}
            }
        });

        let frame: Frame<ClientMessage> = serde_json::from_value(json).unwrap();
        assert!(frame.correlation_id.is_some());
        match frame.message {
            ClientMessage::ExecuteCommand(payload) => {
                assert_eq!(payload.aggregate_id, aggregate_id);
                assert_eq!(payload.expected_version, Some(4));
                assert!(matches!(
                    payload.command,
                    GenerationCommandKind::UpdateProgress(_)
                ));
            }
            other => panic!("expected command.execute, got {other:?}"),
        }
    }

    #[test]
    fn test_client_frame_deserializes_payloadless_messages() {
        let frame: Frame<ClientMessage> =
            serde_json::from_value(serde_json::json!({"type": "ping"})).unwrap();
        assert!(matches!(frame.message, ClientMessage::Ping));
        assert!(frame.correlation_id.is_none());

        let frame: Frame<ClientMessage> =
            serde_json::from_value(serde_json::json!({"type": "query.getSystemMetrics"})).unwrap();
        assert!(matches!(frame.message, ClientMessage::GetSystemMetrics));
    }

    #[test]
    fn test_unknown_message_type_fails_to_parse() {
        let result = serde_json::from_value::<Frame<ClientMessage>>(
            serde_json::json!({"type": "reticulateSplines"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_server_frame_envelope_shape() {
        let correlation_id = Uuid::new_v4();
        let frame = Frame::outbound(
            ServerMessage::CommandAccepted {
                aggregate_id: Uuid::new_v4(),
                version: 5,
            },
            Some(correlation_id),
        );

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "command_accepted");
        assert_eq!(json["payload"]["version"], 5);
        assert_eq!(json["correlationId"], correlation_id.to_string());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_error_frame_omits_absent_correlation_id() {
        let frame = Frame::outbound(
            ServerMessage::Error {
                code: "MALFORMED_FRAME",
                message: "expected value".to_owned(),
            },
            None,
        );

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["code"], "MALFORMED_FRAME");
        assert!(json.get("correlationId").is_none());
    }

    #[test]
    fn test_connection_established_lists_event_types() {
        use artifex_generation::domain::events::GenerationEventType;

        let frame = Frame::outbound(
            ServerMessage::ConnectionEstablished {
                client_id: Uuid::new_v4(),
                event_types: GenerationEventType::ALL
                    .iter()
                    .map(|t| t.as_str())
                    .collect(),
            },
            None,
        );

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "connection.established");
        let types = json["payload"]["eventTypes"].as_array().unwrap();
        assert_eq!(types.len(), 9);
        assert_eq!(types[0], "ImageGenerationRequested");
    }

    #[test]
    fn test_subscription_confirmed_carries_only_relevant_fields() {
        let frame = Frame::outbound(
            ServerMessage::SubscriptionConfirmed {
                event_types: Some(vec!["ImageGenerationCompleted".to_owned()]),
                aggregate_id: None,
            },
            None,
        );

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["payload"]["eventTypes"][0], "ImageGenerationCompleted");
        assert!(json["payload"].get("aggregateId").is_none());
    }
}
