//! Per-connection WebSocket task.
//!
//! One task per socket. The task owns both halves of the split socket plus
//! the outbound mpsc channel the registry fans into, and combines inbound
//! frame handling, outbound forwarding, and ping/pong keepalive in a single
//! select loop. If no Pong arrives within [`PONG_TIMEOUT`] after a Ping the
//! connection is considered dead; that is routine cleanup, not an error.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use artifex_core::command::CommandMetadata;
use artifex_core::error::DomainError;
use artifex_generation::application::{GenerationQuery, GenerationQueryKind};
use artifex_generation::domain::commands::GenerationCommand;
use artifex_generation::domain::events::GenerationEventType;

use crate::frames::{
    AggregatePayload, ClientMessage, CommandExecutePayload, Frame, ServerMessage,
    SubscribePayload, UserHistoryPayload,
};
use crate::registry::OutboundSender;
use crate::state::AppState;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection
/// dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Ping/pong liveness state for one connection.
struct Keepalive {
    last_pong: Instant,
    awaiting_pong: bool,
}

impl Keepalive {
    fn new() -> Self {
        Self {
            last_pong: Instant::now(),
            awaiting_pong: false,
        }
    }

    /// Called on each ping tick. Returns `true` when the previous ping went
    /// unanswered past [`PONG_TIMEOUT`] and the peer must be dropped;
    /// otherwise marks a ping as outstanding.
    fn on_ping_tick(&mut self) -> bool {
        if self.awaiting_pong && self.last_pong.elapsed() > PONG_TIMEOUT {
            return true;
        }
        self.awaiting_pong = true;
        false
    }

    fn on_pong(&mut self) {
        self.last_pong = Instant::now();
        self.awaiting_pong = false;
    }
}

/// Serves one accepted WebSocket until it closes, then cleans up.
pub async fn serve(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    state.registry.register(client_id, outbound_tx.clone());
    tracing::info!(%client_id, "client connected");

    run_socket_loop(socket, &state, client_id, outbound_tx, outbound_rx).await;

    state.registry.remove(client_id);
    tracing::info!(%client_id, "client disconnected");
}

async fn run_socket_loop(
    socket: WebSocket,
    state: &AppState,
    client_id: Uuid,
    outbound_tx: OutboundSender,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame<ServerMessage>>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session {
        state,
        client_id,
        user_id: None,
        outbound: outbound_tx,
    };
    session.send(
        ServerMessage::ConnectionEstablished {
            client_id,
            event_types: GenerationEventType::ALL.iter().map(|t| t.as_str()).collect(),
        },
        None,
    );

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut keepalive = Keepalive::new();

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if keepalive.on_ping_tick() {
                    tracing::debug!(%client_id, "no pong within timeout, closing");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }

            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(%client_id, error = %err, "failed to serialize outbound frame");
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()).await,
                    Some(Ok(Message::Pong(_))) => keepalive.on_pong(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(%client_id, error = %err, "socket error, closing");
                        break;
                    }
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sender.send(Message::Close(None)).await;
}

/// Protocol state for one connection.
struct Session<'a> {
    state: &'a AppState,
    client_id: Uuid,
    user_id: Option<Uuid>,
    outbound: OutboundSender,
}

impl Session<'_> {
    fn send(&self, message: ServerMessage, correlation_id: Option<Uuid>) {
        // A closed channel means the socket loop already exited.
        let _ = self.outbound.send(Frame::outbound(message, correlation_id));
    }

    async fn handle_text(&mut self, text: &str) {
        let frame: Frame<ClientMessage> = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.send(
                    ServerMessage::Error {
                        code: "MALFORMED_FRAME",
                        message: err.to_string(),
                    },
                    None,
                );
                return;
            }
        };

        let correlation_id = frame.correlation_id;
        match frame.message {
            ClientMessage::Ping => self.send(ServerMessage::Pong, correlation_id),
            ClientMessage::Authenticate(payload) => {
                self.handle_authenticate(&payload.token, correlation_id);
            }
            message => {
                // Everything else requires authentication. The socket stays
                // open so the client can still authenticate.
                let Some(user_id) = self.user_id else {
                    self.send(
                        ServerMessage::Error {
                            code: "AUTHENTICATION_REQUIRED",
                            message: "authenticate before sending this message".to_owned(),
                        },
                        correlation_id,
                    );
                    return;
                };
                self.handle_authenticated(message, user_id, correlation_id).await;
            }
        }
    }

    fn handle_authenticate(&mut self, token: &str, correlation_id: Option<Uuid>) {
        match self.state.auth.authenticate(token) {
            Some(user_id) => {
                self.user_id = Some(user_id);
                self.state.registry.authenticate(self.client_id, user_id);
                tracing::info!(client_id = %self.client_id, %user_id, "client authenticated");
                self.send(ServerMessage::AuthSuccess { user_id }, correlation_id);
            }
            None => {
                self.send(
                    ServerMessage::Error {
                        code: "AUTHENTICATION_REQUIRED",
                        message: "invalid token".to_owned(),
                    },
                    correlation_id,
                );
            }
        }
    }

    async fn handle_authenticated(
        &mut self,
        message: ClientMessage,
        user_id: Uuid,
        correlation_id: Option<Uuid>,
    ) {
        match message {
            ClientMessage::Subscribe(payload) => self.handle_subscribe(&payload, correlation_id),
            ClientMessage::Unsubscribe(payload) => {
                self.handle_unsubscribe(&payload, correlation_id);
            }
            ClientMessage::SubscribeToAggregate(payload) => {
                self.handle_subscribe_aggregate(&payload, correlation_id);
            }
            ClientMessage::ExecuteCommand(payload) => {
                self.handle_command(payload, user_id, correlation_id).await;
            }
            ClientMessage::GetAggregateState(AggregatePayload { aggregate_id }) => {
                self.run_query(
                    GenerationQueryKind::GetImageGenerationStatus { aggregate_id },
                    correlation_id,
                )
                .await;
            }
            ClientMessage::GetQueuePosition(AggregatePayload { aggregate_id }) => {
                self.run_query(
                    GenerationQueryKind::GetQueuePosition { aggregate_id },
                    correlation_id,
                )
                .await;
            }
            ClientMessage::GetUserHistory(UserHistoryPayload { page, page_size, status }) => {
                self.run_query(
                    GenerationQueryKind::GetUserGenerationHistory {
                        user_id,
                        page: page.unwrap_or(1),
                        page_size: page_size.unwrap_or(20),
                        status,
                    },
                    correlation_id,
                )
                .await;
            }
            ClientMessage::GetSystemMetrics => {
                self.run_query(GenerationQueryKind::GetSystemMetrics, correlation_id)
                    .await;
            }
            ClientMessage::GetEventHistory(AggregatePayload { aggregate_id }) => {
                self.run_query(
                    GenerationQueryKind::GetEventHistory { aggregate_id },
                    correlation_id,
                )
                .await;
            }
            // Handled by the caller.
            ClientMessage::Authenticate(_) | ClientMessage::Ping => {}
        }
    }

    fn handle_subscribe(&self, payload: &SubscribePayload, correlation_id: Option<Uuid>) {
        match parse_event_types(&payload.event_types) {
            Ok((event_types, wildcard)) => {
                self.state
                    .registry
                    .subscribe(self.client_id, &event_types, wildcard);
                self.send(
                    ServerMessage::SubscriptionConfirmed {
                        event_types: Some(payload.event_types.clone()),
                        aggregate_id: None,
                    },
                    correlation_id,
                );
            }
            Err(err) => self.send(
                ServerMessage::Error {
                    code: err.code(),
                    message: err.to_string(),
                },
                correlation_id,
            ),
        }
    }

    fn handle_unsubscribe(&self, payload: &SubscribePayload, correlation_id: Option<Uuid>) {
        match parse_event_types(&payload.event_types) {
            Ok((event_types, wildcard)) => {
                self.state
                    .registry
                    .unsubscribe(self.client_id, &event_types, wildcard);
                self.send(
                    ServerMessage::SubscriptionConfirmed {
                        event_types: Some(payload.event_types.clone()),
                        aggregate_id: None,
                    },
                    correlation_id,
                );
            }
            Err(err) => self.send(
                ServerMessage::Error {
                    code: err.code(),
                    message: err.to_string(),
                },
                correlation_id,
            ),
        }
    }

    fn handle_subscribe_aggregate(&self, payload: &AggregatePayload, correlation_id: Option<Uuid>) {
        self.state
            .registry
            .subscribe_aggregate(self.client_id, payload.aggregate_id);
        self.send(
            ServerMessage::SubscriptionConfirmed {
                event_types: None,
                aggregate_id: Some(payload.aggregate_id),
            },
            correlation_id,
        );
        // Immediately follow with the current state so the subscriber does
        // not have to race the next event for a baseline.
        let snapshot = self.state.projections.generation(payload.aggregate_id);
        match serde_json::to_value(snapshot) {
            Ok(result) => self.send(ServerMessage::QueryResult { result }, correlation_id),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize projection snapshot");
                self.send(
                    ServerMessage::Error {
                        code: "INTERNAL_ERROR",
                        message: "failed to serialize snapshot".to_owned(),
                    },
                    correlation_id,
                );
            }
        }
    }

    async fn handle_command(
        &self,
        payload: CommandExecutePayload,
        user_id: Uuid,
        correlation_id: Option<Uuid>,
    ) {
        let command = GenerationCommand {
            aggregate_id: payload.aggregate_id,
            expected_version: payload.expected_version,
            metadata: CommandMetadata {
                correlation_id: correlation_id.unwrap_or_else(Uuid::new_v4),
                user_id: Some(user_id),
            },
            kind: payload.command,
        };

        match self.state.command_bus.dispatch(command).await {
            Ok(outcome) => self.send(
                ServerMessage::CommandAccepted {
                    aggregate_id: outcome.aggregate_id,
                    version: outcome.version,
                },
                correlation_id,
            ),
            Err(err) => {
                if matches!(err, DomainError::Infrastructure(_)) {
                    tracing::error!(
                        aggregate_id = %payload.aggregate_id,
                        error = %err,
                        "command failed on storage"
                    );
                }
                self.send(
                    ServerMessage::CommandRejected {
                        code: err.code(),
                        message: err.to_string(),
                    },
                    correlation_id,
                );
            }
        }
    }

    async fn run_query(&self, kind: GenerationQueryKind, correlation_id: Option<Uuid>) {
        let query = GenerationQuery {
            correlation_id: correlation_id.unwrap_or_else(Uuid::new_v4),
            kind,
        };
        match self.state.query_bus.execute(query).await {
            Ok(outcome) => match serde_json::to_value(&outcome) {
                Ok(result) => self.send(ServerMessage::QueryResult { result }, correlation_id),
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize query result");
                    self.send(
                        ServerMessage::Error {
                            code: "INTERNAL_ERROR",
                            message: "failed to serialize query result".to_owned(),
                        },
                        correlation_id,
                    );
                }
            },
            Err(err) => self.send(
                ServerMessage::QueryError {
                    code: err.code(),
                    message: err.to_string(),
                },
                correlation_id,
            ),
        }
    }
}

/// Parses subscription topics; `"*"` anywhere in the list means wildcard.
fn parse_event_types(names: &[String]) -> Result<(Vec<GenerationEventType>, bool), DomainError> {
    let mut event_types = Vec::new();
    let mut wildcard = false;
    for name in names {
        if name == "*" {
            wildcard = true;
        } else {
            event_types.push(name.parse()?);
        }
    }
    Ok((event_types, wildcard))
}
