//! WebSocket upgrade endpoint.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Router, routing::any};

use crate::connection;
use crate::state::AppState;

/// GET /ws — upgrades to the event protocol.
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::serve(socket, state))
}

/// Returns the WebSocket router.
pub fn router() -> Router<AppState> {
    Router::new().route("/ws", any(ws_upgrade))
}
