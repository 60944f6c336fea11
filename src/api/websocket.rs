//! WebSocket handler for voice-chat connections
//!
//! Each accepted socket gets its own session manager run; the socket pump
//! here only adapts the axum socket to the relay's channel pair.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ApiState;
use crate::protocol::ServerMessage;
use crate::session::run_session;

/// Buffer size for the per-connection channel pair
const CHANNEL_BUFFER: usize = 32;

/// Build the WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one WebSocket connection for its whole lifetime
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let connection_id = Uuid::new_v4();
    tracing::info!(%connection_id, "client connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(CHANNEL_BUFFER);
    let (in_tx, in_rx) = mpsc::channel::<String>(CHANNEL_BUFFER);

    // Forward outbound messages onto the socket; ends when the relay drops
    // its sender, then closes the socket so the client sees a clean close.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to encode server frame"),
            }
        }
        let _ = sender.close().await;
    });

    // Feed inbound text frames to the relay; other frame types carry
    // nothing in this protocol.
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if in_tx.send(text.to_string()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    if let Err(e) = run_session(state.engine.as_ref(), &state.session, in_rx, out_tx).await {
        tracing::warn!(%connection_id, error = %e, "session ended with error");
    }

    recv_task.abort();
    // Let the forward task drain queued frames (the error frame on an
    // open-failure path must reach the client before the close).
    let _ = send_task.await;

    tracing::info!(%connection_id, "client disconnected");
}
