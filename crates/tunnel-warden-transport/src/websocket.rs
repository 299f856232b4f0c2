//! WebSocket transport for supervisor observers.

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
use tunnel_warden_supervisor::SupervisorHandle;

use crate::{
    dispatch::dispatch,
    protocol::{ClientMessage, ServerMessage},
};

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(handle): State<SupervisorHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, handle))
}

async fn handle_socket(socket: WebSocket, handle: SupervisorHandle) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Subscribe before reading commands so their status events are not missed
    let mut events = handle.bus().subscribe_stream();
    let event_tx = tx.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event_tx.send(ServerMessage::from(event)).is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                let _ = tx.send(ServerMessage::error(format!("Invalid message: {e}")));
                continue;
            }
        };

        if let Some(reply) = dispatch(&handle, client_msg).await {
            let _ = tx.send(reply);
        }
    }

    event_task.abort();
    send_task.abort();
    tracing::debug!("WebSocket observer disconnected");
}

/// Create WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(handle));
/// ```
#[must_use]
pub fn create_ws_router(handle: SupervisorHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(handle)
}
