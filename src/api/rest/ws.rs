use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::AppError;
use crate::realtime::relay::{relay_chat, track_provider};
use crate::realtime::{ClientMessage, SessionId};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (session_id, rx) = state.bus.connect();
    let mut events = ReceiverStream::new(rx);

    info!(session_id = %session_id, "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize bus event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(err) = handle_client_message(&recv_state, session_id, &text) {
                        warn!(session_id = %session_id, error = %err, "rejected client message");
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.bus.disconnect(&session_id);
    info!(session_id = %session_id, "websocket client disconnected");
}

fn handle_client_message(state: &AppState, session_id: SessionId, raw: &str) -> Result<(), AppError> {
    let message: ClientMessage = serde_json::from_str(raw)
        .map_err(|err| AppError::InvalidInput(format!("malformed client message: {err}")))?;

    match message {
        ClientMessage::Join { room } => state.bus.subscribe(&session_id, room)?,
        ClientMessage::Leave { room } => state.bus.unsubscribe(&session_id, &room),
        ClientMessage::Chat {
            request_id,
            sender_id,
            message,
        } => {
            relay_chat(state, request_id, sender_id, message);
        }
        ClientMessage::Location {
            request_id,
            provider_id,
            location,
        } => track_provider(state, request_id, provider_id, location),
    }

    Ok(())
}
