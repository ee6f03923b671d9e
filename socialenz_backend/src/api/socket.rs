use super::session::AuthUser;
use super::AppState;
use crate::realtime::RealtimeEvent;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    JoinRoom { user_id: String },
}

pub(crate) async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state, user))
}

async fn run_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    let mut events = state.hub.join(&user.id);
    let (mut outbound, mut inbound) = socket.split();
    tracing::debug!(user_id = %user.id, "socket connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut outbound, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user.id, skipped, "socket lagged behind room");
                }
                Err(RecvError::Closed) => break,
            },
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_frame(&user, &text);
                    if outbound.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(user_id = %user.id, error = %err, "socket read failed");
                    break;
                }
            },
        }
    }
    tracing::debug!(user_id = %user.id, "socket disconnected");
}

async fn send_event<S>(outbound: &mut S, event: &RealtimeEvent) -> Result<(), ()>
where
    S: futures_util::Sink<Message> + Unpin,
{
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode realtime event");
            return Ok(());
        }
    };
    outbound.send(Message::Text(payload)).await.map_err(|_| ())
}

/// Sockets are already joined to the caller's room. Joining any other room is refused.
fn handle_frame(user: &AuthUser, text: &str) -> serde_json::Value {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::JoinRoom { user_id }) if user_id == user.id => {
            json!({ "event": "joined", "data": { "userId": user_id } })
        }
        Ok(ClientFrame::JoinRoom { .. }) => {
            json!({ "event": "error", "data": { "message": "Cannot join another user's room" } })
        }
        Err(_) => json!({ "event": "error", "data": { "message": "Unrecognized frame" } }),
    }
}
