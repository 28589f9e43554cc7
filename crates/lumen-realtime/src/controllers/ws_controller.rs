//! WebSocket endpoint for realtime job updates.

use crate::gateway::{extract_credential, Gateway, Session};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use lumen_core::OwnerId;
use std::sync::Arc;
use tracing::{debug, trace};

/// Creates the realtime router, serving upgrades at `path`.
pub fn router(path: &str) -> Router<AppState> {
    Router::new().route(path, get(ws_handler))
}

/// Authenticates, then upgrades the connection.
///
/// A bad or missing credential is answered with `401` and a JSON body; the
/// socket is never opened.
pub async fn ws_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let credential = extract_credential(&uri, &headers, &state.token_cookie);
    let owner = match state.gateway.authenticate(credential.as_deref()) {
        Ok(owner) => owner,
        Err(e) => return e.into_response(),
    };

    let Some(ws) = ws else {
        return (StatusCode::UPGRADE_REQUIRED, "WebSocket upgrade required").into_response();
    };

    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, owner))
}

/// Drives one joined session until either side closes.
async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>, owner: OwnerId) {
    let Session {
        id,
        owner_id,
        mut outbound,
    } = gateway.join(owner).await;

    let (mut sink, mut stream) = socket.split();

    let sender_id = id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                debug!(session_id = %sender_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            next = stream.next() => match next {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => trace!(session_id = %id, "Pong received"),
                // Clients only listen; anything they send is ignored.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session_id = %id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    }

    gateway.leave(&owner_id, &id).await;
    send_task.abort();
}
