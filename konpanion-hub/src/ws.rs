//! Live-viewer transport: `/ws/telemetry`.
//!
//! Requires a valid session cookie. Each connection registers a
//! [`ViewerHandle`] with the broadcast hub; a writer task drains the handle's
//! queue into the socket. Text frames from the client (keepalive `"ping"`)
//! are read and ignored. On close the handle is unregistered.

use crate::auth::require_principal;
use crate::broadcast::ViewerHandle;
use crate::error::HubError;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

pub async fn telemetry_ws(
    State(app): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, HubError> {
    let user = require_principal(&app.sessions, &headers)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app, user)))
}

async fn handle_socket(socket: WebSocket, app: AppState, user: String) {
    let (mut sender, mut receiver) = socket.split();
    let (viewer, mut queue) = ViewerHandle::channel(app.cfg.viewers.queue);
    let viewer_id = viewer.id();
    app.broadcast.add(viewer);
    tracing::debug!(viewer = %viewer_id, user = %user, "live viewer attached");

    // la file se ferme quand cette tâche s'arrête : le hub verra l'échec de livraison
    let writer = tokio::spawn(async move {
        while let Some(msg) = queue.recv().await {
            if sender.send(Message::Text(msg.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(Message::Text(text)) => tracing::trace!(viewer = %viewer_id, len = text.as_str().len(), "viewer keepalive"),
            Ok(_) => {}
        }
    }

    writer.abort();
    app.broadcast.remove(&viewer_id);
}
