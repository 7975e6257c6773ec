//! Realtime channel: `GET /realtime` upgrades to a websocket and forwards
//! every broadcast event as one JSON frame `{event, payload}`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::services::RealtimeHub;
use crate::AppState;

pub async fn realtime_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state.hub.clone()))
}

async fn handle_connection(socket: WebSocket, hub: RealtimeHub) {
    let mut events = hub.subscribe();
    let (mut sink, mut stream) = socket.split();
    tracing::debug!(clients = hub.client_count(), "realtime client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(frame) = serde_json::to_string(&event) else { continue };
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow consumer; it must resync from the REST surface.
                    tracing::warn!(skipped, "realtime client lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients only listen on this channel; ignore their frames.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("realtime client disconnected");
}
