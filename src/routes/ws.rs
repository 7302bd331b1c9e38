use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::{models::WsEvent, state::AppState};

/// GET /ws
/// Push-only feed of discovery progress and download events, one JSON text
/// frame per [`WsEvent`].
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let feed = state.events.subscribe();
    ws.on_upgrade(move |socket| push_events(socket, feed))
}

async fn push_events(socket: WebSocket, mut feed: broadcast::Receiver<WsEvent>) {
    let (mut outgoing, mut incoming) = socket.split();

    let pusher = tokio::spawn(async move {
        loop {
            let event = match feed.recv().await {
                Ok(event) => event,
                // A slow client misses progress ticks; later events still arrive.
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event feed skipped {skipped} event(s) for a slow client");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Could not encode event: {e}");
                    continue;
                }
            };
            if outgoing.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Nothing is read from clients; drain until they hang up.
    while let Some(Ok(frame)) = incoming.next().await {
        if matches!(frame, Message::Close(_)) {
            break;
        }
    }

    pusher.abort();
}
