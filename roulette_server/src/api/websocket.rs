//! WebSocket handler for live round and balance events.
//!
//! Clients exchange `{channel, event, data}` JSON frames. Sending a frame on
//! a channel the connection has not joined yet subscribes it first; the
//! frame is then fanned out to every subscriber of that channel, sender
//! included. Frames the server publishes itself (round start, winner,
//! close, balance movements) use the same shape.
//!
//! # Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws');
//!
//! ws.onopen = () => ws.send(JSON.stringify({
//!   channel: "roulette", event: "join", data: {}
//! }));
//!
//! ws.onmessage = (event) => {
//!   const frame = JSON.parse(event.data);
//!   if (frame.event === "winner") showWinner(frame.data.color, frame.data.number);
//! };
//! ```

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use roulette::hub::{Frame, HubHandle, Subscriber};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use super::AppState;
use crate::metrics;

/// Live WebSocket connections of one server instance
#[derive(Debug, Default)]
pub struct ConnectionGauge {
    active: AtomicU64,
}

impl ConnectionGauge {
    /// Currently open connections
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    fn opened(&self) -> u64 {
        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::websocket_connections_total();
        metrics::websocket_connections_active(active);
        active
    }

    fn closed(&self) -> u64 {
        let active = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::websocket_connections_active(active);
        active
    }
}

/// Replies addressed to a single connection
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerResponse {
    Error { message: String },
}

/// Upgrade HTTP connection to WebSocket.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection until the client leaves or the hub stops.
///
/// A send task forwards hub frames and direct replies to the socket while
/// this task reads client frames. On exit the connection is removed from
/// every channel.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (subscriber, mut frames) = state.hub.register(state.ws_buffer);
    let connection_id = subscriber.id;

    let active = state.ws_connections.opened();
    info!(
        "WebSocket connected: connection={} active={}",
        connection_id, active
    );

    let (response_tx, mut response_rx) = tokio::sync::mpsc::channel::<String>(8);

    let send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(payload) = frames.recv() => payload.to_string(),
                Some(reply) = response_rx.recv() => reply,
                else => break,
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashSet<String> = HashSet::new();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame = match parse_frame(&text) {
                    Ok(frame) => frame,
                    Err(reason) => {
                        warn!(
                            "Rejected frame from connection {}: {}",
                            connection_id, reason
                        );
                        let reply = ServerResponse::Error { message: reason };
                        if let Ok(json) = serde_json::to_string(&reply)
                            && response_tx.send(json).await.is_err()
                        {
                            break;
                        }
                        continue;
                    }
                };

                if let Err(e) = relay(&state.hub, &subscriber, &mut joined, &frame).await {
                    error!("Hub unavailable for connection {}: {}", connection_id, e);
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket closed: connection={}", connection_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error on connection {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    if let Err(e) = state.hub.unsubscribe(connection_id).await {
        warn!("Failed to unsubscribe connection {}: {}", connection_id, e);
    }

    let active = state.ws_connections.closed();
    info!(
        "WebSocket disconnected: connection={} active={}",
        connection_id, active
    );
}

fn parse_frame(text: &str) -> Result<Frame, String> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| format!("Invalid message format: {e}"))?;
    if frame.channel.trim().is_empty() {
        return Err("Frame channel must not be empty".to_string());
    }
    Ok(frame)
}

/// Subscribe on first use of a channel, then fan the frame out
async fn relay(
    hub: &HubHandle,
    subscriber: &Subscriber,
    joined: &mut HashSet<String>,
    frame: &Frame,
) -> roulette::hub::HubResult<()> {
    if !joined.contains(&frame.channel) {
        hub.subscribe(subscriber, &frame.channel).await?;
        joined.insert(frame.channel.clone());
    }
    hub.publish(frame).await
}
