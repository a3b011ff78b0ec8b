// =============================================================================
// WebSocket Handler - push-based state and event feed
// =============================================================================
//
// Clients connect to `/api/v1/ws?token=<token>` and receive:
//   1. An immediate `snapshot` message on connect.
//   2. A fresh `snapshot` every 500 ms whenever state_version has changed.
//   3. Every engine event as it happens, as an `event` message.
//
// Ping frames are answered with Pong; any text frame is treated as a
// heartbeat and ignored.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::app_state::{AppState, StateSnapshot};
use crate::events::EngineEvent;
use crate::types::now_ms;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Outbound frame envelope.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WsFrame<'a> {
    Snapshot(&'a StateSnapshot),
    Event(&'a EngineEvent),
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&state, &token) {
        warn!("WebSocket connection rejected: invalid token");
        return (axum::http::StatusCode::FORBIDDEN, "Invalid or missing token").into_response();
    }

    info!("WebSocket connection accepted - upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

// =============================================================================
// Connection handler
// =============================================================================

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();

    if let Err(e) = send_snapshot(&mut sender, &state).await {
        warn!(error = %e, "Failed to send initial WebSocket snapshot");
        return;
    }
    let mut last_sent_version = state.current_state_version();
    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            // ── Snapshot push on version change ─────────────────────────
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    if let Err(e) = send_snapshot(&mut sender, &state).await {
                        debug!(error = %e, "WebSocket send failed - disconnecting");
                        break;
                    }
                    last_sent_version = current_version;
                }
            }

            // ── Engine events ───────────────────────────────────────────
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Err(e) = send_frame(&mut sender, &state, &WsFrame::Event(&event)).await {
                            debug!(error = %e, "WebSocket send failed - disconnecting");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            // ── Incoming frames ─────────────────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong - disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error - disconnecting");
                        break;
                    }
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

// =============================================================================
// Helpers
// =============================================================================

async fn send_snapshot<S>(sender: &mut S, state: &Arc<AppState>) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let snapshot = state.build_snapshot(now_ms());
    send_frame(sender, state, &WsFrame::Snapshot(&snapshot)).await
}

async fn send_frame<S>(sender: &mut S, state: &Arc<AppState>, frame: &WsFrame<'_>) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            let seq = state
                .ws_sequence_number
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            debug!(seq, "WebSocket frame sent");
            Ok(())
        }
        Err(e) => {
            // Serialisation errors are not network errors; don't disconnect.
            warn!(error = %e, "Failed to serialize WebSocket frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged() {
        let event = EngineEvent::LearningReset;
        let json = serde_json::to_value(WsFrame::Event(&event)).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["data"]["type"], "learning_reset");
    }
}
