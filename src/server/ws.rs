//! WebSocket progress stream. Clients join and leave per-scan rooms:
//!
//! ```json
//! { "event": "join-scan", "scanId": "..." }
//! { "event": "leave-scan", "scanId": "..." }
//! ```
//!
//! The server pushes `scan-progress` / `scan-error` events for joined rooms,
//! starting with the cached latest event so late joiners are not blind.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{StreamExt, StreamMap};

use crate::models::ProgressEvent;
use crate::AppState;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event")]
enum ClientMessage {
    #[serde(rename = "join-scan")]
    #[serde(rename_all = "camelCase")]
    JoinScan { scan_id: String },
    #[serde(rename = "leave-scan")]
    #[serde(rename_all = "camelCase")]
    LeaveScan { scan_id: String },
}

pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rooms: StreamMap<String, BroadcastStream<ProgressEvent>> = StreamMap::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::JoinScan { scan_id }) => {
                                let (latest, rx) = state.bus.subscribe(&scan_id);
                                if let Some(event) = latest {
                                    if send_event(&mut socket, &event).await.is_err() {
                                        break;
                                    }
                                }
                                rooms.insert(scan_id, BroadcastStream::new(rx));
                            }
                            Ok(ClientMessage::LeaveScan { scan_id }) => {
                                rooms.remove(&scan_id);
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "ignoring unrecognized ws message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "ws receive error");
                        break;
                    }
                }
            }
            Some((scan_id, event)) = rooms.next(), if !rooms.is_empty() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::debug!(scan_id = %scan_id, skipped, "subscriber lagged");
                    }
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ProgressEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize progress event");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}
