//! Session WebSocket connection loop

use axum::extract::ws::{Message, WebSocket};
use daad_bridge::{ProcessBridge, SessionId};
use daad_files::FileStore;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::handlers::handle_client_message;
use super::protocol::{ClientMessage, ServerMessage};

type WsSender = SplitSink<WebSocket, Message>;

/// Handle WebSocket connection
pub async fn handle_socket(socket: WebSocket, bridge: ProcessBridge, files: Arc<FileStore>) {
    let connection_id = Uuid::new_v4();
    let session_id = SessionId::from(connection_id);
    info!(session_id = %session_id, "WebSocket session established");

    let (mut sender, mut receiver) = socket.split();

    if !send(&mut sender, &ServerMessage::Connected { session_id: connection_id }).await {
        return;
    }

    // Registered once per connection; every run of this session reuses it
    let mut output = bridge.subscribe(&session_id).await;

    // Replies produced by spawned tasks (run completion)
    let (tx, mut internal_rx) = tokio::sync::mpsc::unbounded_channel::<ServerMessage>();

    loop {
        tokio::select! {
            // Output first: a run's chunks are queued before its completion
            biased;

            Some(event) = output.recv() => {
                let msg = ServerMessage::Output {
                    run_id: event.run_id,
                    stream: event.kind,
                    data: event.payload,
                };
                if !send(&mut sender, &msg).await {
                    break;
                }
            }
            Some(msg) = internal_rx.recv() => {
                if !send(&mut sender, &msg).await {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(session_id = %session_id, "Received message: {}", text);
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(client_msg, &session_id, &bridge, &files, &tx).await;
                            }
                            Err(e) => {
                                let error_msg = ServerMessage::Error {
                                    message: format!("Invalid message format: {}", e),
                                    code: Some("INVALID_MESSAGE".to_string()),
                                    request_id: None,
                                };
                                if !send(&mut sender, &error_msg).await {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "WebSocket session closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(session_id = %session_id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    bridge.close_session(&session_id).await;
}

async fn send(sender: &mut WsSender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            true
        }
    }
}
