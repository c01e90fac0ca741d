//! Session WebSocket message handlers

use daad_bridge::{ProcessBridge, SessionId};
use daad_files::{FileStore, DEFAULT_TREE_DEPTH};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::protocol::{ClientMessage, ServerMessage};

/// Channel back to the connection's writer
pub type Replies = mpsc::UnboundedSender<ServerMessage>;

/// Handle incoming client message
pub async fn handle_client_message(
    msg: ClientMessage,
    session_id: &SessionId,
    bridge: &ProcessBridge,
    files: &Arc<FileStore>,
    tx: &Replies,
) {
    match msg {
        ClientMessage::Run { path, content } => {
            handle_run(session_id, path, content, bridge, files, tx).await;
        }
        ClientMessage::Stdin { data } => {
            let accepted = bridge.write_stdin(session_id, data.as_bytes()).await;
            let _ = tx.send(ServerMessage::StdinResult { accepted });
        }
        ClientMessage::EndStdin => {
            let accepted = bridge.end_stdin(session_id).await;
            let _ = tx.send(ServerMessage::StdinResult { accepted });
        }
        ClientMessage::Cancel => {
            let cancelled = bridge.cancel_run(session_id).await;
            let _ = tx.send(ServerMessage::CancelResult { cancelled });
        }
        ClientMessage::ListDirectory { path, request_id } => {
            reply(tx, request_id, files.list_directory(&path).await);
        }
        ClientMessage::Tree {
            path,
            max_depth,
            request_id,
        } => {
            let depth = max_depth.unwrap_or(DEFAULT_TREE_DEPTH);
            reply(tx, request_id, files.tree(&path, depth).await);
        }
        ClientMessage::ReadFile { path, request_id } => {
            reply(tx, request_id, files.read_file(&path).await);
        }
        ClientMessage::WriteFile {
            path,
            content,
            request_id,
        } => {
            reply(tx, request_id, files.write_file(&path, &content).await);
        }
        ClientMessage::CreateFile { path, request_id } => {
            reply(tx, request_id, files.create_file(&path).await);
        }
        ClientMessage::DeletePath { path, request_id } => {
            reply(tx, request_id, files.delete_path(&path).await);
        }
        ClientMessage::RenamePath {
            from,
            to,
            request_id,
        } => {
            reply(tx, request_id, files.rename_path(&from, &to).await);
        }
        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong);
        }
    }
}

async fn handle_run(
    session_id: &SessionId,
    path: String,
    content: Option<String>,
    bridge: &ProcessBridge,
    files: &Arc<FileStore>,
    tx: &Replies,
) {
    // Save-before-run, like the editor's run button
    if let Some(content) = content {
        if let Err(e) = files.write_file(&path, &content).await {
            warn!(session_id = %session_id, error = %e, "Failed to save script before run");
            let _ = tx.send(ServerMessage::RunFailed {
                run_id: None,
                message: e.to_string(),
                code: e.code().to_string(),
            });
            return;
        }
    }

    let script = match files.resolve(&path) {
        Ok(script) => script,
        Err(e) => {
            let _ = tx.send(ServerMessage::RunFailed {
                run_id: None,
                message: e.to_string(),
                code: e.code().to_string(),
            });
            return;
        }
    };

    let handle = match bridge.start_run(session_id, &script).await {
        Ok(handle) => handle,
        Err(e) => {
            let _ = tx.send(ServerMessage::RunFailed {
                run_id: None,
                message: e.to_string(),
                code: e.code().to_string(),
            });
            return;
        }
    };

    let run_id = handle.run_id();
    let _ = tx.send(ServerMessage::RunStarted {
        run_id,
        path: handle.script_path().display().to_string(),
    });

    let tx = tx.clone();
    tokio::spawn(async move {
        let msg = match handle.wait().await {
            Ok(outcome) => ServerMessage::from(outcome),
            Err(e) => ServerMessage::RunFailed {
                run_id: Some(run_id),
                message: e.to_string(),
                code: e.code().to_string(),
            },
        };
        if tx.send(msg).is_err() {
            debug!(run_id = %run_id, "Session closed before run completion was delivered");
        }
    });
}

fn reply<T: Serialize>(tx: &Replies, request_id: Option<String>, result: daad_files::Result<T>) {
    let msg = match result.map(serde_json::to_value) {
        Ok(Ok(result)) => ServerMessage::FileResult { request_id, result },
        Ok(Err(e)) => ServerMessage::Error {
            message: format!("Failed to encode result: {}", e),
            code: Some("INTERNAL".to_string()),
            request_id,
        },
        Err(e) => ServerMessage::Error {
            message: e.to_string(),
            code: Some(e.code().to_string()),
            request_id,
        },
    };
    let _ = tx.send(msg);
}
