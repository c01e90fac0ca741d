//! Session WebSocket protocol definitions

use daad_bridge::{RunOutcome, StreamKind, Termination};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message from the UI shell
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Run a script; `content` is saved to `path` first when present
    Run {
        path: String,
        content: Option<String>,
    },
    /// Send text to the running script's stdin
    Stdin { data: String },
    /// Close the running script's stdin
    EndStdin,
    /// Kill the running script
    Cancel,
    /// List a directory
    ListDirectory {
        path: String,
        request_id: Option<String>,
    },
    /// Walk the project tree
    Tree {
        path: String,
        max_depth: Option<usize>,
        request_id: Option<String>,
    },
    /// Read a file
    ReadFile {
        path: String,
        request_id: Option<String>,
    },
    /// Save a file
    WriteFile {
        path: String,
        content: String,
        request_id: Option<String>,
    },
    /// Create an empty file
    CreateFile {
        path: String,
        request_id: Option<String>,
    },
    /// Delete a file or directory
    DeletePath {
        path: String,
        request_id: Option<String>,
    },
    /// Rename a file or directory
    RenamePath {
        from: String,
        to: String,
        request_id: Option<String>,
    },
    /// Ping for keepalive
    Ping,
}

/// Message to the UI shell
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected { session_id: Uuid },
    /// Interpreter spawned
    RunStarted { run_id: Uuid, path: String },
    /// Chunk of interpreter output
    Output {
        run_id: Uuid,
        stream: StreamKind,
        data: String,
    },
    /// Interpreter exited, was cancelled or timed out
    RunFinished {
        run_id: Uuid,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        termination: Termination,
        duration_ms: u64,
    },
    /// Run could not start, or supervision failed
    RunFailed {
        run_id: Option<Uuid>,
        message: String,
        code: String,
    },
    /// Result of `stdin` / `end_stdin`
    StdinResult { accepted: bool },
    /// Result of `cancel`
    CancelResult { cancelled: bool },
    /// Successful file operation
    FileResult {
        request_id: Option<String>,
        result: serde_json::Value,
    },
    /// Error message
    Error {
        message: String,
        code: Option<String>,
        request_id: Option<String>,
    },
    /// Pong response
    Pong,
}

impl From<RunOutcome> for ServerMessage {
    fn from(outcome: RunOutcome) -> Self {
        Self::RunFinished {
            run_id: outcome.run_id,
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            termination: outcome.termination,
            duration_ms: outcome.duration_ms,
        }
    }
}
