//! Error types for daad-bridge

use std::path::PathBuf;
use thiserror::Error;

use crate::event::StreamKind;
use crate::registry::SessionId;

/// Bridge error type
#[derive(Debug, Error)]
pub enum Error {
    /// Script path does not name an existing file
    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    /// Interpreter could not be launched
    #[error("failed to spawn '{interpreter}': {source}")]
    Spawn {
        /// Interpreter executable that was invoked
        interpreter: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Session already owns a live run
    #[error("session {0} already has a running script")]
    AlreadyRunning(SessionId),

    /// A stream produced more output than the configured ceiling
    #[error("{stream} exceeded the {limit} byte output limit")]
    OutputLimitExceeded {
        /// Stream that overflowed
        stream: StreamKind,
        /// Configured ceiling in bytes
        limit: usize,
    },

    /// Run supervision failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for transports
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ScriptNotFound(_) => "SCRIPT_NOT_FOUND",
            Self::Spawn { .. } => "SPAWN_FAILED",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::OutputLimitExceeded { .. } => "OUTPUT_LIMIT",
            Self::Execution(_) => "EXECUTION_FAILED",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
