//! Error types for daad-files

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// File store operation, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    /// Directory listing
    ReadDirectory,
    /// Reading file contents
    ReadFile,
    /// Writing file contents
    WriteFile,
    /// Creating an empty file
    CreateFile,
    /// Deleting a file or directory
    Delete,
    /// Renaming a file or directory
    Rename,
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::ReadDirectory => "read directory",
            Self::ReadFile => "read file",
            Self::WriteFile => "write file",
            Self::CreateFile => "create file",
            Self::Delete => "delete",
            Self::Rename => "rename",
        };
        f.write_str(op)
    }
}

/// File store error type
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem call failed
    #[error("failed to {op} '{}': {source}", .path.display())]
    Io {
        /// Failing operation
        op: FileOp,
        /// Path the operation was applied to
        path: PathBuf,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Path escapes the configured workspace root
    #[error("path '{}' is outside the workspace", .0.display())]
    OutsideWorkspace(PathBuf),
}

impl Error {
    pub(crate) fn io(op: FileOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for transports
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => "NOT_FOUND",
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists => {
                "ALREADY_EXISTS"
            }
            Self::Io { .. } => "FILE_ERROR",
            Self::OutsideWorkspace(_) => "OUTSIDE_WORKSPACE",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
