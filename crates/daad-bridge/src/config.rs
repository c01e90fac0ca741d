//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interpreter executable invoked when none is configured
pub const DEFAULT_INTERPRETER: &str = "daad";

/// Per-stream output ceiling (10 MiB)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// Size of a single pipe read
pub const DEFAULT_READ_CHUNK_BYTES: usize = 8 * 1024;

/// How long the output pumps may keep draining after the child was killed
pub(crate) const KILL_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// What to do when a session asks for a run while one is still live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Refuse the new run with `Error::AlreadyRunning`
    #[default]
    Reject,
    /// Cancel the live run and start the new one
    Replace,
}

/// Configuration for the process bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Interpreter executable (looked up on `PATH` when not absolute)
    pub interpreter: String,
    /// Maximum buffered bytes per stream before the run is aborted
    pub max_buffer_bytes: usize,
    /// Wall-clock limit per run in seconds (0 = no limit)
    pub run_timeout_secs: u64,
    /// Policy for a second run on a busy session
    pub concurrent_runs: RunPolicy,
    /// Bytes requested per pipe read
    pub read_chunk_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            run_timeout_secs: 0,
            concurrent_runs: RunPolicy::default(),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }
}

impl BridgeConfig {
    /// Use a different interpreter executable
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Run timeout, if one is configured
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.read_chunk_bytes.max(1)
    }
}
