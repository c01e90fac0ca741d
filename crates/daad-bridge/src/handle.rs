//! Run handles and outcomes

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::registry::{RunState, SessionId};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Process exited on its own
    Exited,
    /// Killed through `cancel_run` or a replacing run
    Cancelled,
    /// Killed after the configured run timeout
    TimedOut,
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Run identifier
    pub run_id: Uuid,
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Complete stdout transcript
    pub stdout: String,
    /// Complete stderr transcript
    pub stderr: String,
    /// How the run ended
    pub termination: Termination,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl RunOutcome {
    /// Exited on its own with code 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.exit_code == Some(0)
    }
}

/// Handle to a spawned run.
///
/// Dropping the handle does not stop the run; it only discards the outcome.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    session_id: SessionId,
    script_path: PathBuf,
    working_dir: PathBuf,
    state: watch::Receiver<RunState>,
    outcome: oneshot::Receiver<Result<RunOutcome>>,
}

impl RunHandle {
    pub(crate) fn new(
        run_id: Uuid,
        session_id: SessionId,
        script_path: PathBuf,
        working_dir: PathBuf,
        state: watch::Receiver<RunState>,
        outcome: oneshot::Receiver<Result<RunOutcome>>,
    ) -> Self {
        Self {
            run_id,
            session_id,
            script_path,
            working_dir,
            state,
            outcome,
        }
    }

    /// Run identifier, also carried by every output event
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Session that owns the run
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Absolute script path
    #[must_use]
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Interpreter working directory
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Current lifecycle state.
    ///
    /// Turns `Completed` or `Failed` after the run was deregistered and
    /// before [`wait`](Self::wait) resolves.
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Wait for the run to finish.
    ///
    /// By the time this resolves the run is no longer registered.
    pub async fn wait(self) -> Result<RunOutcome> {
        self.outcome
            .await
            .map_err(|_| Error::Execution("run supervisor stopped before reporting".to_string()))?
    }
}
