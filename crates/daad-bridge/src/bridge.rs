//! ProcessBridge - session-scoped interpreter runs
//!
//! Calls from the UI may arrive with stale session state (a "send" click
//! after the script already exited). Stdin and cancel operations therefore
//! report a boolean instead of failing; only `start_run` returns errors,
//! because a run that did not start is something the UI must show.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{BridgeConfig, RunPolicy};
use crate::error::{Error, Result};
use crate::event::{OutputRouter, OutputStream};
use crate::handle::RunHandle;
use crate::registry::{RunEntry, RunInfo, RunState, SessionId, SessionRegistry};
use crate::runner::{self, Supervision};
use crate::stdin;

/// Runs the interpreter for UI sessions and relays its I/O
#[derive(Clone)]
pub struct ProcessBridge {
    config: Arc<BridgeConfig>,
    registry: SessionRegistry,
    router: OutputRouter,
}

impl ProcessBridge {
    /// Create a bridge with its own empty registry
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            router: OutputRouter::new(),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Register the output channel for `session`.
    ///
    /// One channel per session; subscribing again replaces the old one.
    pub async fn subscribe(&self, session: &SessionId) -> OutputStream {
        self.router.subscribe(session).await
    }

    /// Drop the output channel for `session`
    pub async fn unsubscribe(&self, session: &SessionId) -> bool {
        self.router.unsubscribe(session).await
    }

    /// Spawn the interpreter on `script_path` for `session`.
    ///
    /// Returns once the process is running. Output is delivered to the
    /// session's channel; the final result comes from [`RunHandle::wait`].
    pub async fn start_run(&self, session: &SessionId, script_path: impl AsRef<Path>) -> Result<RunHandle> {
        let script_path = resolve_script(script_path.as_ref()).await?;
        let working_dir = script_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut runs = self.registry.lock().await;

        if self.config.concurrent_runs == RunPolicy::Reject {
            if let Some(live) = runs.get(session) {
                debug!(session_id = %session, run_id = %live.info.run_id, "Rejecting run, session busy");
                return Err(Error::AlreadyRunning(session.clone()));
            }
        }

        let mut child = runner::build_command(&self.config, &script_path, &working_dir)
            .spawn()
            .map_err(|source| {
                warn!(
                    session_id = %session,
                    interpreter = %self.config.interpreter,
                    error = %source,
                    "Failed to spawn interpreter"
                );
                Error::Spawn {
                    interpreter: self.config.interpreter.clone(),
                    source,
                }
            })?;

        let stdin = child.stdin.take();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            return Err(Error::Execution("interpreter pipes unavailable".to_string()));
        };

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let stdin = stdin.map(|pipe| stdin::spawn_writer(pipe, run_id, done.clone()));
        let (state_tx, state_rx) = watch::channel(RunState::Running);

        // Replace: the predecessor is only cancelled once its successor is alive
        if let Some(live) = runs.get(session) {
            info!(session_id = %session, run_id = %live.info.run_id, "Cancelling live run for replacement");
            live.cancel.cancel();
        }

        runs.insert(
            session.clone(),
            RunEntry {
                info: RunInfo {
                    run_id,
                    session_id: session.clone(),
                    script_path: script_path.clone(),
                    working_dir: working_dir.clone(),
                    started_at: Utc::now(),
                    state: RunState::Running,
                },
                stdin,
                cancel: cancel.clone(),
            },
        );
        drop(runs);

        info!(
            session_id = %session,
            run_id = %run_id,
            path = %script_path.display(),
            "Started script run"
        );

        let supervision = Supervision {
            run_id,
            session_id: session.clone(),
            child,
            stdout,
            stderr,
            cancel,
            timeout: self.config.run_timeout(),
            max_buffer_bytes: self.config.max_buffer_bytes,
            chunk_size: self.config.chunk_size(),
            router: self.router.clone(),
        };

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let registry = self.registry.clone();
        let owner = session.clone();
        tokio::spawn(async move {
            let result = supervision.run().await;
            done.cancel();

            // Deregister before reporting so waiters observe an idle session
            if registry.remove_run(&owner, run_id).await.is_some() {
                debug!(session_id = %owner, run_id = %run_id, "Run deregistered");
            }
            state_tx.send_replace(match &result {
                Ok(_) => RunState::Completed,
                Err(_) => RunState::Failed,
            });

            match &result {
                Ok(outcome) => info!(
                    session_id = %owner,
                    run_id = %run_id,
                    exit_code = ?outcome.exit_code,
                    termination = ?outcome.termination,
                    duration_ms = outcome.duration_ms,
                    "Script run finished"
                ),
                Err(e) => warn!(session_id = %owner, run_id = %run_id, error = %e, "Script run failed"),
            }

            let _ = outcome_tx.send(result);
        });

        Ok(RunHandle::new(
            run_id,
            session.clone(),
            script_path,
            working_dir,
            state_rx,
            outcome_rx,
        ))
    }

    /// Write `data` verbatim to the live run's stdin.
    ///
    /// Returns `false` when nothing is running, stdin is closed, or the
    /// write fails. A failed write closes the pipe. Never waits for the
    /// child to read: a write the pipe cannot take yet stays queued and
    /// counts as accepted.
    pub async fn write_stdin(&self, session: &SessionId, data: impl AsRef<[u8]>) -> bool {
        let Some(stdin) = self.registry.stdin(session).await else {
            debug!(session_id = %session, "Stdin write ignored, no live run or pipe closed");
            return false;
        };

        let accepted = stdin.write(data.as_ref().to_vec()).await;
        if !accepted {
            debug!(session_id = %session, "Stdin write rejected, pipe closed");
        }
        accepted
    }

    /// Close the live run's stdin (end-of-stream)
    pub async fn end_stdin(&self, session: &SessionId) -> bool {
        match self.registry.take_stdin(session).await {
            // Dropping the last sender lets the writer shut the pipe
            Some(stdin) => stdin.is_open(),
            None => false,
        }
    }

    /// Kill the live run; its handle resolves as cancelled
    pub async fn cancel_run(&self, session: &SessionId) -> bool {
        let cancelled = self.registry.cancel(session).await;
        if cancelled {
            info!(session_id = %session, "Cancel requested");
        }
        cancelled
    }

    /// Tear down everything a closing transport connection owns
    pub async fn close_session(&self, session: &SessionId) {
        self.router.unsubscribe(session).await;
        if self.registry.cancel(session).await {
            info!(session_id = %session, "Cancelled run of closed session");
        }
    }

    /// Snapshot of the session's live run
    pub async fn active_run(&self, session: &SessionId) -> Option<RunInfo> {
        self.registry.get(session).await
    }

    /// Snapshots of all live runs, oldest first
    pub async fn active_runs(&self) -> Vec<RunInfo> {
        self.registry.all().await
    }

    /// Number of live runs
    pub async fn active_run_count(&self) -> usize {
        self.registry.len().await
    }
}

/// Absolute path of an existing regular file
async fn resolve_script(path: &Path) -> Result<PathBuf> {
    let resolved = tokio::fs::canonicalize(path)
        .await
        .map_err(|_| Error::ScriptNotFound(path.to_path_buf()))?;
    let metadata = tokio::fs::metadata(&resolved)
        .await
        .map_err(|_| Error::ScriptNotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(Error::ScriptNotFound(path.to_path_buf()));
    }
    Ok(resolved)
}
