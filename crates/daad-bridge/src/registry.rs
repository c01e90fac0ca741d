//! Session registry - at most one live run per session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::stdin::StdinSender;

/// Opaque identifier of one UI connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a transport-supplied identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Process is alive or its output is still draining
    Running,
    /// Process exited, was cancelled or timed out
    Completed,
    /// Supervision failed (stream error, output limit)
    Failed,
}

/// Snapshot of a registered run
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    /// Run identifier
    pub run_id: Uuid,
    /// Owning session
    pub session_id: SessionId,
    /// Absolute path of the script being executed
    pub script_path: PathBuf,
    /// Directory the interpreter runs in
    pub working_dir: PathBuf,
    /// Spawn time
    pub started_at: DateTime<Utc>,
    /// Current state
    pub state: RunState,
}

pub(crate) struct RunEntry {
    pub info: RunInfo,
    /// `None` once `end_stdin` closed the pipe
    pub stdin: Option<StdinSender>,
    pub cancel: CancellationToken,
}

pub(crate) type RunMap = HashMap<SessionId, RunEntry>;

/// Session → live run map owned by one bridge
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    runs: Arc<Mutex<RunMap>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for check-then-insert sequences
    pub(crate) async fn lock(&self) -> MutexGuard<'_, RunMap> {
        self.runs.lock().await
    }

    pub(crate) async fn stdin(&self, session: &SessionId) -> Option<StdinSender> {
        self.runs.lock().await.get(session).and_then(|e| e.stdin.clone())
    }

    /// Detach the stdin queue so the writer sees end-of-input
    pub(crate) async fn take_stdin(&self, session: &SessionId) -> Option<StdinSender> {
        self.runs.lock().await.get_mut(session).and_then(|e| e.stdin.take())
    }

    /// Trigger cancellation of the session's live run, if any
    pub(crate) async fn cancel(&self, session: &SessionId) -> bool {
        match self.runs.lock().await.get(session) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the session's entry only if it still belongs to `run_id`.
    ///
    /// A replaced run must not evict its successor.
    pub(crate) async fn remove_run(&self, session: &SessionId, run_id: Uuid) -> Option<RunEntry> {
        let mut runs = self.runs.lock().await;
        if runs.get(session).is_some_and(|e| e.info.run_id == run_id) {
            runs.remove(session)
        } else {
            None
        }
    }

    pub(crate) async fn get(&self, session: &SessionId) -> Option<RunInfo> {
        self.runs.lock().await.get(session).map(|e| e.info.clone())
    }

    pub(crate) async fn all(&self) -> Vec<RunInfo> {
        let mut runs: Vec<RunInfo> = self
            .runs
            .lock()
            .await
            .values()
            .map(|e| e.info.clone())
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        runs
    }

    pub(crate) async fn len(&self) -> usize {
        self.runs.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(session: &SessionId, run_id: Uuid) -> RunEntry {
        RunEntry {
            info: RunInfo {
                run_id,
                session_id: session.clone(),
                script_path: PathBuf::from("/tmp/main.daad"),
                working_dir: PathBuf::from("/tmp"),
                started_at: Utc::now(),
                state: RunState::Running,
            },
            stdin: None,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_remove_run_ignores_stale_run_id() {
        let registry = SessionRegistry::new();
        let session = SessionId::from("w1");
        let current = Uuid::new_v4();
        registry.lock().await.insert(session.clone(), entry(&session, current));

        assert!(registry.remove_run(&session, Uuid::new_v4()).await.is_none());
        assert_eq!(registry.len().await, 1);

        let removed = registry.remove_run(&session, current).await;
        assert_eq!(removed.map(|e| e.info.run_id), Some(current));
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_triggers_token() {
        let registry = SessionRegistry::new();
        let session = SessionId::from("w1");
        let e = entry(&session, Uuid::new_v4());
        let token = e.cancel.clone();
        registry.lock().await.insert(session.clone(), e);

        assert!(registry.cancel(&session).await);
        assert!(token.is_cancelled());
        assert!(!registry.cancel(&SessionId::from("other")).await);
    }

    #[test]
    fn test_session_id_conversions() {
        let id = Uuid::new_v4();
        assert_eq!(SessionId::from(id).as_str(), id.to_string());
        assert_eq!(SessionId::from("w1").to_string(), "w1");
    }
}
