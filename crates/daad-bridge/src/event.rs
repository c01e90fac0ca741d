//! Output events and per-session routing
//!
//! Every session registers at most one output channel. Registering again
//! replaces the previous channel, so a UI that re-subscribes on each run
//! never receives the same chunk twice.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::registry::SessionId;

/// Child process stream an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl StreamKind {
    /// Lowercase stream name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chunk of interpreter output.
///
/// Chunks follow pipe reads, not lines: a payload may end mid-line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputEvent {
    /// Run that produced the chunk
    pub run_id: Uuid,
    /// Originating stream
    pub kind: StreamKind,
    /// Decoded text
    pub payload: String,
}

/// Receiving end of a session's output channel
pub type OutputStream = mpsc::UnboundedReceiver<OutputEvent>;

/// Routes output events to the channel registered for each session
#[derive(Debug, Clone, Default)]
pub struct OutputRouter {
    subscribers: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<OutputEvent>>>>,
}

impl OutputRouter {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the output channel for `session`, replacing any earlier one.
    pub async fn subscribe(&self, session: &SessionId) -> OutputStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.subscribers.write().await.insert(session.clone(), tx);
        if previous.is_some() {
            debug!(session_id = %session, "Replaced existing output subscriber");
        }
        rx
    }

    /// Drop the output channel for `session`. Returns whether one existed.
    pub async fn unsubscribe(&self, session: &SessionId) -> bool {
        self.subscribers.write().await.remove(session).is_some()
    }

    /// Deliver `event` to the session's channel.
    ///
    /// Returns `false` when nobody is listening; the event is dropped.
    pub async fn emit(&self, session: &SessionId, event: OutputEvent) -> bool {
        let subscribers = self.subscribers.read().await;
        match subscribers.get(session) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                trace!(session_id = %session, "No subscriber for output event");
                false
            }
        }
    }

    /// Number of sessions with a registered channel
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(payload: &str) -> OutputEvent {
        OutputEvent {
            run_id: Uuid::nil(),
            kind: StreamKind::Stdout,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscriber_is_dropped() {
        let router = OutputRouter::new();
        assert!(!router.emit(&SessionId::from("w1"), event("x")).await);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_channel() {
        let router = OutputRouter::new();
        let session = SessionId::from("w1");

        let mut first = router.subscribe(&session).await;
        let mut second = router.subscribe(&session).await;
        assert_eq!(router.subscriber_count().await, 1);

        assert!(router.emit(&session, event("once")).await);
        assert_eq!(second.recv().await.map(|e| e.payload), Some("once".to_string()));
        // The replaced channel is closed, not duplicated
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_stream() {
        let router = OutputRouter::new();
        let session = SessionId::from("w1");
        let mut rx = router.subscribe(&session).await;

        assert!(router.unsubscribe(&session).await);
        assert!(!router.unsubscribe(&session).await);
        assert!(rx.recv().await.is_none());
        assert!(!router.emit(&session, event("late")).await);
    }

    #[test]
    fn test_stream_kind_serialization() {
        assert_eq!(serde_json::to_string(&StreamKind::Stderr).ok().as_deref(), Some("\"stderr\""));
        assert_eq!(StreamKind::Stdout.to_string(), "stdout");
    }
}
