//! Per-run stdin writer
//!
//! The child's stdin pipe is owned by one task. Callers enqueue writes and
//! wait at most [`STDIN_ACK_WAIT`] for the result, so a child that stops
//! reading never stalls the caller.

use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Upper bound on how long `write_stdin` waits for the pipe.
///
/// A write still pending after this is left queued and reported as accepted.
pub(crate) const STDIN_ACK_WAIT: Duration = Duration::from_millis(100);

pub(crate) struct StdinWrite {
    data: Vec<u8>,
    ack: oneshot::Sender<bool>,
}

/// Queue into the writer task. Dropping every sender closes the pipe.
#[derive(Clone)]
pub(crate) struct StdinSender {
    tx: mpsc::UnboundedSender<StdinWrite>,
}

impl StdinSender {
    /// `false` once the pipe failed and the writer stopped
    pub(crate) fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Enqueue `data` and wait briefly for the outcome.
    ///
    /// Returns `false` if the writer is gone or the write failed within the
    /// wait; a write that is still blocked counts as accepted.
    pub(crate) async fn write(&self, data: Vec<u8>) -> bool {
        let (ack, result) = oneshot::channel();
        if self.tx.send(StdinWrite { data, ack }).is_err() {
            return false;
        }
        match tokio::time::timeout(STDIN_ACK_WAIT, result).await {
            Ok(Ok(written)) => written,
            // Writer stopped before handling it
            Ok(Err(_)) => false,
            Err(_) => true,
        }
    }
}

/// Move `pipe` into its own task.
///
/// The task ends when all senders are dropped (stdin EOF), a write fails,
/// or `done` fires at the end of the run.
pub(crate) fn spawn_writer(mut pipe: ChildStdin, run_id: Uuid, done: CancellationToken) -> StdinSender {
    let (tx, mut rx) = mpsc::unbounded_channel::<StdinWrite>();

    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                next = rx.recv() => next,
                _ = done.cancelled() => break,
            };

            let Some(StdinWrite { data, ack }) = next else {
                if let Err(e) = pipe.shutdown().await {
                    debug!(run_id = %run_id, error = %e, "Stdin shutdown failed");
                }
                debug!(run_id = %run_id, "Stdin closed");
                break;
            };

            let written: std::io::Result<()> = tokio::select! {
                written = async {
                    pipe.write_all(&data).await?;
                    pipe.flush().await
                } => written,
                _ = done.cancelled() => break,
            };

            match written {
                Ok(()) => {
                    let _ = ack.send(true);
                }
                Err(e) => {
                    debug!(run_id = %run_id, error = %e, "Stdin write failed, closing pipe");
                    let _ = ack.send(false);
                    rx.close();
                    break;
                }
            }
        }
    });

    StdinSender { tx }
}
