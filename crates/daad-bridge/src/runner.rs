//! Interpreter spawn and run supervision

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{BridgeConfig, KILL_DRAIN_GRACE};
use crate::decode::Utf8Decoder;
use crate::error::{Error, Result};
use crate::event::{OutputEvent, OutputRouter, StreamKind};
use crate::handle::{RunOutcome, Termination};
use crate::registry::SessionId;

/// Far enough away to never fire
const NEVER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Build `<interpreter> <script>` with piped stdio, run from `working_dir`.
pub(crate) fn build_command(config: &BridgeConfig, script_path: &Path, working_dir: &Path) -> Command {
    let mut cmd = Command::new(&config.interpreter);
    cmd.arg(script_path)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Data forwarded from a pump to its supervisor
enum Chunk {
    Data {
        kind: StreamKind,
        text: String,
        bytes: usize,
    },
    Failed {
        kind: StreamKind,
        error: std::io::Error,
    },
}

/// Why the supervisor killed the child
enum Stop {
    Cancelled,
    TimedOut,
    Overflow(StreamKind),
    Failed(std::io::Error),
}

/// Everything one run's supervisor owns
pub(crate) struct Supervision {
    pub run_id: Uuid,
    pub session_id: SessionId,
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub cancel: CancellationToken,
    pub timeout: Option<Duration>,
    pub max_buffer_bytes: usize,
    pub chunk_size: usize,
    pub router: OutputRouter,
}

impl Supervision {
    /// Relay output until the child has exited and both pipes are drained.
    pub(crate) async fn run(self) -> Result<RunOutcome> {
        let Supervision {
            run_id,
            session_id,
            mut child,
            stdout,
            stderr,
            cancel,
            timeout,
            max_buffer_bytes,
            chunk_size,
            router,
        } = self;

        let started = Instant::now();
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Chunk>(64);
        let pumps: [JoinHandle<()>; 2] = [
            tokio::spawn(pump(stdout, StreamKind::Stdout, chunk_size, chunk_tx.clone())),
            tokio::spawn(pump(stderr, StreamKind::Stderr, chunk_size, chunk_tx)),
        ];

        let now = tokio::time::Instant::now();
        let run_deadline = now + timeout.unwrap_or(NEVER);
        let mut drain_deadline: Option<tokio::time::Instant> = None;

        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let mut stdout_bytes = 0usize;
        let mut stderr_bytes = 0usize;

        let mut status: Option<ExitStatus> = None;
        let mut streams_open = true;
        let mut stop: Option<Stop> = None;

        while status.is_none() || streams_open {
            tokio::select! {
                chunk = chunk_rx.recv(), if streams_open => match chunk {
                    Some(Chunk::Data { kind, text, bytes }) => {
                        let (buf, total) = match kind {
                            StreamKind::Stdout => (&mut stdout_buf, &mut stdout_bytes),
                            StreamKind::Stderr => (&mut stderr_buf, &mut stderr_bytes),
                        };
                        *total += bytes;
                        if *total > max_buffer_bytes {
                            warn!(session_id = %session_id, run_id = %run_id, stream = %kind, "Output limit exceeded, killing interpreter");
                            if stop.is_none() {
                                stop = Some(Stop::Overflow(kind));
                                drain_deadline = Some(terminate(&mut child, status.is_none()));
                            }
                            continue;
                        }
                        if text.is_empty() {
                            continue;
                        }
                        buf.push_str(&text);
                        router
                            .emit(&session_id, OutputEvent { run_id, kind, payload: text })
                            .await;
                    }
                    Some(Chunk::Failed { kind, error }) => {
                        warn!(session_id = %session_id, run_id = %run_id, stream = %kind, error = %error, "Failed reading interpreter output");
                        if stop.is_none() {
                            stop = Some(Stop::Failed(error));
                            drain_deadline = Some(terminate(&mut child, status.is_none()));
                        }
                    }
                    None => streams_open = false,
                },
                exited = child.wait(), if status.is_none() => match exited {
                    Ok(s) => status = Some(s),
                    Err(e) => {
                        warn!(session_id = %session_id, run_id = %run_id, error = %e, "Failed waiting for interpreter");
                        if stop.is_none() {
                            stop = Some(Stop::Failed(e));
                        }
                        break;
                    }
                },
                _ = cancel.cancelled(), if stop.is_none() => {
                    debug!(session_id = %session_id, run_id = %run_id, "Run cancelled");
                    stop = Some(Stop::Cancelled);
                    drain_deadline = Some(terminate(&mut child, status.is_none()));
                },
                _ = tokio::time::sleep_until(run_deadline), if stop.is_none() && timeout.is_some() => {
                    warn!(session_id = %session_id, run_id = %run_id, "Run timed out");
                    stop = Some(Stop::TimedOut);
                    drain_deadline = Some(terminate(&mut child, status.is_none()));
                },
                _ = tokio::time::sleep_until(drain_deadline.unwrap_or(run_deadline)), if drain_deadline.is_some() => {
                    debug!(session_id = %session_id, run_id = %run_id, "Output still open after kill, abandoning pumps");
                    break;
                },
            }
        }

        for pump in &pumps {
            pump.abort();
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let termination = match stop {
            None => Termination::Exited,
            Some(Stop::Cancelled) => Termination::Cancelled,
            Some(Stop::TimedOut) => Termination::TimedOut,
            Some(Stop::Overflow(stream)) => {
                return Err(Error::OutputLimitExceeded {
                    stream,
                    limit: max_buffer_bytes,
                })
            }
            Some(Stop::Failed(e)) => return Err(Error::Io(e)),
        };

        Ok(RunOutcome {
            run_id,
            exit_code: status.and_then(|s| s.code()),
            stdout: stdout_buf,
            stderr: stderr_buf,
            termination,
            duration_ms,
        })
    }
}

/// Send SIGKILL if the child is still alive and return the drain deadline.
fn terminate(child: &mut Child, alive: bool) -> tokio::time::Instant {
    if alive {
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Kill failed, child already gone");
        }
    }
    tokio::time::Instant::now() + KILL_DRAIN_GRACE
}

/// Copy one pipe into decoded chunks until EOF.
async fn pump<R>(mut reader: R, kind: StreamKind, chunk_size: usize, tx: mpsc::Sender<Chunk>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8Decoder::default();
    let mut buf = vec![0u8; chunk_size];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                // Bytes are still counted when the decoder holds them back
                if tx.send(Chunk::Data { kind, text, bytes: n }).await.is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => {
                let _ = tx.send(Chunk::Failed { kind, error }).await;
                return;
            }
        }
    }

    if let Some(text) = decoder.finish() {
        let _ = tx.send(Chunk::Data { kind, text, bytes: 0 }).await;
    }
}
