//! `daad-studio run` - terminal front end for the process bridge
//!
//! Output chunks go to this terminal as they arrive, typed lines are
//! forwarded to the script, EOF (Ctrl+D) closes its stdin and Ctrl+C
//! cancels the run.

use anyhow::{Context, Result};
use clap::Args;
use daad_bridge::{ProcessBridge, SessionId, StreamKind, Termination};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::server::config::AppConfig;

/// Session id used for the terminal front end
const TERMINAL_SESSION: &str = "terminal";

/// Exit status reported when the run was cancelled or killed by a signal
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Script to run
    pub script: PathBuf,
    /// Interpreter executable (overrides configuration)
    #[arg(long)]
    pub interpreter: Option<String>,
    /// Kill the script after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn run(args: RunArgs, config: AppConfig) -> Result<()> {
    let mut bridge_config = config.bridge;
    if let Some(interpreter) = args.interpreter {
        bridge_config.interpreter = interpreter;
    }
    if let Some(timeout) = args.timeout {
        bridge_config.run_timeout_secs = timeout;
    }

    let bridge = ProcessBridge::new(bridge_config);
    let session = SessionId::from(TERMINAL_SESSION);
    let mut output = bridge.subscribe(&session).await;

    let handle = bridge
        .start_run(&session, &args.script)
        .await
        .with_context(|| format!("Failed to run {}", args.script.display()))?;
    debug!(run_id = %handle.run_id(), "Run started");

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        let mut stderr = tokio::io::stderr();
        while let Some(event) = output.recv().await {
            let written = match event.kind {
                StreamKind::Stdout => write_flush(&mut stdout, &event.payload).await,
                StreamKind::Stderr => write_flush(&mut stderr, &event.payload).await,
            };
            if written.is_err() {
                break;
            }
        }
    });

    let input_bridge = bridge.clone();
    let input_session = session.clone();
    let forwarder = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !input_bridge.write_stdin(&input_session, format!("{line}\n")).await {
                return;
            }
        }
        input_bridge.end_stdin(&input_session).await;
    });

    let cancel_bridge = bridge.clone();
    let cancel_session = session.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_bridge.cancel_run(&cancel_session).await;
        }
    });

    let outcome = handle.wait().await;

    interrupt.abort();
    forwarder.abort();
    bridge.unsubscribe(&session).await;
    let _ = printer.await;

    let outcome = outcome.context("Script run failed")?;
    let code = match outcome.termination {
        Termination::Exited => outcome.exit_code.unwrap_or(INTERRUPTED_EXIT_CODE),
        Termination::Cancelled => INTERRUPTED_EXIT_CODE,
        Termination::TimedOut => {
            eprintln!("\nScript timed out after {} ms", outcome.duration_ms);
            INTERRUPTED_EXIT_CODE
        }
    };

    // Stdin is read on a blocking thread that cannot be interrupted, so the
    // runtime would wait for one more line before shutting down.
    std::process::exit(code);
}

async fn write_flush<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}
