use super::*;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn sh_bridge(config: BridgeConfig) -> ProcessBridge {
    ProcessBridge::new(config.with_interpreter("sh"))
}

fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

async fn wait(handle: RunHandle) -> Result<RunOutcome> {
    tokio::time::timeout(Duration::from_secs(15), handle.wait())
        .await
        .expect("run did not finish in time")
}

fn drain(rx: &mut OutputStream) -> Vec<OutputEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_default_config() {
    let config = BridgeConfig::default();
    assert_eq!(config.interpreter, "daad");
    assert_eq!(config.max_buffer_bytes, 10 * 1024 * 1024);
    assert_eq!(config.concurrent_runs, RunPolicy::Reject);
    assert!(config.run_timeout().is_none());

    let timed = BridgeConfig {
        run_timeout_secs: 5,
        ..BridgeConfig::default()
    };
    assert_eq!(timed.run_timeout(), Some(Duration::from_secs(5)));
}

#[test]
fn test_policy_deserialization() {
    let policy: RunPolicy = serde_json::from_str("\"replace\"").unwrap();
    assert_eq!(policy, RunPolicy::Replace);
}

#[tokio::test]
async fn test_runs_in_script_directory() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "where.daad", "pwd -P\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");

    let handle = bridge.start_run(&session, &script).await.unwrap();
    let expected = handle.working_dir().to_path_buf();
    assert_eq!(expected, std::fs::canonicalize(dir.path()).unwrap());
    assert!(handle.script_path().is_absolute());

    let outcome = wait(handle).await.unwrap();
    assert_eq!(outcome.stdout.trim_end(), expected.to_string_lossy());
}

#[tokio::test]
async fn test_stderr_is_output_not_error() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "fail.daad", "echo oops >&2\nexit 1\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");
    let mut rx = bridge.subscribe(&session).await;

    let handle = bridge.start_run(&session, &script).await.unwrap();
    let run_id = handle.run_id();
    let outcome = wait(handle).await.unwrap();

    assert_eq!(outcome.exit_code, Some(1));
    assert_eq!(outcome.termination, Termination::Exited);
    assert_eq!(outcome.stderr, "oops\n");
    assert!(!outcome.success());

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .all(|e| e.kind == StreamKind::Stderr && e.run_id == run_id));
    let text: String = events.iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(text, "oops\n");
}

#[tokio::test]
async fn test_arabic_output_survives_chunking() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "greet.daad", "printf 'مرحبا يا عالم\\n'\n");
    // One-byte reads split every Arabic character
    let bridge = sh_bridge(BridgeConfig {
        read_chunk_bytes: 1,
        ..BridgeConfig::default()
    });
    let session = SessionId::from("w1");
    let mut rx = bridge.subscribe(&session).await;

    let outcome = wait(bridge.start_run(&session, &script).await.unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.stdout, "مرحبا يا عالم\n");

    let events = drain(&mut rx);
    assert!(events.iter().all(|e| !e.payload.contains('\u{FFFD}')));
    let text: String = events.iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(text, "مرحبا يا عالم\n");
}

#[tokio::test]
async fn test_missing_script_rejected_before_spawn() {
    let dir = TempDir::new().unwrap();
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");

    let err = bridge
        .start_run(&session, dir.path().join("nope.daad"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ScriptNotFound(_)));
    assert_eq!(err.code(), "SCRIPT_NOT_FOUND");

    // A directory is not a script either
    let err = bridge.start_run(&session, dir.path()).await.unwrap_err();
    assert!(matches!(err, Error::ScriptNotFound(_)));
    assert_eq!(bridge.active_run_count().await, 0);
}

#[tokio::test]
async fn test_cancel_run() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "hang.daad", "exec sleep 30\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");

    let handle = bridge.start_run(&session, &script).await.unwrap();
    assert!(bridge.active_run(&session).await.is_some());
    assert!(bridge.cancel_run(&session).await);

    let outcome = wait(handle).await.unwrap();
    assert_eq!(outcome.termination, Termination::Cancelled);
    assert_eq!(outcome.exit_code, None);
    assert!(bridge.active_run(&session).await.is_none());
    assert!(!bridge.cancel_run(&session).await);
}

#[tokio::test]
async fn test_run_timeout() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "hang.daad", "exec sleep 30\n");
    let bridge = sh_bridge(BridgeConfig {
        run_timeout_secs: 1,
        ..BridgeConfig::default()
    });
    let session = SessionId::from("w1");

    let outcome = wait(bridge.start_run(&session, &script).await.unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.termination, Termination::TimedOut);
    assert!(outcome.duration_ms >= 1000);
    assert_eq!(bridge.active_run_count().await, 0);
}

#[tokio::test]
async fn test_output_limit_fails_run() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "flood.daad",
        "i=0\nwhile [ $i -lt 200 ]; do echo xxxxxxxxxxxxxxxxxxxxxxxx; i=$((i+1)); done\n",
    );
    let bridge = sh_bridge(BridgeConfig {
        max_buffer_bytes: 1024,
        ..BridgeConfig::default()
    });
    let session = SessionId::from("w1");

    let err = wait(bridge.start_run(&session, &script).await.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::OutputLimitExceeded {
            stream: StreamKind::Stdout,
            limit: 1024
        }
    ));
    assert!(bridge.active_run(&session).await.is_none());
    assert!(!bridge.write_stdin(&session, "x").await);
}

#[tokio::test]
async fn test_reject_policy_keeps_first_run() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "hang.daad", "exec sleep 30\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");

    let first = bridge.start_run(&session, &script).await.unwrap();
    let err = bridge.start_run(&session, &script).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(ref s) if *s == session));

    let live = bridge.active_run(&session).await.unwrap();
    assert_eq!(live.run_id, first.run_id());
    assert_eq!(live.state, RunState::Running);

    bridge.cancel_run(&session).await;
    wait(first).await.unwrap();
}

#[tokio::test]
async fn test_replace_policy_cancels_first_run() {
    let dir = TempDir::new().unwrap();
    let hang = write_script(&dir, "hang.daad", "exec sleep 30\n");
    let quick = write_script(&dir, "quick.daad", "read line\necho \"$line\"\n");
    let bridge = sh_bridge(BridgeConfig {
        concurrent_runs: RunPolicy::Replace,
        ..BridgeConfig::default()
    });
    let session = SessionId::from("w1");

    let first = bridge.start_run(&session, &hang).await.unwrap();
    let second = bridge.start_run(&session, &quick).await.unwrap();

    let first_outcome = wait(first).await.unwrap();
    assert_eq!(first_outcome.termination, Termination::Cancelled);

    // The cancelled run must not have evicted its successor
    let live = bridge.active_run(&session).await.unwrap();
    assert_eq!(live.run_id, second.run_id());
    assert!(bridge.write_stdin(&session, "next\n").await);

    let second_outcome = wait(second).await.unwrap();
    assert_eq!(second_outcome.stdout, "next\n");
    assert!(second_outcome.success());
}

#[tokio::test]
async fn test_close_session_cancels_and_unsubscribes() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "hang.daad", "exec sleep 30\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");
    let mut rx = bridge.subscribe(&session).await;

    let handle = bridge.start_run(&session, &script).await.unwrap();
    bridge.close_session(&session).await;

    let outcome = wait(handle).await.unwrap();
    assert_eq!(outcome.termination, Termination::Cancelled);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_end_stdin_twice() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "cat.daad", "cat\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");

    let handle = bridge.start_run(&session, &script).await.unwrap();
    assert!(bridge.write_stdin(&session, "abc").await);
    assert!(bridge.end_stdin(&session).await);
    assert!(!bridge.end_stdin(&session).await);
    assert!(!bridge.write_stdin(&session, "late").await);

    let outcome = wait(handle).await.unwrap();
    assert_eq!(outcome.stdout, "abc");
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn test_stdin_closed_by_child_reports_false() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "deaf.daad", "exec 0<&-\necho closed\nsleep 1\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");
    let mut rx = bridge.subscribe(&session).await;

    let handle = bridge.start_run(&session, &script).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.payload, "closed\n");

    assert!(!bridge.write_stdin(&session, "ignored\n").await);
    assert!(!bridge.write_stdin(&session, "again\n").await);
    assert!(!bridge.end_stdin(&session).await);

    let outcome = wait(handle).await.unwrap();
    assert!(outcome.success());
}

#[tokio::test]
async fn test_stdin_write_does_not_block_on_full_pipe() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "busy.daad", "exec sleep 20\n");
    let bridge = sh_bridge(BridgeConfig::default());
    let session = SessionId::from("w1");

    let handle = bridge.start_run(&session, &script).await.unwrap();

    // Far more than a pipe buffer; the child never reads it
    let big = vec![b'x'; 1024 * 1024];
    let accepted = tokio::time::timeout(Duration::from_secs(2), bridge.write_stdin(&session, &big))
        .await
        .expect("write_stdin blocked on a full pipe");
    assert!(accepted);

    let queued = tokio::time::timeout(Duration::from_secs(2), bridge.write_stdin(&session, "more"))
        .await
        .expect("queued write blocked");
    assert!(queued);

    // The session stays responsive to cancel
    assert!(bridge.cancel_run(&session).await);
    let outcome = wait(handle).await.unwrap();
    assert_eq!(outcome.termination, Termination::Cancelled);
}

#[tokio::test]
async fn test_handle_reports_final_state() {
    let dir = TempDir::new().unwrap();
    let ok = write_script(&dir, "ok.daad", "echo done\n");
    let flood = write_script(
        &dir,
        "flood.daad",
        "i=0\nwhile [ $i -lt 200 ]; do echo xxxxxxxxxxxxxxxxxxxxxxxx; i=$((i+1)); done\n",
    );
    let bridge = sh_bridge(BridgeConfig {
        max_buffer_bytes: 1024,
        ..BridgeConfig::default()
    });
    let session = SessionId::from("w1");

    async fn settled(handle: &RunHandle) -> RunState {
        tokio::time::timeout(Duration::from_secs(15), async {
            while handle.state() == RunState::Running {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            handle.state()
        })
        .await
        .expect("run did not settle in time")
    }

    let handle = bridge.start_run(&session, &ok).await.unwrap();
    assert_eq!(settled(&handle).await, RunState::Completed);
    assert!(bridge.active_run(&session).await.is_none());
    assert!(wait(handle).await.is_ok());

    let handle = bridge.start_run(&session, &flood).await.unwrap();
    assert_eq!(settled(&handle).await, RunState::Failed);
    assert!(wait(handle).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_replace_keeps_live_run_when_spawn_fails() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let interpreter = write_script(&dir, "daad", "#!/bin/sh\nexec sh \"$@\"\n");
    std::fs::set_permissions(&interpreter, std::fs::Permissions::from_mode(0o755)).unwrap();
    let hang = write_script(&dir, "hang.daad", "exec sleep 30\n");
    let quick = write_script(&dir, "quick.daad", "echo hi\n");

    let bridge = ProcessBridge::new(BridgeConfig {
        concurrent_runs: RunPolicy::Replace,
        ..BridgeConfig::default().with_interpreter(interpreter.to_string_lossy())
    });
    let session = SessionId::from("w1");

    let first = bridge.start_run(&session, &hang).await.unwrap();

    // The interpreter disappears; the replacement cannot spawn
    std::fs::remove_file(&interpreter).unwrap();
    let err = bridge.start_run(&session, &quick).await.unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));

    let live = bridge.active_run(&session).await.unwrap();
    assert_eq!(live.run_id, first.run_id());
    assert_eq!(first.state(), RunState::Running);

    bridge.cancel_run(&session).await;
    let outcome = wait(first).await.unwrap();
    assert_eq!(outcome.termination, Termination::Cancelled);
}
