//! Background launches and kill signals

mod common;

use std::sync::Arc;

use common::ScriptedExecutor;
use tether_exec::LocalExecutor;
use tether_remote::{CommandDispatcher, ProcessState, ProcessTracker, RemoteError};

#[tokio::test]
async fn test_echoed_pid_is_recorded() {
    let executor = Arc::new(ScriptedExecutor::new().reply("syslogd", "4821\n"));
    let dispatcher = CommandDispatcher::new(executor.clone());

    let process = dispatcher.background("syslogd -n").await.unwrap();

    assert_eq!(process.pid, Some(4821));
    assert_eq!(process.state, ProcessState::Running);
    assert_eq!(process.command, "syslogd -n");
    assert_eq!(executor.recorded(), vec!["syslogd -n & echo $!"]);
}

#[tokio::test]
async fn test_unparseable_pid_is_not_an_error() {
    let executor = Arc::new(ScriptedExecutor::new().reply("tail", "tail: command not found\n"));
    let dispatcher = CommandDispatcher::new(executor);

    let process = dispatcher.background("tail -f /var/log/syslog").await.unwrap();

    assert_eq!(process.pid, None);
    assert_eq!(process.state, ProcessState::Unknown);
}

#[tokio::test]
async fn test_silent_launch_is_unknown() {
    let dispatcher = CommandDispatcher::new(Arc::new(ScriptedExecutor::new()));
    let process = dispatcher.background("true").await.unwrap();
    assert_eq!(process.state, ProcessState::Unknown);
}

#[tokio::test]
async fn test_stop_sends_kill_and_marks_stopped() {
    let executor = Arc::new(ScriptedExecutor::new().reply("sleep", "31337"));
    let dispatcher = CommandDispatcher::new(executor.clone());
    let tracker = ProcessTracker::new(dispatcher.clone());

    let mut process = dispatcher.background("sleep 100").await.unwrap();
    tracker.stop(&mut process).await.unwrap();
    assert_eq!(process.state, ProcessState::Stopped);

    // stopping twice does not signal again
    tracker.stop(&mut process).await.unwrap();

    assert_eq!(
        executor.recorded(),
        vec!["sleep 100 & echo $!", "kill 31337"]
    );
}

#[tokio::test]
async fn test_stop_without_pid() {
    let dispatcher = CommandDispatcher::new(Arc::new(ScriptedExecutor::new()));
    let tracker = ProcessTracker::new(dispatcher.clone());

    let mut process = dispatcher.background("true").await.unwrap();
    let err = tracker.stop(&mut process).await.unwrap_err();
    assert!(matches!(err, RemoteError::PidUnavailable { .. }));
    assert_eq!(process.state, ProcessState::Unknown);
}

#[tokio::test]
async fn test_kill_by_name_is_best_effort() {
    let executor = Arc::new(ScriptedExecutor::new().reply_status("killall", 1, ""));
    let tracker = ProcessTracker::new(CommandDispatcher::new(executor.clone()));

    let result = tracker.kill_by_name("frida \"server\"").await.unwrap();
    assert_eq!(result.status, 1);
    assert_eq!(executor.recorded(), vec![r#"killall -9 "frida \"server\"""#]);
}

#[tokio::test]
async fn test_local_background_returns_promptly() {
    let dispatcher = CommandDispatcher::new(Arc::new(LocalExecutor::new()));
    let tracker = ProcessTracker::new(dispatcher.clone());

    let start = std::time::Instant::now();
    let mut process = dispatcher.background("sleep 30").await.unwrap();
    assert!(start.elapsed() < std::time::Duration::from_secs(10));

    let pid = process.pid.expect("shell echoes the job pid");
    let alive = dispatcher.blocking(&format!("kill -0 {pid}"), true).await.unwrap();
    assert!(alive.success());

    tracker.stop(&mut process).await.unwrap();
    assert_eq!(process.state, ProcessState::Stopped);
}
