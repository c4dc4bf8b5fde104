//! Integration tests for the replay lifecycle
//!
//! Drives the public ReplayManager API against the mock sandbox: start,
//! progress, stop, delete, and the failure paths an unreachable or
//! broken sandbox produces.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::common::captures;
use recast::config::ReplaySettings;
use recast::data::{Database, ReplayTaskStore, TraceFile};
use recast::replay::{ReplayError, ReplayManager, ReplayTask, StartRequest, TaskState};
use recast::sandbox::{MockSandbox, MockSandboxConfig, SandboxGateway, ScriptedStatus};
use recast::trace::TraceFormat;
use tempfile::TempDir;
use uuid::Uuid;

/// Settings tuned so a full lifecycle finishes in well under a second
fn fast_settings() -> ReplaySettings {
    ReplaySettings {
        poll_interval_ms: 10,
        watchdog_secs: 2,
        convert_timeout_secs: 30,
        rewrite_timeout_secs: 30,
        default_speed: 1.0,
    }
}

fn manager_with(mock: &Arc<MockSandbox>, store: ReplayTaskStore) -> ReplayManager {
    let gateway: Arc<dyn SandboxGateway> = mock.clone();
    ReplayManager::new(store, gateway, fast_settings(), "/tmp")
}

/// Write a real three-packet capture and describe it as an upload record
fn sample_trace(dir: &Path, name: &str) -> TraceFile {
    let bytes = captures::minimal_capture();
    let path = captures::write_capture(dir, name, &bytes);
    let mut trace = TraceFile::new(
        name,
        path,
        bytes.len() as u64,
        "0".repeat(64),
        TraceFormat::Pcap,
    );
    trace.total_packets = 3;
    trace.duration_secs = Some(1.0);
    trace
}

async fn wait_terminal(manager: &ReplayManager, task_id: Uuid) -> ReplayTask {
    for _ in 0..500 {
        let task = manager.status(task_id).expect("task record vanished");
        if task.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task never reached a terminal state");
}

async fn wait_for<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

/// A healthy sandbox run completes with every packet accounted for
#[tokio::test]
async fn test_replay_completes_without_target() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mock = Arc::new(MockSandbox::with_defaults());
    let manager = manager_with(&mock, ReplayTaskStore::in_memory());
    let trace = sample_trace(dir.path(), "healthy.pcap");

    let task = manager
        .start(&trace, StartRequest::default())
        .expect("start should accept a readable capture");
    assert_eq!(task.status, TaskState::Initializing);
    assert!(task.target_address.is_none());

    let done = wait_terminal(&manager, task.task_id).await;
    assert_eq!(done.status, TaskState::Completed);
    assert_eq!(done.sent_packets, done.total_packets);
    assert_eq!(done.progress, 100);
    assert!(done.finished_at.is_some(), "end time should be recorded");

    // Trace, runner program and plan all crossed the gateway
    assert_eq!(mock.uploads().len(), 3);
    // Task working files were removed afterwards
    assert_eq!(mock.removed_files().len(), 5);
}

/// An unreachable sandbox fails the task instead of erroring the start call
#[tokio::test]
async fn test_unreachable_sandbox_fails_task() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mock = Arc::new(MockSandbox::new(MockSandboxConfig::unavailable()));
    let manager = manager_with(&mock, ReplayTaskStore::in_memory());
    let trace = sample_trace(dir.path(), "no-sandbox.pcap");

    let task = manager
        .start(&trace, StartRequest::default())
        .expect("start itself should succeed");

    let done = wait_terminal(&manager, task.task_id).await;
    assert_eq!(done.status, TaskState::Failed);
    let error = done.error.expect("failed task should carry an error");
    assert!(
        error.contains("not available"),
        "error should mention sandbox unavailability: {}",
        error
    );
    assert!(mock.uploads().is_empty(), "nothing should be uploaded");
}

/// Stopping a running task lands on stopped with an end time
#[tokio::test]
async fn test_stop_while_running() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    // Last scripted report repeats, so this replay never ends on its own
    let config = MockSandboxConfig::default().with_script(vec![
        ScriptedStatus::preparing(30),
        ScriptedStatus::running(10, 30),
        ScriptedStatus::running(20, 30),
    ]);
    let mock = Arc::new(MockSandbox::new(config));
    let manager = manager_with(&mock, ReplayTaskStore::in_memory());
    let trace = sample_trace(dir.path(), "endless.pcap");

    let task = manager.start(&trace, StartRequest::default()).unwrap();

    wait_for(|| {
        manager
            .status(task.task_id)
            .map(|t| t.status == TaskState::Running)
            .unwrap_or(false)
    })
    .await;

    let stopped = manager.stop(task.task_id).expect("stop should ack");
    assert!(stopped.stop_requested);

    let done = wait_terminal(&manager, task.task_id).await;
    assert_eq!(done.status, TaskState::Stopped);
    assert!(done.finished_at.is_some(), "stop must set the end time");
    assert!(mock.stop_file_created(), "stop must reach the sandbox");
}

/// Two concurrent replays keep separate records and both finish
#[tokio::test]
async fn test_concurrent_replays_stay_independent() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mock = Arc::new(MockSandbox::with_defaults());
    let manager = manager_with(&mock, ReplayTaskStore::in_memory());

    let trace_a = sample_trace(dir.path(), "first.pcap");
    let trace_b = sample_trace(dir.path(), "second.pcap");

    let task_a = manager.start(&trace_a, StartRequest::default()).unwrap();
    let task_b = manager.start(&trace_b, StartRequest::default()).unwrap();
    assert_ne!(task_a.task_id, task_b.task_id);

    let done_a = wait_terminal(&manager, task_a.task_id).await;
    let done_b = wait_terminal(&manager, task_b.task_id).await;

    assert_eq!(done_a.status, TaskState::Completed);
    assert_eq!(done_b.status, TaskState::Completed);
    assert_eq!(done_a.file_id, trace_a.file_id);
    assert_eq!(done_b.file_id, trace_b.file_id);

    let listed = manager.list();
    assert_eq!(listed.len(), 2);
    // Both tasks uploaded their own trace, runner and plan
    assert_eq!(mock.uploads().len(), 6);
}

/// Queries for ids that were never issued are NotFound, not panics
#[tokio::test]
async fn test_unknown_task_id_is_not_found() {
    let mock = Arc::new(MockSandbox::with_defaults());
    let manager = manager_with(&mock, ReplayTaskStore::in_memory());
    let missing = Uuid::new_v4();

    assert!(matches!(
        manager.status(missing),
        Err(ReplayError::NotFound(_))
    ));
    assert!(matches!(
        manager.stop(missing),
        Err(ReplayError::NotFound(_))
    ));
}

/// Deleting a live task aborts its runner and leaves nothing behind
#[tokio::test]
async fn test_delete_aborts_live_replay() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = MockSandboxConfig::default().with_script(vec![
        ScriptedStatus::preparing(30),
        ScriptedStatus::running(5, 30),
    ]);
    let mock = Arc::new(MockSandbox::new(config));
    let manager = manager_with(&mock, ReplayTaskStore::in_memory());
    let trace = sample_trace(dir.path(), "doomed.pcap");

    let task = manager.start(&trace, StartRequest::default()).unwrap();
    wait_for(|| {
        manager
            .status(task.task_id)
            .map(|t| t.status == TaskState::Running)
            .unwrap_or(false)
    })
    .await;

    assert!(manager.delete(task.task_id));
    assert!(matches!(
        manager.status(task.task_id),
        Err(ReplayError::NotFound(_))
    ));

    // The supervisor notices the record is gone, signals the runner to
    // stop and clears the working files
    let mock_for_stop = mock.clone();
    wait_for(move || mock_for_stop.stop_file_created()).await;
    let mock_for_rm = mock.clone();
    wait_for(move || mock_for_rm.removed_files().len() == 5).await;
    assert!(manager.list().is_empty());
}

/// Task records written through a real database survive into a fresh store
#[tokio::test]
async fn test_task_records_survive_store_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(dir.path().join("replay.db")).expect("Failed to open database");
    let mock = Arc::new(MockSandbox::with_defaults());
    let manager = manager_with(&mock, ReplayTaskStore::new(Some(db.connection())));
    let trace = sample_trace(dir.path(), "durable.pcap");

    let task = manager.start(&trace, StartRequest::default()).unwrap();
    let done = wait_terminal(&manager, task.task_id).await;
    assert_eq!(done.status, TaskState::Completed);

    // A second store over the same connection sees the finished record
    let reopened = ReplayTaskStore::new(Some(db.connection()));
    let loaded = reopened.get(task.task_id).expect("record should persist");
    assert_eq!(loaded.status, TaskState::Completed);
    assert_eq!(loaded.sent_packets, loaded.total_packets);
    assert_eq!(loaded.filename, "durable.pcap");
}

/// The scripted failure path surfaces the runner's diagnostic line
#[tokio::test]
async fn test_runner_failure_reports_diagnostic() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = MockSandboxConfig::default().with_script(vec![
        ScriptedStatus::preparing(30),
        ScriptedStatus::failed("tcpreplay exited 1"),
    ]);
    let mock = Arc::new(MockSandbox::new(config));
    let manager = manager_with(&mock, ReplayTaskStore::in_memory());
    let trace = sample_trace(dir.path(), "broken.pcap");

    let task = manager.start(&trace, StartRequest::default()).unwrap();
    let done = wait_terminal(&manager, task.task_id).await;

    assert_eq!(done.status, TaskState::Failed);
    assert_eq!(done.error.as_deref(), Some("tcpreplay exited 1"));
}

/// A runner that never writes status trips the watchdog
#[tokio::test]
async fn test_silent_runner_trips_watchdog() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mock = Arc::new(MockSandbox::new(MockSandboxConfig::never_responds()));
    let settings = ReplaySettings {
        watchdog_secs: 1,
        ..fast_settings()
    };
    let gateway: Arc<dyn SandboxGateway> = mock.clone();
    let manager = ReplayManager::new(ReplayTaskStore::in_memory(), gateway, settings, "/tmp");
    let trace = sample_trace(dir.path(), "silent.pcap");

    let task = manager.start(&trace, StartRequest::default()).unwrap();
    let done = wait_terminal(&manager, task.task_id).await;

    assert_eq!(done.status, TaskState::Failed);
    assert!(
        done.error.unwrap_or_default().contains("no status"),
        "watchdog failure should explain the silence"
    );
}
