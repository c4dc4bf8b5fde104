//! Per-task worker driving one replay to a terminal state.
//!
//! Every started task gets its own supervisor future: it stages the trace
//! and runner in the sandbox, launches the runner detached, then polls the
//! status file until the task ends. The supervisor is the only writer that
//! advances its task through the store's atomic [`update`], so tasks never
//! contend with each other. All outcomes, including the supervisor's own
//! failures, land on the task record; nothing escapes to the caller.
//!
//! [`update`]: crate::data::ReplayTaskStore::update

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ReplaySettings;
use crate::data::ReplayTaskStore;
use crate::replay::error::ReplayError;
use crate::replay::plan::{build_plan, SandboxPaths, RUNNER_PROGRAM};
use crate::replay::status::StatusReport;
use crate::replay::task::TaskState;
use crate::sandbox::{SandboxGateway, SandboxHandle};
use crate::trace::TraceFormat;

/// Everything a supervisor needs to run one task
pub struct SupervisorContext {
    pub task_id: Uuid,
    pub store: ReplayTaskStore,
    pub gateway: Arc<dyn SandboxGateway>,
    pub settings: ReplaySettings,
    /// Directory inside the sandbox for per-task files
    pub remote_dir: String,
    /// Trace file on the host
    pub trace_path: PathBuf,
    pub trace_format: TraceFormat,
    /// Capture duration from the upload-time parse, when known
    pub trace_duration_secs: Option<f64>,
}

/// Drive one replay task until it reaches a terminal state. Failures are
/// recorded on the task itself; this function never returns an error.
pub async fn supervise(ctx: SupervisorContext) {
    let task_id = ctx.task_id;
    if let Err(e) = run(&ctx).await {
        error!("Replay task {} failed: {}", task_id, e);
        // A task that never launched still passes through starting on
        // its way to failed; no record jumps from initializing straight
        // to a terminal state
        ctx.store.update(task_id, |task| {
            task.advance(TaskState::Starting);
        });
        ctx.store.update(task_id, |task| {
            task.mark_failed(e.to_string());
        });
    }
}

async fn run(ctx: &SupervisorContext) -> Result<(), ReplayError> {
    let handle = ctx.gateway.resolve().await?;
    let paths = SandboxPaths::for_task(ctx.task_id, &ctx.remote_dir);

    let result = run_in_sandbox(ctx, &handle, &paths).await;
    cleanup(ctx, &handle, &paths).await;
    result
}

async fn run_in_sandbox(
    ctx: &SupervisorContext,
    handle: &SandboxHandle,
    paths: &SandboxPaths,
) -> Result<(), ReplayError> {
    let task = ctx
        .store
        .get(ctx.task_id)
        .ok_or(ReplayError::NotFound(ctx.task_id))?;

    let plan = build_plan(
        &task,
        ctx.trace_format,
        ctx.trace_duration_secs,
        paths,
        &ctx.settings,
    );
    let plan_json = serde_json::to_vec_pretty(&plan)
        .map_err(|e| ReplayError::FileTransfer(format!("failed to encode plan: {}", e)))?;

    // Stage the runner and plan as real files so the upload path is the
    // same for all three artifacts
    let staging = tempfile::tempdir()
        .map_err(|e| ReplayError::FileTransfer(format!("failed to create staging dir: {}", e)))?;
    let runner_local = staging.path().join("runner.py");
    let plan_local = staging.path().join("plan.json");
    write_staged(&runner_local, RUNNER_PROGRAM.as_bytes()).await?;
    write_staged(&plan_local, &plan_json).await?;

    upload(ctx, handle, &ctx.trace_path, &paths.trace).await?;
    upload(ctx, handle, &runner_local, &paths.runner).await?;
    upload(ctx, handle, &plan_local, &paths.plan).await?;

    let launch = vec![
        "python3".to_string(),
        paths.runner.clone(),
        paths.plan.clone(),
    ];
    ctx.gateway.exec_detached(handle, &launch).await?;

    ctx.store.update(ctx.task_id, |task| {
        task.advance(TaskState::Starting);
    });
    info!(
        "Replay task {} launched in sandbox '{}'",
        ctx.task_id, handle.name
    );

    poll_until_terminal(ctx, handle, paths).await
}

async fn write_staged(path: &Path, bytes: &[u8]) -> Result<(), ReplayError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| ReplayError::FileTransfer(format!("failed to stage {}: {}", path.display(), e)))
}

async fn upload(
    ctx: &SupervisorContext,
    handle: &SandboxHandle,
    local: &Path,
    remote: &str,
) -> Result<(), ReplayError> {
    ctx.gateway
        .upload(handle, local, remote)
        .await
        .map_err(|e| ReplayError::FileTransfer(format!("{}: {}", remote, e)))
}

/// Poll the status file until the task is terminal. A watchdog deadline
/// slides forward on every successful read; when the runner goes silent
/// past the window the task fails instead of hanging forever.
async fn poll_until_terminal(
    ctx: &SupervisorContext,
    handle: &SandboxHandle,
    paths: &SandboxPaths,
) -> Result<(), ReplayError> {
    let poll_interval = Duration::from_millis(ctx.settings.poll_interval_ms.max(1));
    let watchdog = Duration::from_secs(ctx.settings.watchdog_secs.max(1));
    let mut deadline = Instant::now() + watchdog;
    let mut stop_signaled = false;

    loop {
        let Some(task) = ctx.store.get(ctx.task_id) else {
            // Record deleted mid-flight: halt the runner, then let the
            // caller's cleanup remove the files
            debug!("Replay task {} record is gone, aborting", ctx.task_id);
            signal_stop(ctx, handle, paths).await;
            return Ok(());
        };
        if task.is_terminal() {
            return Ok(());
        }

        if task.stop_requested && !stop_signaled {
            stop_signaled = signal_stop(ctx, handle, paths).await;
        }

        match read_status(ctx, handle, paths).await {
            Some(report) => {
                deadline = Instant::now() + watchdog;
                let updated = ctx.store.update(ctx.task_id, |task| {
                    report.apply_to(task);
                });
                match updated {
                    Some(task) if task.is_terminal() => {
                        info!(
                            "Replay task {} finished: {} ({}/{} packets)",
                            ctx.task_id, task.status, task.sent_packets, task.total_packets
                        );
                        return Ok(());
                    }
                    Some(_) => {}
                    None => {
                        signal_stop(ctx, handle, paths).await;
                        return Ok(());
                    }
                }
            }
            None if Instant::now() >= deadline => {
                return Err(ReplayError::WatchdogTimeout(ctx.settings.watchdog_secs));
            }
            None => {}
        }

        sleep(poll_interval).await;
    }
}

/// Create the stop file inside the sandbox. Returns whether the runner
/// will now see it; failures are retried on the next poll.
async fn signal_stop(ctx: &SupervisorContext, handle: &SandboxHandle, paths: &SandboxPaths) -> bool {
    let touch = vec!["touch".to_string(), paths.stop.clone()];
    match ctx.gateway.exec_sync(handle, &touch).await {
        Ok(output) if output.success() => {
            info!("Stop signaled for replay task {}", ctx.task_id);
            true
        }
        Ok(output) => {
            warn!(
                "Failed to signal stop for {}: {}",
                ctx.task_id,
                output.stderr.trim()
            );
            false
        }
        Err(e) => {
            warn!("Failed to signal stop for {}: {}", ctx.task_id, e);
            false
        }
    }
}

/// One status read. Transient failures, a file that does not exist yet,
/// torn or garbled content, all count as "no report this cycle".
async fn read_status(
    ctx: &SupervisorContext,
    handle: &SandboxHandle,
    paths: &SandboxPaths,
) -> Option<StatusReport> {
    let cat = vec!["cat".to_string(), paths.status.clone()];
    let output = match ctx.gateway.exec_sync(handle, &cat).await {
        Ok(output) => output,
        Err(e) => {
            debug!("Status read failed for {}: {}", ctx.task_id, e);
            return None;
        }
    };
    if !output.success() {
        return None;
    }
    StatusReport::parse(&output.stdout)
}

/// Remove the per-task files from the sandbox. The task outcome is
/// already decided by now, so failures are only logged.
async fn cleanup(ctx: &SupervisorContext, handle: &SandboxHandle, paths: &SandboxPaths) {
    let mut rm = vec!["rm".to_string(), "-f".to_string()];
    rm.extend(paths.all().iter().map(|p| p.to_string()));
    if let Err(e) = ctx.gateway.exec_sync(handle, &rm).await {
        debug!("Sandbox cleanup failed for {}: {}", ctx.task_id, e);
    }
}
