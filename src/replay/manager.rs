//! Replay orchestration facade.
//!
//! The manager validates start requests, persists the task record and
//! hands each task to its own supervisor. Queries, stop and delete all go
//! straight to the task store; the supervisor picks changes up on its
//! next poll cycle. Once a task id has been handed out, every later
//! outcome is reported through the record, never as an error from here.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::ReplaySettings;
use crate::data::{ReplayTaskStore, TraceFile};
use crate::replay::error::ReplayError;
use crate::replay::supervisor::{supervise, SupervisorContext};
use crate::replay::task::ReplayTask;
use crate::sandbox::SandboxGateway;
use crate::trace::TraceReader;

/// Parameters for starting a replay
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Rewrite every packet's destination to this address
    pub target_address: Option<String>,
    /// Transmission speed; the configured default when absent
    pub speed_multiplier: Option<f64>,
    /// Sandboxed execution is the only supported mode; requests that
    /// turn it off are rejected
    pub use_sandbox: bool,
}

impl Default for StartRequest {
    fn default() -> Self {
        Self {
            target_address: None,
            speed_multiplier: None,
            use_sandbox: true,
        }
    }
}

/// Entry point for starting, querying, stopping and deleting replay
/// tasks. Each started task is handed to its own supervisor worker.
#[derive(Clone)]
pub struct ReplayManager {
    store: ReplayTaskStore,
    gateway: Arc<dyn SandboxGateway>,
    settings: ReplaySettings,
    remote_dir: String,
}

impl ReplayManager {
    pub fn new(
        store: ReplayTaskStore,
        gateway: Arc<dyn SandboxGateway>,
        settings: ReplaySettings,
        remote_dir: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
            remote_dir: remote_dir.into(),
        }
    }

    /// Validate the request, persist the initial record and spawn the
    /// task's supervisor. Returns as soon as the record exists; progress
    /// and failures are observed through [`status`](Self::status).
    pub fn start(
        &self,
        trace: &TraceFile,
        request: StartRequest,
    ) -> Result<ReplayTask, ReplayError> {
        if !request.use_sandbox {
            return Err(ReplayError::DirectModeUnsupported);
        }
        if !trace.path.exists() {
            return Err(ReplayError::TraceMissing(trace.filename.clone()));
        }
        if let Err(e) = TraceReader::open(&trace.path) {
            return Err(ReplayError::TraceMissing(format!("{}: {}", trace.filename, e)));
        }

        let mut task = ReplayTask::new(trace.file_id, &trace.filename);
        task.target_address = request.target_address;
        task.speed_multiplier = request
            .speed_multiplier
            .unwrap_or(self.settings.default_speed);
        self.store.save(&task);

        let ctx = SupervisorContext {
            task_id: task.task_id,
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            settings: self.settings.clone(),
            remote_dir: self.remote_dir.clone(),
            trace_path: trace.path.clone(),
            trace_format: trace.format,
            trace_duration_secs: trace.duration_secs,
        };
        tokio::spawn(supervise(ctx));

        info!(
            "Replay task {} started for trace {} ({})",
            task.task_id, trace.file_id, trace.filename
        );
        Ok(task)
    }

    /// Current record for one task
    pub fn status(&self, task_id: Uuid) -> Result<ReplayTask, ReplayError> {
        self.store
            .get(task_id)
            .ok_or(ReplayError::NotFound(task_id))
    }

    /// All known tasks, newest first
    pub fn list(&self) -> Vec<ReplayTask> {
        self.store.list()
    }

    /// Request cancellation. The one-shot flag is set on the record and
    /// the task's supervisor relays it into the sandbox on its next poll.
    /// Stopping an already stopping or finished task is acknowledged
    /// without effect.
    pub fn stop(&self, task_id: Uuid) -> Result<ReplayTask, ReplayError> {
        self.store
            .update(task_id, |task| {
                task.request_stop();
            })
            .ok_or(ReplayError::NotFound(task_id))
    }

    /// Remove a task record. A live task is asked to stop first, best
    /// effort; its supervisor then notices the record is gone, halts the
    /// runner and cleans up after itself. Deleting an unknown id is not
    /// an error; the record is gone either way.
    pub fn delete(&self, task_id: Uuid) -> bool {
        if let Some(task) = self.store.get(task_id) {
            if !task.is_terminal() {
                let _ = self.stop(task_id);
            }
        }
        let removed = self.store.delete(task_id);
        if removed {
            info!("Replay task {} deleted", task_id);
        }
        removed
    }
}
