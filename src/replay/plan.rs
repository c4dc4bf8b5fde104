//! Execution plan for the in-sandbox runner.
//!
//! The runner program is a fixed text uploaded unchanged for every task;
//! everything task-specific travels in a small JSON plan next to it. No
//! code or shell is ever assembled from request data, and the host side
//! of the contract stays testable as plain data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ReplaySettings;
use crate::replay::task::ReplayTask;
use crate::trace::TraceFormat;

/// The program uploaded into the sandbox for every replay task
pub const RUNNER_PROGRAM: &str = include_str!("runner.py");

/// Parameters handed to the runner as a JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayPlan {
    pub trace_path: String,
    pub trace_format: String,
    pub status_path: String,
    pub stop_path: String,
    pub target_address: Option<String>,
    pub speed_multiplier: f64,
    pub convert_timeout_secs: u64,
    pub rewrite_timeout_secs: u64,
    /// Capture duration divided by speed, when the upload-time parse
    /// produced one; drives the runner's progress estimate
    pub expected_duration_secs: Option<f64>,
}

/// Per-task file locations inside the sandbox. Every path embeds the
/// task id so concurrent tasks never collide.
#[derive(Debug, Clone)]
pub struct SandboxPaths {
    pub trace: String,
    pub runner: String,
    pub plan: String,
    pub status: String,
    pub stop: String,
}

impl SandboxPaths {
    pub fn for_task(task_id: Uuid, remote_dir: &str) -> Self {
        let dir = remote_dir.trim_end_matches('/');
        Self {
            trace: format!("{}/{}.pcap", dir, task_id),
            runner: format!("{}/replay_{}.py", dir, task_id),
            plan: format!("{}/replay_{}.json", dir, task_id),
            status: format!("{}/{}.status", dir, task_id),
            stop: format!("{}/{}.stop", dir, task_id),
        }
    }

    /// Everything cleanup removes once the task is done
    pub fn all(&self) -> [&str; 5] {
        [
            &self.trace,
            &self.runner,
            &self.plan,
            &self.status,
            &self.stop,
        ]
    }
}

/// Build the plan for one task
pub fn build_plan(
    task: &ReplayTask,
    format: TraceFormat,
    duration_secs: Option<f64>,
    paths: &SandboxPaths,
    settings: &ReplaySettings,
) -> ReplayPlan {
    let speed = if task.speed_multiplier > 0.0 {
        task.speed_multiplier
    } else {
        1.0
    };

    ReplayPlan {
        trace_path: paths.trace.clone(),
        trace_format: format.as_str().to_string(),
        status_path: paths.status.clone(),
        stop_path: paths.stop.clone(),
        target_address: task.target_address.clone(),
        speed_multiplier: speed,
        convert_timeout_secs: settings.convert_timeout_secs,
        rewrite_timeout_secs: settings.rewrite_timeout_secs,
        expected_duration_secs: duration_secs.map(|d| d / speed),
    }
}
