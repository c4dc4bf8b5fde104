//! Replay task model and lifecycle state machine.
//!
//! A task moves through `initializing → starting → preparing → running`
//! with `stopping` reachable once a stop is requested, and ends in one of
//! `completed | failed | stopped`. Terminal records are immutable except
//! for deletion. The machine permits forward jumps (a fast replay may be
//! `completed` by the first status read) but never a regression, and
//! `failed` is reachable from any live state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states of a replay task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Initializing,
    Starting,
    Preparing,
    Running,
    Stopping,
    Completed,
    Failed,
    Stopped,
}

impl TaskState {
    /// String representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Initializing => "initializing",
            TaskState::Starting => "starting",
            TaskState::Preparing => "preparing",
            TaskState::Running => "running",
            TaskState::Stopping => "stopping",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Stopped => "stopped",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "starting" => TaskState::Starting,
            "preparing" => TaskState::Preparing,
            "running" => TaskState::Running,
            "stopping" => TaskState::Stopping,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            "stopped" => TaskState::Stopped,
            _ => TaskState::Initializing,
        }
    }

    /// States a sandbox runner may legitimately report. Anything else is
    /// treated as noise and ignored by the merge.
    pub fn from_report(s: &str) -> Option<Self> {
        match s {
            "preparing" => Some(TaskState::Preparing),
            "running" => Some(TaskState::Running),
            "completed" => Some(TaskState::Completed),
            "failed" => Some(TaskState::Failed),
            "stopped" => Some(TaskState::Stopped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Stopped
        )
    }

    fn rank(&self) -> u8 {
        match self {
            TaskState::Initializing => 0,
            TaskState::Starting => 1,
            TaskState::Preparing => 2,
            TaskState::Running => 3,
            TaskState::Stopping => 4,
            TaskState::Completed | TaskState::Failed | TaskState::Stopped => 5,
        }
    }

    /// Whether moving to `next` is a legal lifecycle transition. Terminal
    /// states accept nothing; live states accept any same-or-later state,
    /// which forbids regressions such as stopping back to running.
    pub fn can_advance_to(&self, next: TaskState) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Replay execution modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    Sandbox,
}

impl ReplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayMode::Sandbox => "sandbox",
        }
    }
}

impl std::fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One replay execution request and its lifecycle record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayTask {
    /// Unique identifier, generated at start
    pub task_id: Uuid,
    /// Trace being replayed
    pub file_id: Uuid,
    /// Original trace filename, kept for display
    pub filename: String,
    /// Execution mode
    pub mode: ReplayMode,
    /// Current lifecycle state
    pub status: TaskState,
    /// Progress percentage 0-100, derived from the best available signal
    pub progress: u8,
    /// Packets sent so far, as last reported by the runner
    pub sent_packets: u64,
    /// Estimated total packets, fixed once known
    pub total_packets: u64,
    /// Destination address rewrite target, when set
    pub target_address: Option<String>,
    /// Transmission speed multiplier
    pub speed_multiplier: f64,
    /// Failure detail, present only when status == failed
    pub error: Option<String>,
    /// One-shot cancellation flag; never cleared once set
    pub stop_requested: bool,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// Last record change
    pub updated_at: DateTime<Utc>,
    /// First sign of life from the sandbox runner
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal state was reached
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReplayTask {
    /// Create a new task record in the initializing state
    pub fn new(file_id: Uuid, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            file_id,
            filename: filename.into(),
            mode: ReplayMode::Sandbox,
            status: TaskState::Initializing,
            progress: 0,
            sent_packets: 0,
            total_packets: 0,
            target_address: None,
            speed_multiplier: 1.0,
            error: None,
            stop_requested: false,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to the next lifecycle state if the transition is legal.
    /// Entering a terminal state stamps `finished_at` once.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
        self.touch();
        true
    }

    /// Fail the task with a human-readable error. No-op once terminal.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.error = Some(error.into());
        self.advance(TaskState::Failed);
    }

    /// Record a stop request. The flag is one-shot; the visible status
    /// moves to stopping only from states where the runner could still
    /// be transmitting. Returns false once the task is terminal.
    pub fn request_stop(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.stop_requested = true;
        if matches!(
            self.status,
            TaskState::Starting | TaskState::Preparing | TaskState::Running
        ) {
            self.advance(TaskState::Stopping);
        } else {
            self.touch();
        }
        true
    }
}
