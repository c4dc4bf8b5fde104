//! Replay task orchestration.
//!
//! A replay takes an uploaded capture and transmits it from inside the
//! sandbox against a target. Each started task is owned by one
//! supervisor future that stages files, launches the runner and folds
//! its status reports back into the task record. The [`ReplayManager`]
//! is the entry point; everything observable about a task lives on its
//! [`ReplayTask`] record.

mod error;
mod manager;
mod plan;
mod status;
mod supervisor;
mod task;

pub use error::ReplayError;
pub use manager::{ReplayManager, StartRequest};
pub use plan::{build_plan, ReplayPlan, SandboxPaths, RUNNER_PROGRAM};
pub use status::StatusReport;
pub use supervisor::{supervise, SupervisorContext};
pub use task::{ReplayMode, ReplayTask, TaskState};
