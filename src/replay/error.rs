//! Replay orchestration errors

use thiserror::Error;
use uuid::Uuid;

use crate::sandbox::SandboxError;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay task {0} not found")]
    NotFound(Uuid),
    #[error("trace file is missing or unreadable: {0}")]
    TraceMissing(String),
    #[error("direct replay is not supported; only sandbox mode is available")]
    DirectModeUnsupported,
    #[error("file transfer into the sandbox failed: {0}")]
    FileTransfer(String),
    #[error("no status from the sandbox runner within {0} seconds")]
    WatchdogTimeout(u64),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
