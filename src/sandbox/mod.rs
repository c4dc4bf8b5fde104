//! Sandbox gateway: the single point of contact with the isolated runtime.
//!
//! Replay traffic must originate inside a container the host does not share
//! a filesystem with, so every interaction goes through four verbs: resolve
//! the container, upload a file, launch a detached command, run a short
//! synchronous command. The docker implementation shells out to the docker
//! CLI; tests use [`MockSandbox`].

mod archive;
mod docker;
mod mock;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use docker::DockerGateway;
pub use mock::{MockSandbox, MockSandboxConfig, ScriptedStatus};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("docker binary not found: {0}")]
    DockerMissing(String),
    #[error("sandbox '{name}' is not available: {detail}")]
    Unavailable { name: String, detail: String },
    #[error("sandbox {step} failed: {detail}")]
    CommandFailed { step: &'static str, detail: String },
    #[error("sandbox command timed out after {0:?}")]
    Timeout(Duration),
    #[error("sandbox {step} io error: {source}")]
    Io {
        step: &'static str,
        source: std::io::Error,
    },
}

/// A resolved, running sandbox instance
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    /// Container name the gateway verified is running
    pub name: String,
}

/// Result of a synchronous command inside the sandbox. A non-zero exit is
/// not an error at this level; callers decide what it means.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Transport into the isolated runtime
#[async_trait]
pub trait SandboxGateway: Send + Sync {
    /// Verify the configured sandbox is reachable and running
    async fn resolve(&self) -> Result<SandboxHandle, SandboxError>;

    /// Copy a local file to a path inside the sandbox. The transfer is
    /// atomic from the caller's view: afterwards the remote file exists
    /// complete, or the call failed.
    async fn upload(
        &self,
        handle: &SandboxHandle,
        local: &Path,
        remote: &str,
    ) -> Result<(), SandboxError>;

    /// Launch a command that keeps running after this call returns
    async fn exec_detached(
        &self,
        handle: &SandboxHandle,
        command: &[String],
    ) -> Result<(), SandboxError>;

    /// Run a short command and collect its output
    async fn exec_sync(
        &self,
        handle: &SandboxHandle,
        command: &[String],
    ) -> Result<CommandOutput, SandboxError>;
}
