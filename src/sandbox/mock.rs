//! Mock sandbox gateway for deterministic testing
//!
//! Implements SandboxGateway to serve pre-configured status reports
//! without touching docker. Use this for integration tests that need
//! to drive the replay supervisor through its full lifecycle.
//!
//! # Example
//! ```no_run
//! use recast::sandbox::{MockSandbox, MockSandboxConfig, ScriptedStatus};
//!
//! let sandbox = MockSandbox::new(MockSandboxConfig::default().with_script(vec![
//!     ScriptedStatus::preparing(1000),
//!     ScriptedStatus::running(500, 1000),
//!     ScriptedStatus::completed(1000),
//! ]));
//!
//! // Hand the mock to a ReplayManager in tests...
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CommandOutput, SandboxError, SandboxGateway, SandboxHandle};

/// One status report the mock runner will serve
#[derive(Debug, Clone)]
pub struct ScriptedStatus {
    pub sent_packets: u64,
    pub total_packets: u64,
    pub status: String,
    pub error: Option<String>,
}

impl ScriptedStatus {
    pub fn preparing(total_packets: u64) -> Self {
        Self {
            sent_packets: 0,
            total_packets,
            status: "preparing".to_string(),
            error: None,
        }
    }

    pub fn running(sent_packets: u64, total_packets: u64) -> Self {
        Self {
            sent_packets,
            total_packets,
            status: "running".to_string(),
            error: None,
        }
    }

    pub fn completed(total_packets: u64) -> Self {
        Self {
            sent_packets: total_packets,
            total_packets,
            status: "completed".to_string(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            sent_packets: 0,
            total_packets: 0,
            status: "failed".to_string(),
            error: Some(error.into()),
        }
    }

    pub fn stopped(sent_packets: u64, total_packets: u64) -> Self {
        Self {
            sent_packets,
            total_packets,
            status: "stopped".to_string(),
            error: None,
        }
    }

    fn to_json(&self) -> String {
        serde_json::json!({
            "sent_packets": self.sent_packets,
            "total_packets": self.total_packets,
            "status": self.status,
            "error": self.error,
            "timestamp": 0.0,
        })
        .to_string()
    }
}

/// Configuration for mock sandbox behavior
#[derive(Clone)]
pub struct MockSandboxConfig {
    /// Name reported in the resolved handle
    pub container_name: String,
    /// Whether resolve() succeeds
    pub available: bool,
    /// Whether upload() fails
    pub fail_upload: bool,
    /// Whether exec_detached() fails
    pub fail_launch: bool,
    /// Status reads that fail before the runner "has started"
    pub silent_reads: usize,
    /// Reads that return unparseable output after the silent ones
    pub garbled_reads: usize,
    /// Status reports served in order; the last one repeats
    pub script: Vec<ScriptedStatus>,
    /// Once the stop file is touched, serve a stopped report instead
    pub stop_responds: bool,
}

impl Default for MockSandboxConfig {
    fn default() -> Self {
        Self {
            container_name: "mock-sandbox".to_string(),
            available: true,
            fail_upload: false,
            fail_launch: false,
            silent_reads: 0,
            garbled_reads: 0,
            script: vec![
                ScriptedStatus::preparing(100),
                ScriptedStatus::running(50, 100),
                ScriptedStatus::completed(100),
            ],
            stop_responds: true,
        }
    }
}

impl MockSandboxConfig {
    /// Configure the status reports served to the supervisor
    pub fn with_script(mut self, script: Vec<ScriptedStatus>) -> Self {
        self.script = script;
        self
    }

    /// Fail the first `n` status reads as if no status file exists yet
    pub fn with_silent_reads(mut self, n: usize) -> Self {
        self.silent_reads = n;
        self
    }

    /// Serve `n` unparseable reads before the script, simulating a read
    /// that caught the file mid-write
    pub fn with_garbled_reads(mut self, n: usize) -> Self {
        self.garbled_reads = n;
        self
    }

    /// Keep serving the scripted reports even after a stop file appears
    pub fn ignore_stop(mut self) -> Self {
        self.stop_responds = false;
        self
    }

    /// A sandbox that cannot be resolved
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// A sandbox where every upload fails
    pub fn failing_upload() -> Self {
        Self {
            fail_upload: true,
            ..Self::default()
        }
    }

    /// A sandbox where detached launches fail
    pub fn failing_launch() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    /// A sandbox whose runner never writes any status
    pub fn never_responds() -> Self {
        Self {
            silent_reads: usize::MAX,
            ..Self::default()
        }
    }
}

/// A file delivered through the mock gateway
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub local: PathBuf,
    pub remote: String,
    pub size: u64,
}

#[derive(Default)]
struct MockState {
    uploads: Vec<UploadRecord>,
    launches: Vec<Vec<String>>,
    files: HashSet<String>,
    touched: Vec<String>,
    removed: Vec<String>,
    cursors: HashMap<String, usize>,
}

/// In-memory sandbox gateway driven by a scripted status sequence
pub struct MockSandbox {
    config: MockSandboxConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockSandbox {
    pub fn new(config: MockSandboxConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Mock that runs a short successful replay
    pub fn with_defaults() -> Self {
        Self::new(MockSandboxConfig::default())
    }

    /// Files uploaded so far
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.lock().uploads.clone()
    }

    /// Detached commands launched so far
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.state.lock().launches.clone()
    }

    /// Whether any stop file was ever created, even if later cleaned up
    pub fn stop_file_created(&self) -> bool {
        self.state
            .lock()
            .touched
            .iter()
            .any(|f| f.ends_with(".stop"))
    }

    /// Paths passed to cleanup `rm` calls
    pub fn removed_files(&self) -> Vec<String> {
        self.state.lock().removed.clone()
    }

    /// Total number of status reads attempted
    pub fn status_reads(&self) -> usize {
        self.state.lock().cursors.values().sum()
    }

    fn serve_status(&self, path: &str) -> CommandOutput {
        let (n, stop_seen) = {
            let mut state = self.state.lock();
            let cursor = state.cursors.entry(path.to_string()).or_insert(0);
            let n = *cursor;
            *cursor += 1;

            // Status and stop paths differ only in suffix for a given task
            let stop_path = path.replace(".status", ".stop");
            (n, state.files.contains(&stop_path))
        };

        if n < self.config.silent_reads {
            return CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("cat: {}: No such file or directory", path),
            };
        }
        let n = n - self.config.silent_reads;

        if n < self.config.garbled_reads {
            return CommandOutput {
                exit_code: 0,
                stdout: "{\"sent_packets\": 12, \"total_".to_string(),
                stderr: String::new(),
            };
        }
        let n = n - self.config.garbled_reads;

        if self.config.script.is_empty() {
            return CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("cat: {}: No such file or directory", path),
            };
        }

        let idx = n.min(self.config.script.len() - 1);
        let entry = &self.config.script[idx];

        if stop_seen && self.config.stop_responds && !is_terminal_status(&entry.status) {
            let report = ScriptedStatus::stopped(entry.sent_packets, entry.total_packets);
            return CommandOutput {
                exit_code: 0,
                stdout: report.to_json(),
                stderr: String::new(),
            };
        }

        CommandOutput {
            exit_code: 0,
            stdout: entry.to_json(),
            stderr: String::new(),
        }
    }
}

fn is_terminal_status(status: &str) -> bool {
    matches!(status, "completed" | "failed" | "stopped")
}

#[async_trait]
impl SandboxGateway for MockSandbox {
    async fn resolve(&self) -> Result<SandboxHandle, SandboxError> {
        if !self.config.available {
            return Err(SandboxError::Unavailable {
                name: self.config.container_name.clone(),
                detail: "container not found".to_string(),
            });
        }
        Ok(SandboxHandle {
            name: self.config.container_name.clone(),
        })
    }

    async fn upload(
        &self,
        _handle: &SandboxHandle,
        local: &Path,
        remote: &str,
    ) -> Result<(), SandboxError> {
        if self.config.fail_upload {
            return Err(SandboxError::CommandFailed {
                step: "upload",
                detail: "mock upload failure".to_string(),
            });
        }

        let size = std::fs::metadata(local).map(|m| m.len()).unwrap_or(0);
        self.state.lock().uploads.push(UploadRecord {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            size,
        });
        Ok(())
    }

    async fn exec_detached(
        &self,
        _handle: &SandboxHandle,
        command: &[String],
    ) -> Result<(), SandboxError> {
        if self.config.fail_launch {
            return Err(SandboxError::CommandFailed {
                step: "launch",
                detail: "mock launch failure".to_string(),
            });
        }
        self.state.lock().launches.push(command.to_vec());
        Ok(())
    }

    async fn exec_sync(
        &self,
        _handle: &SandboxHandle,
        command: &[String],
    ) -> Result<CommandOutput, SandboxError> {
        let silent_ok = CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        };

        let output = match command {
            [cmd, path] if cmd == "touch" => {
                let mut state = self.state.lock();
                state.files.insert(path.clone());
                state.touched.push(path.clone());
                silent_ok
            }
            [cmd, path] if cmd == "cat" => self.serve_status(path),
            [cmd, rest @ ..] if cmd == "rm" => {
                let mut state = self.state.lock();
                for path in rest.iter().filter(|p| *p != "-f") {
                    state.files.remove(path);
                    state.removed.push(path.clone());
                }
                silent_ok
            }
            _ => silent_ok,
        };
        Ok(output)
    }
}
