//! Docker CLI implementation of the sandbox gateway.
//!
//! Every verb shells out to `docker`: `inspect` to resolve the container,
//! `cp` with a streamed tar archive for uploads, `exec -d` for detached
//! launches and plain `exec` for synchronous commands. All calls are
//! bounded by the configured timeouts.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{archive, CommandOutput, SandboxError, SandboxGateway, SandboxHandle};
use crate::config::SandboxSettings;

pub struct DockerGateway {
    docker_bin: PathBuf,
    container: String,
    exec_timeout: Duration,
    upload_timeout: Duration,
}

impl DockerGateway {
    /// Build a gateway from settings, resolving the docker binary from PATH
    /// unless an explicit path is configured
    pub fn new(settings: &SandboxSettings) -> Result<Self, SandboxError> {
        let docker_bin = match &settings.docker_bin {
            Some(path) => path.clone(),
            None => {
                which::which("docker").map_err(|e| SandboxError::DockerMissing(e.to_string()))?
            }
        };

        Ok(Self {
            docker_bin,
            container: settings.container_name.clone(),
            exec_timeout: Duration::from_secs(settings.exec_timeout_secs),
            upload_timeout: Duration::from_secs(settings.upload_timeout_secs),
        })
    }

    async fn run_docker<I, S>(
        &self,
        step: &'static str,
        args: I,
        bound: Duration,
    ) -> Result<std::process::Output, SandboxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = timeout(bound, cmd.output())
            .await
            .map_err(|_| SandboxError::Timeout(bound))?
            .map_err(|e| SandboxError::Io { step, source: e })?;
        Ok(output)
    }
}

/// Split a remote path into the directory the archive is extracted into
/// and the entry name inside it
fn split_remote(remote: &str) -> (&str, &str) {
    match remote.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => (".", remote),
    }
}

#[async_trait]
impl SandboxGateway for DockerGateway {
    async fn resolve(&self) -> Result<SandboxHandle, SandboxError> {
        let unavailable = |detail: String| SandboxError::Unavailable {
            name: self.container.clone(),
            detail,
        };

        let output = match self
            .run_docker(
                "inspect",
                ["inspect", "-f", "{{.State.Running}}", self.container.as_str()],
                self.exec_timeout,
            )
            .await
        {
            Ok(output) => output,
            Err(e) => return Err(unavailable(e.to_string())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(unavailable(if stderr.is_empty() {
                "container not found".to_string()
            } else {
                stderr
            }));
        }

        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if state != "true" {
            return Err(unavailable(format!("container state is {}", state)));
        }

        Ok(SandboxHandle {
            name: self.container.clone(),
        })
    }

    async fn upload(
        &self,
        handle: &SandboxHandle,
        local: &Path,
        remote: &str,
    ) -> Result<(), SandboxError> {
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|e| SandboxError::Io {
                step: "upload",
                source: e,
            })?;

        let metadata = std::fs::metadata(local).map_err(|e| SandboxError::Io {
            step: "upload",
            source: e,
        })?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o777
        };
        #[cfg(not(unix))]
        let mode = 0o644;

        let (dir, name) = split_remote(remote);
        let archive = archive::file_archive(name, &bytes, mode, mtime).map_err(|e| {
            SandboxError::Io {
                step: "upload",
                source: e,
            }
        })?;

        let mut cmd = Command::new(&self.docker_bin);
        cmd.arg("cp")
            .arg("-")
            .arg(format!("{}:{}", handle.name, dir));
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SandboxError::Io {
            step: "upload",
            source: e,
        })?;
        let mut stdin = child.stdin.take().ok_or_else(|| SandboxError::CommandFailed {
            step: "upload",
            detail: "no stdin pipe".to_string(),
        })?;

        let transfer = async {
            stdin.write_all(&archive).await.map_err(|e| SandboxError::Io {
                step: "upload",
                source: e,
            })?;
            stdin.shutdown().await.map_err(|e| SandboxError::Io {
                step: "upload",
                source: e,
            })?;
            drop(stdin);
            child.wait_with_output().await.map_err(|e| SandboxError::Io {
                step: "upload",
                source: e,
            })
        };

        let output = timeout(self.upload_timeout, transfer)
            .await
            .map_err(|_| SandboxError::Timeout(self.upload_timeout))??;

        if !output.status.success() {
            return Err(SandboxError::CommandFailed {
                step: "upload",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn exec_detached(
        &self,
        handle: &SandboxHandle,
        command: &[String],
    ) -> Result<(), SandboxError> {
        let mut args: Vec<String> = vec!["exec".to_string(), "-d".to_string(), handle.name.clone()];
        args.extend(command.iter().cloned());

        let output = self.run_docker("launch", args, self.exec_timeout).await?;
        if !output.status.success() {
            return Err(SandboxError::CommandFailed {
                step: "launch",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn exec_sync(
        &self,
        handle: &SandboxHandle,
        command: &[String],
    ) -> Result<CommandOutput, SandboxError> {
        let mut args: Vec<String> = vec!["exec".to_string(), handle.name.clone()];
        args.extend(command.iter().cloned());

        let output = self.run_docker("exec", args, self.exec_timeout).await?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
