//! Test command execution.
//!
//! Commands run through `sh -c` with a hard timeout. Both output streams are
//! drained concurrently with the wait so a chatty test runner cannot block
//! on a full pipe.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Exit status POSIX shells use for "command not found".
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// A command to run, with where and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code, or -1 if the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn run(&self, cmd: &TestCommand) -> Result<ExecOutput>;
}

/// Runs commands with the local POSIX shell.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell binary (must accept `-c`).
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf).await;
        }
        buf
    })
}

#[async_trait]
impl TestExecutor for ShellExecutor {
    async fn run(&self, cmd: &TestCommand) -> Result<ExecOutput> {
        let mut process = Command::new(&self.shell);
        process
            .arg("-c")
            .arg(&cmd.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &cmd.working_dir {
            if !dir.is_dir() {
                return Err(ExecError::Other(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
            process.current_dir(dir);
        }

        info!(
            command = %cmd.command,
            timeout_sec = cmd.timeout.as_secs(),
            "running test command"
        );
        let start = Utc::now();

        let mut child = process.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExecError::NotFound(e.to_string()),
            _ => ExecError::Other(e.to_string()),
        })?;

        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        let exit_code = tokio::select! {
            result = child.wait() => {
                result.map_err(|e| ExecError::Other(e.to_string()))?.code().unwrap_or(-1)
            }
            () = tokio::time::sleep(cmd.timeout) => {
                // Kill the process on timeout to prevent zombies
                if let Err(e) = child.kill().await {
                    warn!(command = %cmd.command, error = %e, "failed to kill timed-out process");
                }
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                warn!(command = %cmd.command, timeout_sec = cmd.timeout.as_secs(), "test command timed out");
                return Err(ExecError::Timeout(cmd.timeout));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration_ms = (Utc::now() - start).num_milliseconds();

        let output = ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };

        if exit_code == EXIT_COMMAND_NOT_FOUND {
            let detail = output.stderr.trim();
            let detail = if detail.is_empty() {
                format!("exit status {EXIT_COMMAND_NOT_FOUND}")
            } else {
                detail.to_string()
            };
            warn!(command = %cmd.command, detail = %detail, "test command not found");
            return Err(ExecError::NotFound(detail));
        }

        debug!(
            command = %cmd.command,
            exit_code,
            duration_ms,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "test command finished"
        );
        Ok(output)
    }
}
