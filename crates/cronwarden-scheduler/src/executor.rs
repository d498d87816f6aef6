//! Shell command execution.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use cronwarden_protocols::{ExecutionStatus, Outcome};

/// Runs one command and normalizes its result.
///
/// Never fails: a command that cannot be launched is reported as a
/// `Failed` outcome carrying a diagnostic in `stderr`.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Outcome;
}

/// Executes command text through a shell interpreter.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    shell_flag: String,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ShellExecutor {
    /// Create an executor using the platform shell and no timeout.
    pub fn new() -> Self {
        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self {
            shell: shell.to_string(),
            shell_flag: flag.to_string(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Use a different shell, e.g. `bash` with `-c`.
    pub fn with_shell(mut self, shell: impl Into<String>, flag: impl Into<String>) -> Self {
        self.shell = shell.into();
        self.shell_flag = flag.into();
        self
    }

    /// Run commands from this directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill commands that run longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.shell_flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Outcome {
        let mut cmd = self.command(command);
        let started_at = Utc::now();

        let output = match self.timeout {
            Some(limit) => match timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(command, ?limit, "Command timed out and was killed");
                    return Outcome {
                        status: ExecutionStatus::Failed,
                        stdout: String::new(),
                        stderr: format!("Command timed out after {}s and was killed", limit.as_secs()),
                        exit_code: None,
                        started_at,
                    };
                }
            },
            None => cmd.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(command, error = %e, "Failed to launch command");
                return Outcome::launch_failure(
                    started_at,
                    format!("Failed to launch command: {}", e),
                );
            }
        };

        let exit_code = output.status.code();
        let status = if output.status.success() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };
        debug!(command, ?exit_code, %status, "Command finished");

        Outcome {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            started_at,
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
