//! SafeCommandExecutor: whitelisted external command execution
//!
//! The default providers drive the `aws` and `docker` CLIs through this
//! executor. Arguments are passed as a vector and never interpolated into a
//! shell string; secrets such as registry passwords go through stdin.
//!
//! # Example
//!
//! ```rust,no_run
//! use asset_publisher::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(30));
//!
//! let output = executor.execute("docker", &["--version"]).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Commands the executor runs unless configured otherwise
const ALLOWED_COMMANDS: &[&str] = &["aws", "docker"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    #[error("Working directory does not exist: {}", .0.display())]
    InvalidWorkingDirectory(PathBuf),

    /// Binary not found, permission denied, broken pipe
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command timeout after {0:?}")]
    Timeout(Duration),

    #[error("'{command}' exited with {status}: {stderr}")]
    NonZeroExit {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Per-call extras: environment and stdin
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub env: HashMap<String, String>,
    pub stdin: Option<String>,
}

/// Safe command executor with whitelist, working directory and timeout
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    working_dir: PathBuf,
    timeout: Option<Duration>,
    allowed: Vec<String>,
}

impl SafeCommandExecutor {
    /// Create an executor running in `working_dir`, which must exist
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.exists() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
            allowed: ALLOWED_COMMANDS.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Replace the command whitelist
    pub fn with_allowed_commands(mut self, commands: &[&str]) -> Self {
        self.allowed = commands.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Commands exceeding this duration are killed
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run a command and capture its output, whatever the exit status
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.execute_with(command, args, &ExecOptions::default()).await
    }

    pub async fn execute_with(
        &self,
        command: &str,
        args: &[&str],
        options: &ExecOptions,
    ) -> Result<CommandOutput, CommandError> {
        if !self.allowed.iter().any(|c| c == command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        debug!(command, ?args, "executing command");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .envs(&options.env)
            .stdin(if options.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| CommandError::ExecutionFailed(format!("{}: {}", command, e)))?;

        if let (Some(input), Some(mut stdin)) = (&options.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;
            // closes stdin so the child sees EOF
            drop(stdin);
        }

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| CommandError::Timeout(timeout))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`Self::execute_with`], but a non-zero exit status is an error
    pub async fn run_checked(
        &self,
        command: &str,
        args: &[&str],
        options: &ExecOptions,
    ) -> Result<CommandOutput, CommandError> {
        let output = self.execute_with(command, args, options).await?;
        if !output.success {
            return Err(CommandError::NonZeroExit {
                command: format!("{} {}", command, args.first().copied().unwrap_or_default()),
                status: output
                    .code
                    .map(|c| format!("status {}", c))
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}
