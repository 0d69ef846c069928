//! Shell command execution for commands requested by the model.
//!
//! With an empty allow-list, command lines go through the platform shell in a
//! fixed working directory. With an allow-list, no shell is involved: the line
//! is split on whitespace, the first word must be a listed program, and it is
//! spawned directly with the rest as arguments. Shell syntax is refused
//! outright in that mode so nothing the model writes is silently taken
//! literally.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ExecutorConfig;
use crate::error::RelayError;

/// Characters with shell meaning, refused when the allow-list is active.
const SHELL_SYNTAX: &[char] = &[
    ';', '&', '|', '`', '$', '<', '>', '(', ')', '{', '}', '\\', '\'', '"', '*', '?', '~', '\n', '\r',
];

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How a command line will be spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Whole line handed to the platform shell
    Shell(String),
    /// Listed program spawned without a shell
    Direct { program: String, args: Vec<String> },
}

pub struct ShellExecutor {
    working_dir: Option<PathBuf>,
    allowed_programs: Vec<String>,
    timeout: Option<Duration>,
}

impl ShellExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            working_dir: config.working_dir.clone(),
            allowed_programs: config.allowed_programs.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Check a command line against the allow-list and decide how to spawn it.
    pub fn plan(&self, command: &str) -> Result<Invocation, RelayError> {
        if command.trim().is_empty() {
            return Err(RelayError::Shell("empty command".to_string()));
        }
        if self.allowed_programs.is_empty() {
            return Ok(Invocation::Shell(command.to_string()));
        }

        if let Some(c) = command.trim().chars().find(|c| SHELL_SYNTAX.contains(c)) {
            return Err(RelayError::Shell(format!(
                "Invalid character {:?} in command: shell syntax is not allowed",
                c
            )));
        }

        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_default();
        if !self.allowed_programs.contains(&program) {
            return Err(RelayError::Shell(format!(
                "Command '{}' not in allow-list: {:?}",
                program, self.allowed_programs
            )));
        }

        Ok(Invocation::Direct {
            program,
            args: words.collect(),
        })
    }

    /// Run a command line and capture its output.
    pub async fn run(&self, command: &str) -> Result<CommandOutput, RelayError> {
        let mut cmd = match self.plan(command)? {
            Invocation::Shell(line) => shell_command(&line),
            Invocation::Direct { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        info!(command = %command, cwd = ?self.working_dir, "executing shell command");

        let child = cmd
            .spawn()
            .map_err(|e| RelayError::Shell(format!("Failed to execute command: {}", e)))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    warn!(command = %command, timeout_secs = limit.as_secs(), "shell command timed out");
                    RelayError::Shell(format!(
                        "Command timed out after {}s: {}",
                        limit.as_secs(),
                        command
                    ))
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| RelayError::Shell(format!("Failed to execute command: {}", e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
