//! Shell runner: execute system commands for the terminal agent.
//!
//! Supports command allowlisting, a working directory, and timeout.

use async_trait::async_trait;
use agentbus_core::error::CommandError;
use agentbus_core::fs::{CommandOutput, CommandRunner};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Execute shell commands with safety constraints.
pub struct ShellRunner {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ShellRunner {
    pub fn new(allowed_commands: Vec<String>, timeout: Duration) -> Self {
        Self {
            allowed_commands,
            timeout,
            working_dir: None,
        }
    }

    pub fn from_config(config: &agentbus_config::TerminalConfig) -> Self {
        Self::new(
            config.allowed_commands.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Run commands inside this directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, CommandError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(CommandError::Empty);
        }

        if !self.is_command_allowed(command) {
            let base = command.split_whitespace().next().unwrap_or("");
            return Err(CommandError::NotAllowed(base.to_string()));
        }

        debug!(command = %command, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CommandError::Timeout {
                command: command.to_string(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| CommandError::SpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            warn!(command = %command, exit_code, "Command failed");
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(allowed: &[&str]) -> ShellRunner {
        ShellRunner::new(
            allowed.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn allowlist_check() {
        let runner = runner(&["ls", "cat", "git"]);
        assert!(runner.is_command_allowed("ls -la"));
        assert!(runner.is_command_allowed("git status"));
        assert!(!runner.is_command_allowed("rm -rf /"));
        assert!(!runner.is_command_allowed("sudo something"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        assert!(runner(&[]).is_command_allowed("anything goes"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_echo() {
        let output = runner(&["echo"]).run("echo hello").await.unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let output = runner(&[]).run("exit 3").await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(output.render().starts_with("[exit code: 3]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn working_dir_is_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let output = runner(&[])
            .with_working_dir(dir.path())
            .run("ls")
            .await
            .unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = ShellRunner::new(vec![], Duration::from_millis(100));
        let err = runner.run("sleep 5").await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn blocked_and_empty_commands() {
        let runner = runner(&["ls"]);
        assert!(matches!(
            runner.run("rm -rf /").await,
            Err(CommandError::NotAllowed(cmd)) if cmd == "rm"
        ));
        assert!(matches!(runner.run("   ").await, Err(CommandError::Empty)));
    }
}
