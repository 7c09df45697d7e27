//! Remediation command execution.
//!
//! Commands run through a [`CommandRunner`] seam so the engine can be
//! exercised without touching the host network stack. Execution is
//! best-effort: a failing command marks the batch unsuccessful but does not
//! stop later commands unless fatal-on-first-failure is configured.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::heal::ActionResult;

/// Captured outcome of one shell command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

/// Runs a single remediation command.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Executes commands via `sh -c`.
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .with_context(|| format!("failed to spawn command: {command}"))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

/// Pretends every command succeeds. Default in simulation mode so the
/// daemon never mutates the host's real network configuration.
pub struct SimulatedRunner;

#[async_trait]
impl CommandRunner for SimulatedRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        info!(%command, "simulating command execution");
        Ok(CommandOutput {
            exit_code: 0,
            output: "command simulated successfully".to_string(),
        })
    }
}

/// Run a strategy's commands in order, capturing per-command messages.
pub async fn run_commands(
    runner: &dyn CommandRunner,
    commands: &[String],
    fatal_on_first_failure: bool,
) -> ActionResult {
    let mut success = true;
    let mut messages = Vec::new();

    for command in commands {
        info!(%command, "executing remediation command");
        match runner.run(command).await {
            Ok(out) => {
                messages.push(format!(
                    "Command '{command}' completed with exit code {}",
                    out.exit_code
                ));
                if out.exit_code != 0 {
                    success = false;
                    messages.push(format!("Command failed: {}", out.output.trim()));
                    if fatal_on_first_failure {
                        break;
                    }
                }
            }
            Err(e) => {
                success = false;
                messages.push(format!("Error executing '{command}': {e}"));
                if fatal_on_first_failure {
                    break;
                }
            }
        }
    }

    ActionResult { success, messages }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails commands containing "bad", succeeds otherwise.
    pub(crate) struct ScriptedRunner;

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, command: &str) -> Result<CommandOutput> {
            if command.contains("bad") {
                Ok(CommandOutput {
                    exit_code: 1,
                    output: "boom".to_string(),
                })
            } else {
                Ok(CommandOutput {
                    exit_code: 0,
                    output: "ok".to_string(),
                })
            }
        }
    }

    fn cmds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_commands_succeed() {
        let result = run_commands(&SimulatedRunner, &cmds(&["a", "b"]), false).await;
        assert!(result.success);
        assert_eq!(result.messages.len(), 2);
        assert!(result.messages[0].contains("exit code 0"));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_commands() {
        let result = run_commands(&ScriptedRunner, &cmds(&["bad", "good"]), false).await;
        assert!(!result.success);
        // bad: completion + failure message, good: completion message.
        assert_eq!(result.messages.len(), 3);
        assert!(result.messages[1].contains("Command failed: boom"));
        assert!(result.messages[2].contains("'good'"));
    }

    #[tokio::test]
    async fn test_fatal_on_first_failure_stops_batch() {
        let result = run_commands(&ScriptedRunner, &cmds(&["bad", "good"]), true).await;
        assert!(!result.success);
        assert_eq!(result.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_shell_runner_captures_exit_code() {
        let runner = ShellRunner;
        let out = runner.run("exit 3").await.unwrap();
        assert_eq!(out.exit_code, 3);

        let out = runner.run("echo hello").await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.output.contains("hello"));
    }
}
