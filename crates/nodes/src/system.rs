//! `SystemRunner`: the production [`CommandRunner`] backed by `tokio::process`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{CommandOptions, CommandRunner, NodeError};

/// Spawns real child processes.
///
/// Children are spawned with `kill_on_drop`, so dropping the future that
/// awaits a command (cancellation, timeout) terminates the process instead
/// of leaving it running in the background.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(name: &str, args: &[String], options: &CommandOptions) -> Result<Command, NodeError> {
        if name.trim().is_empty() {
            return Err(NodeError::InvalidRequest("command name is empty".into()));
        }

        let mut cmd = Command::new(name);
        cmd.args(args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run_cmd(
        &self,
        name: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<(), NodeError> {
        debug!(command = name, ?args, "running command");

        let status = Self::command(name, args, options)?
            .status()
            .await
            .map_err(|e| NodeError::Spawn {
                command: name.to_owned(),
                message: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(NodeError::NonZeroExit {
                command: name.to_owned(),
                code: status.code(),
                output: String::new(),
            })
        }
    }

    async fn run_cmd_output(
        &self,
        name: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<String, NodeError> {
        debug!(command = name, ?args, "running command (capturing output)");

        let output = Self::command(name, args, options)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NodeError::Spawn {
                command: name.to_owned(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() { stdout.trim().to_owned() } else { stderr.trim().to_owned() };
        Err(NodeError::NonZeroExit {
            command: name.to_owned(),
            code: output.status.code(),
            output: detail,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = SystemRunner::new()
            .run_cmd_output("echo", &args(&["hello"]), &CommandOptions::default())
            .await
            .expect("echo should succeed");
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let err = SystemRunner::new()
            .run_cmd("sh", &args(&["-c", "exit 3"]), &CommandOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::NonZeroExit { code: Some(3), .. }));
    }

    #[tokio::test]
    async fn extra_environment_is_visible_to_the_child() {
        let mut options = CommandOptions::default();
        options.env.insert("RUNBOOK_TEST_VALUE".into(), "42".into());

        let out = SystemRunner::new()
            .run_cmd_output("sh", &args(&["-c", "echo $RUNBOOK_TEST_VALUE"]), &options)
            .await
            .unwrap();
        assert_eq!(out.trim(), "42");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = SystemRunner::new()
            .run_cmd("definitely-not-a-real-binary-7f3a", &[], &CommandOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Spawn { .. }));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let err = SystemRunner::new()
            .run_cmd("  ", &[], &CommandOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidRequest(_)));
    }
}
