//! Command dispatch: maps a step's kind to a concrete action.
//!
//! | kind                 | action                                                  |
//! |----------------------|---------------------------------------------------------|
//! | `shell` / `command`  | run `command` with `args` through the `CommandRunner`   |
//! | `script`             | resolve `command` as a script path, then run it          |
//! | `http`               | `command` is the method, `args[0]` the URL, `args[1]` the body |
//! | `notification`       | `command` is the channel, `args` joined form the message |
//!
//! Notifications are best-effort: a delivery failure is logged and reported
//! in the step output, never as a step failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nodes::{CommandOptions, CommandRunner, HttpCaller, HttpRequest, NodeError, Notifier};
use tracing::warn;

use crate::StepError;
use crate::models::{ExecutionContext, StepKind, WorkflowStep};

/// Holds the capabilities steps are dispatched to.
#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn CommandRunner>,
    http: Arc<dyn HttpCaller>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        http: Arc<dyn HttpCaller>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { runner, http, notifier }
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Perform one attempt at `step` and return its output.
    ///
    /// # Errors
    /// [`StepError::UnsupportedStepType`] for unknown kinds, otherwise the
    /// capability's [`NodeError`].
    pub async fn execute_step_command(
        &self,
        step: &WorkflowStep,
        ctx: &ExecutionContext,
    ) -> Result<String, StepError> {
        match &step.kind {
            StepKind::Shell | StepKind::Command => self.run_command(step, ctx).await,
            StepKind::Script => self.run_script(step, ctx).await,
            StepKind::Http => self.call_http(step).await,
            StepKind::Notification => Ok(self.send_notification(step).await),
            StepKind::Unsupported(kind) => Err(StepError::UnsupportedStepType(kind.clone())),
        }
    }

    async fn run_command(&self, step: &WorkflowStep, ctx: &ExecutionContext) -> Result<String, StepError> {
        if step.command.trim().is_empty() {
            return Err(invalid(format!("step '{}' has no command", step.name)));
        }
        let output = self
            .runner
            .run_cmd_output(&step.command, &step.args, &command_options(step, ctx))
            .await?;
        Ok(output)
    }

    async fn run_script(&self, step: &WorkflowStep, ctx: &ExecutionContext) -> Result<String, StepError> {
        if step.command.trim().is_empty() {
            return Err(invalid(format!("step '{}' has no script path", step.name)));
        }

        let mut path = PathBuf::from(&step.command);
        if path.is_relative() {
            if let Some(dir) = &step.working_dir {
                path = Path::new(dir).join(path);
            }
        }
        let script = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| invalid(format!("script not found: {} ({e})", path.display())))?;

        let output = self
            .runner
            .run_cmd_output(&script.to_string_lossy(), &step.args, &command_options(step, ctx))
            .await?;
        Ok(output)
    }

    async fn call_http(&self, step: &WorkflowStep) -> Result<String, StepError> {
        let method = if step.command.trim().is_empty() { "GET" } else { step.command.trim() };
        let url = step
            .args
            .first()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                invalid(format!("http step '{}' needs a target URL as its first argument", step.name))
            })?;

        let mut request = HttpRequest::new(method, url.trim());
        if let Some(body) = step.args.get(1) {
            request = request.with_body(body.clone());
        }

        let response = self.http.call(&request).await?;
        Ok(format!("HTTP {}: {}", response.status, response.body))
    }

    async fn send_notification(&self, step: &WorkflowStep) -> String {
        let channel = if step.command.trim().is_empty() { "log" } else { step.command.trim() };
        let message = if step.args.is_empty() {
            format!("notification from step '{}'", step.name)
        } else {
            step.args.join(" ")
        };

        match self.notifier.notify(channel, &message).await {
            Ok(()) => format!("notification sent to '{channel}'"),
            Err(e) => {
                warn!(step = step.name.as_str(), channel, "notification not delivered: {e}");
                format!("notification to '{channel}' not delivered: {e}")
            }
        }
    }
}

fn invalid(message: String) -> StepError {
    StepError::Node(NodeError::InvalidRequest(message))
}

/// Context environment with the step's own variables on top.
fn command_options(step: &WorkflowStep, ctx: &ExecutionContext) -> CommandOptions {
    let mut env = ctx.environment.clone();
    env.extend(step.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
    CommandOptions {
        env,
        working_dir: step.working_dir.as_ref().map(PathBuf::from),
    }
}
