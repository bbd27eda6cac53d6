//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the definition and plans its step groups.
//! 2. Runs groups in order. A singleton group runs inline; a larger group
//!    spawns one worker per step on a `JoinSet` and waits for all of them
//!    before the next group may start.
//! 3. Writes every `StepResult` to the slot matching the step's declaration
//!    index, regardless of completion order.
//! 4. Aborts on the first failed step that may not continue on error.
//! 5. Enforces the settings timeout by cancelling the run when it expires.
//! 6. Sends the end-of-run summary according to the notification mode.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::EngineError;
use crate::dispatch::Dispatcher;
use crate::grouping::{StepGroup, plan_step_groups};
use crate::models::{
    ExecutionContext, ExecutionStatus, FailureStrategy, NotificationMode, StepResult, StepStatus,
    WorkflowExecution, WorkflowStep,
};
use crate::step::StepExecutor;
use crate::validate::ensure_runnable;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Delay before the first retry; doubles for every further retry.
    pub retry_base_delay: Duration,
    /// Upper bound for a single back-off delay.
    pub max_retry_delay: Duration,
    /// Channel the end-of-run summary is sent to.
    pub notification_channel: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            notification_channel: "log".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator; one instance can drive any number of runs.
pub struct WorkflowExecutor {
    steps: Arc<StepExecutor>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(dispatcher: Dispatcher, config: ExecutorConfig) -> Self {
        Self {
            steps: Arc::new(StepExecutor::new(dispatcher, config.clone())),
            config,
        }
    }

    /// Run `execution` to completion and record its final status.
    ///
    /// On return `execution.status` is `completed` or `failed`,
    /// `end_time` is set, and `error` carries the aggregate error text.
    ///
    /// # Errors
    /// Configuration errors (invalid definition, unschedulable
    /// dependencies) before any step runs, or the batch error from
    /// [`execute_workflow_steps`](Self::execute_workflow_steps).
    #[instrument(skip_all, fields(workflow = %execution.workflow.name, execution_id = %execution.id))]
    pub async fn execute(
        &self,
        execution: &mut WorkflowExecution,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if let Err(e) = ensure_runnable(&execution.workflow) {
            error!("refusing to run workflow '{}': {}", execution.workflow.name, e);
            execution.status = ExecutionStatus::Failed;
            execution.error = Some(e.to_string());
            execution.end_time = Some(Utc::now());
            return Err(e);
        }

        info!(
            "executing workflow '{}' ({} steps) as {}",
            execution.workflow.name,
            execution.workflow.steps.len(),
            execution.id
        );

        let outcome = self.execute_workflow_steps(execution, cancel).await;

        execution.end_time = Some(Utc::now());
        match &outcome {
            Ok(()) => {
                execution.status = ExecutionStatus::Completed;
                info!("{}", execution.summary());
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.to_string());
                error!("{}", execution.summary());
            }
        }

        self.notify_completion(execution).await;
        outcome
    }

    /// Drive every step group of `execution` in order.
    ///
    /// # Errors
    /// - [`EngineError::StepFailed`] naming the first failed step (in
    ///   declaration order) that may not continue on error. Later groups do
    ///   not run and their result slots stay `pending`.
    /// - [`EngineError::Cancelled`] if cancellation (or the settings
    ///   timeout) hits while the run is in progress and no step failure
    ///   already aborted it.
    /// - [`EngineError::WorkerFailed`] if a step worker panics; the results
    ///   of its siblings are still recorded.
    /// - Any grouping error from [`plan_step_groups`].
    pub async fn execute_workflow_steps(
        &self,
        execution: &mut WorkflowExecution,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let steps = &execution.workflow.steps;
        let groups = plan_step_groups(steps)?;

        if execution.results.len() != steps.len() {
            execution.results.resize(steps.len(), StepResult::default());
        }

        let run_token = cancel.child_token();
        let settings = &execution.workflow.settings;
        let budget = settings.timeout_duration();
        if budget.is_none() && !settings.timeout.is_empty() {
            debug!("ignoring unparsable workflow timeout '{}'", settings.timeout);
        }
        let _budget = budget.map(|budget| BudgetTimer::start(budget, run_token.clone()));

        let continue_all = execution.workflow.settings.failure_strategy == FailureStrategy::Continue;
        let ctx = Arc::new(execution.context.clone());
        let total = groups.len();

        for (group_index, group) in groups.iter().enumerate() {
            if run_token.is_cancelled() {
                warn!("cancelled before step group {}/{}", group_index + 1, total);
                return Err(EngineError::Cancelled);
            }

            info!(
                "executing step group {}/{} ({} steps)",
                group_index + 1,
                total,
                group.len()
            );

            let (outcomes, worker_failure) = self
                .execute_group(&execution.workflow.steps, group, &ctx, &run_token)
                .await;
            for (index, result) in outcomes {
                execution.results[index] = result;
            }
            if let Some(message) = worker_failure {
                return Err(EngineError::WorkerFailed(message));
            }

            let unrecovered = group.iter().copied().find(|&index| {
                let result = &execution.results[index];
                result.status == StepStatus::Failed
                    && !(result.step.continue_on_error || continue_all)
            });
            if let Some(index) = unrecovered {
                let result = &execution.results[index];
                return Err(EngineError::StepFailed {
                    step: result.step.name.clone(),
                    message: result.error.clone().unwrap_or_default(),
                });
            }
        }

        if run_token.is_cancelled() {
            warn!("workflow cancelled during its final step group");
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Run one group and return `(declaration index, result)` pairs for
    /// every step in it, plus the first worker failure, if any.
    ///
    /// A worker that dies without producing a result (a panic) has its step
    /// recorded as failed; its siblings are still awaited.
    async fn execute_group(
        &self,
        steps: &[WorkflowStep],
        group: &StepGroup,
        ctx: &Arc<ExecutionContext>,
        cancel: &CancellationToken,
    ) -> (Vec<(usize, StepResult)>, Option<String>) {
        if let [index] = group.as_slice() {
            let result = self
                .steps
                .execute_workflow_step(&steps[*index], ctx, cancel)
                .await;
            return (vec![(*index, result)], None);
        }

        let mut join_set = JoinSet::new();
        for &index in group {
            let executor = Arc::clone(&self.steps);
            let step = steps[index].clone();
            let ctx = Arc::clone(ctx);
            let token = cancel.clone();

            join_set.spawn(async move {
                let result = executor.execute_workflow_step(&step, &ctx, &token).await;
                (index, result)
            });
        }

        let mut outcomes = Vec::with_capacity(group.len());
        let mut worker_failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("step worker failed: {e}");
                    worker_failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        if let Some(message) = &worker_failure {
            for &index in group {
                if outcomes.iter().any(|(done, _)| *done == index) {
                    continue;
                }
                let lost = StepResult {
                    step: steps[index].clone(),
                    status: StepStatus::Failed,
                    end_time: Some(Utc::now()),
                    error: Some(format!("step worker failed: {message}")),
                    ..StepResult::default()
                };
                outcomes.push((index, lost));
            }
        }
        (outcomes, worker_failure)
    }

    async fn notify_completion(&self, execution: &WorkflowExecution) {
        let failed = execution.status == ExecutionStatus::Failed;
        let wanted = match execution.workflow.settings.notification_mode {
            NotificationMode::Always => true,
            NotificationMode::OnFailure => failed,
            NotificationMode::Never => false,
        };
        if !wanted {
            return;
        }

        let channel = self.config.notification_channel.as_str();
        if let Err(e) = self
            .steps
            .dispatcher()
            .notifier()
            .notify(channel, &execution.summary())
            .await
        {
            warn!(channel, "run summary not delivered: {e}");
        }
    }
}

/// Cancels a token once the run budget elapses; disarmed on drop.
struct BudgetTimer(JoinHandle<()>);

impl BudgetTimer {
    fn start(budget: Duration, token: CancellationToken) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            warn!("workflow timeout of {:?} reached, cancelling", budget);
            token.cancel();
        }))
    }
}

impl Drop for BudgetTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}
