//! Per-step orchestration: condition check, retry loop, result recording.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::StepError;
use crate::condition::evaluate_step_conditions;
use crate::dispatch::Dispatcher;
use crate::executor::ExecutorConfig;
use crate::models::{ExecutionContext, StepResult, StepStatus, WorkflowStep};

/// Runs a single step to a terminal [`StepResult`].
pub struct StepExecutor {
    dispatcher: Dispatcher,
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(dispatcher: Dispatcher, config: ExecutorConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Execute `step` against `ctx`.
    ///
    /// 1. Unmet conditions ⇒ `skipped`, nothing dispatched.
    /// 2. Otherwise up to `retry_count + 1` attempts, stopping at the first
    ///    success, with back-off between attempts.
    /// 3. `cancel` stops new attempts and aborts the one in flight.
    ///
    /// Never returns an error: failures are recorded in the result.
    #[instrument(skip_all, fields(step = %step.name, kind = %step.kind))]
    pub async fn execute_workflow_step(
        &self,
        step: &WorkflowStep,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepResult {
        let clock = Instant::now();
        let mut result = StepResult {
            step: step.clone(),
            start_time: Some(Utc::now()),
            ..StepResult::default()
        };

        if !evaluate_step_conditions(&step.conditions, ctx) {
            info!("step '{}' skipped: conditions not met", step.name);
            result.status = StepStatus::Skipped;
            return finish(result, clock);
        }

        info!("executing step '{}'", step.name);
        let attempts = step.retry_count.saturating_add(1);
        let timeout = step.timeout_duration();
        if timeout.is_none() && !step.timeout.is_empty() {
            debug!("ignoring unparsable timeout '{}' on step '{}'", step.timeout, step.name);
        }

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                info!(
                    "retrying step '{}' (attempt {}/{}) in {:?}",
                    step.name,
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                if let Some(last) = &result.error {
                    warn!("step '{}' cancelled before retrying; last error: {}", step.name, last);
                } else {
                    result.error = Some(StepError::Cancelled.to_string());
                }
                break;
            }

            result.retry_count = attempt;
            match self.attempt(step, ctx, timeout, cancel).await {
                Ok(output) => {
                    result.status = StepStatus::Completed;
                    result.output = output;
                    result.error = None;
                    break;
                }
                Err(e) => {
                    warn!(
                        "step '{}' attempt {}/{} failed: {}",
                        step.name,
                        attempt + 1,
                        attempts,
                        e
                    );
                    result.error = Some(e.to_string());
                }
            }
        }

        if result.status == StepStatus::Completed {
            info!("step '{}' completed", step.name);
        } else {
            result.status = StepStatus::Failed;
            error!(
                "step '{}' failed after {} attempt(s): {}",
                step.name,
                result.retry_count + 1,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        finish(result, clock)
    }

    /// One dispatch, bounded by the step timeout and raced against
    /// cancellation. Losing the race drops the dispatch future, which kills
    /// a spawned child or aborts an HTTP request.
    async fn attempt(
        &self,
        step: &WorkflowStep,
        ctx: &ExecutionContext,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<String, StepError> {
        let dispatch = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, self.dispatcher.execute_step_command(step, ctx))
                    .await
                    .map_err(|_| StepError::TimedOut(limit))?,
                None => self.dispatcher.execute_step_command(step, ctx).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepError::Cancelled),
            outcome = dispatch => outcome,
        }
    }

    /// `retry_base_delay * 2^(retry-1)`, capped at `max_retry_delay`.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.config
            .retry_base_delay
            .saturating_mul(factor)
            .min(self.config.max_retry_delay)
    }
}

fn finish(mut result: StepResult, clock: Instant) -> StepResult {
    result.end_time = Some(Utc::now());
    result.duration = clock.elapsed();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nodes::mock::{MockBehaviour, MockHttpCaller, MockRunner, RecordingNotifier};
    use serde_json::json;

    use crate::models::StepCondition;

    fn executor(runner: MockRunner, config: ExecutorConfig) -> (Arc<MockRunner>, StepExecutor) {
        let runner = Arc::new(runner);
        let dispatcher = Dispatcher::new(
            runner.clone(),
            Arc::new(MockHttpCaller::responding(200, "")),
            Arc::new(RecordingNotifier::new()),
        );
        (runner, StepExecutor::new(dispatcher, config))
    }

    fn no_delay() -> ExecutorConfig {
        ExecutorConfig {
            retry_base_delay: Duration::ZERO,
            ..ExecutorConfig::default()
        }
    }

    #[tokio::test]
    async fn successful_step_completes_without_retries() {
        let (runner, exec) = executor(MockRunner::succeeding("hello"), no_delay());
        let step = WorkflowStep::shell("greet", "echo", &["hello"]);

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.retry_count, 0);
        assert_eq!(result.output, "hello");
        assert!(result.error.is_none());
        assert!(result.start_time.is_some() && result.end_time.is_some());
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn always_failing_step_exhausts_retries() {
        let (runner, exec) = executor(MockRunner::failing("nope"), no_delay());
        let step = WorkflowStep::shell("flaky", "false", &[]).with_retries(3);

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.retry_count, 3);
        assert_eq!(runner.call_count(), 4);
        assert!(result.error.as_deref().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn flaky_step_stops_at_first_success() {
        let runner = MockRunner::succeeding("").with_command(
            "deploy",
            MockBehaviour::FailTimes { failures: 1, output: "deployed".into() },
        );
        let (runner, exec) = executor(runner, no_delay());
        let step = WorkflowStep::shell("deploy", "deploy", &[]).with_retries(5);

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.retry_count, 1);
        assert_eq!(result.output, "deployed");
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn unmet_condition_skips_without_dispatch() {
        let (runner, exec) = executor(MockRunner::succeeding(""), no_delay());
        let step = WorkflowStep::shell("prod-only", "deploy", &[])
            .with_retries(3)
            .when(StepCondition::variable("deploy_env", "production"));
        let mut ctx = ExecutionContext::default();
        ctx.variables.insert("deploy_env".into(), json!("development"));

        let result = exec.execute_workflow_step(&step, &ctx, &CancellationToken::new()).await;

        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(result.retry_count, 0);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_kind_fails_after_retries() {
        let (_, exec) = executor(MockRunner::succeeding(""), no_delay());
        let step = WorkflowStep::new("x", "teleport", "", &[]).with_retries(1);

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.retry_count, 1);
        assert_eq!(result.error.as_deref(), Some("unsupported step type: teleport"));
    }

    #[tokio::test(start_paused = true)]
    async fn step_timeout_bounds_each_attempt() {
        let (runner, exec) = executor(MockRunner::hanging(), no_delay());
        let step = WorkflowStep::shell("slow", "sleep", &["100"]).with_timeout("2s").with_retries(1);

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(runner.call_count(), 2);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn unparsable_timeout_means_no_timeout() {
        let runner = MockRunner::succeeding("done");
        let (_, exec) = executor(runner, no_delay());
        let step = WorkflowStep::shell("s", "true", &[]).with_timeout("whenever");

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &CancellationToken::new())
            .await;
        assert_eq!(result.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_attempt_in_flight() {
        let (runner, exec) = executor(MockRunner::hanging(), no_delay());
        let step = WorkflowStep::shell("stuck", "sleep", &["1000"]).with_retries(10);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &cancel)
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("step cancelled"));
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_attempt() {
        let (runner, exec) = executor(MockRunner::succeeding(""), no_delay());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = exec
            .execute_workflow_step(&WorkflowStep::shell("a", "true", &[]), &ExecutionContext::default(), &cancel)
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.retry_count, 0);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_keeps_the_last_error() {
        let config = ExecutorConfig {
            retry_base_delay: Duration::from_secs(10),
            ..ExecutorConfig::default()
        };
        let (runner, exec) = executor(MockRunner::failing("disk full"), config);
        let step = WorkflowStep::shell("backup", "rsync", &[]).with_retries(3);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = exec
            .execute_workflow_step(&step, &ExecutionContext::default(), &cancel)
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(runner.call_count(), 1);
        assert_eq!(result.retry_count, 0);
        assert!(result.error.as_deref().unwrap().contains("disk full"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ExecutorConfig {
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(5),
            ..ExecutorConfig::default()
        };
        let (_, exec) = executor(MockRunner::succeeding(""), config);
        assert_eq!(exec.backoff(1), Duration::from_secs(1));
        assert_eq!(exec.backoff(2), Duration::from_secs(2));
        assert_eq!(exec.backoff(3), Duration::from_secs(4));
        assert_eq!(exec.backoff(4), Duration::from_secs(5));
        assert_eq!(exec.backoff(40), Duration::from_secs(5));
    }
}
