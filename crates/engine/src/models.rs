//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory, and they are serialised as-is to `<workflows-dir>/<name>.json`.
//! Every struct is `#[serde(default)]`, so a hand-written definition may
//! omit any field it doesn't need.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::duration::parse_duration;

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// What a step does when dispatched.
///
/// Serialised as the bare string used in definition files. Strings that
/// don't name a known kind deserialise to [`StepKind::Unsupported`] instead
/// of failing, so a definition written for a newer engine still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Shell,
    Command,
    Script,
    Http,
    Notification,
    Unsupported(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Shell => "shell",
            Self::Command => "command",
            Self::Script => "script",
            Self::Http => "http",
            Self::Notification => "notification",
            Self::Unsupported(other) => other,
        }
    }
}

impl Default for StepKind {
    fn default() -> Self {
        Self::Unsupported(String::new())
    }
}

impl From<String> for StepKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "shell" => Self::Shell,
            "command" => Self::Command,
            "script" => Self::Script,
            "http" => Self::Http,
            "notification" => Self::Notification,
            _ => Self::Unsupported(s),
        }
    }
}

impl From<&str> for StepKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::Unsupported(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StepCondition
// ---------------------------------------------------------------------------

/// Where a condition reads its actual value from.
///
/// Unknown kinds deserialise to [`ConditionKind::Other`] and always pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionKind {
    Variable,
    Environment,
    Other(String),
}

impl ConditionKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Variable => "variable",
            Self::Environment => "environment",
            Self::Other(other) => other,
        }
    }
}

impl Default for ConditionKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for ConditionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "variable" => Self::Variable,
            "environment" => Self::Environment,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ConditionKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<ConditionKind> for String {
    fn from(kind: ConditionKind) -> Self {
        match kind {
            ConditionKind::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

/// A predicate gating whether a step runs. All of a step's conditions must
/// hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub field: String,
    /// Compared against the stringified actual value.
    pub value: String,
}

impl StepCondition {
    pub fn new(kind: impl Into<ConditionKind>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn variable(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ConditionKind::Variable, field, value)
    }

    pub fn environment(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ConditionKind::Environment, field, value)
    }
}

// ---------------------------------------------------------------------------
// WorkflowStep
// ---------------------------------------------------------------------------

/// One schedulable unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowStep {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub command: String,
    pub args: Vec<String>,
    /// Extra variables for subprocess steps, layered over the context environment.
    pub environment: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Free-form per-attempt timeout such as `"30s"`; unparsable means none.
    pub timeout: String,
    /// Retries after the first attempt; `0` means try once.
    pub retry_count: u32,
    pub continue_on_error: bool,
    pub conditions: Vec<StepCondition>,
    /// Grouping hint: join the preceding group instead of starting a new one.
    pub parallel: bool,
    /// Names of steps that must finish first. When any step in a workflow
    /// declares dependencies, grouping switches to dependency waves.
    pub dependencies: Vec<String>,
}

impl WorkflowStep {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<StepKind>,
        command: impl Into<String>,
        args: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            command: command.into(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            ..Self::default()
        }
    }

    /// Convenience constructor for a `shell` step.
    pub fn shell(name: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self::new(name, StepKind::Shell, command, args)
    }

    pub fn in_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn continuing_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn when(mut self, condition: StepCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// The parsed per-attempt timeout, if any.
    pub fn timeout_duration(&self) -> Option<Duration> {
        parse_duration(&self.timeout)
    }
}

// ---------------------------------------------------------------------------
// WorkflowSettings
// ---------------------------------------------------------------------------

/// What happens to the batch when a step fails terminally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Abort unless the failing step sets `continue_on_error`.
    #[default]
    Stop,
    /// Treat every step as `continue_on_error`.
    Continue,
}

/// When the end-of-run summary notification is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    Always,
    #[default]
    OnFailure,
    Never,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Overall budget for a run, e.g. `"30m"`.
    pub timeout: String,
    /// Definition-level retry default. Carried for tooling; per-step
    /// `retry_count` is what the executor honours.
    pub max_retries: u32,
    pub failure_strategy: FailureStrategy,
    pub notification_mode: NotificationMode,
    /// Merged over the execution environment when a run starts.
    pub environment: HashMap<String, String>,
}

impl WorkflowSettings {
    pub fn timeout_duration(&self) -> Option<Duration> {
        parse_duration(&self.timeout)
    }
}

/// A trigger declaration. Interpreted by an external scheduler; the engine
/// only preserves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowTrigger {
    #[serde(rename = "type")]
    pub kind: String,
    pub schedule: String,
    pub events: Vec<String>,
    pub conditions: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub version: String,
    pub steps: Vec<WorkflowStep>,
    /// Seeds `ExecutionContext::variables`.
    pub variables: HashMap<String, Value>,
    pub settings: WorkflowSettings,
    pub triggers: Vec<WorkflowTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".into(),
            steps,
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// The live values conditions and dispatch read during a run. Treated as
/// read-only once the run begins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionContext {
    pub variables: HashMap<String, Value>,
    pub environment: HashMap<String, String>,
    /// Informational only.
    pub metadata: HashMap<String, String>,
}

impl ExecutionContext {
    /// Seed a context from a definition: its variables, its settings
    /// environment, and identifying metadata.
    pub fn from_definition(definition: &WorkflowDefinition, execution_id: &str) -> Self {
        let metadata = HashMap::from([
            ("workflow".to_owned(), definition.name.clone()),
            ("version".to_owned(), definition.version.clone()),
            ("execution_id".to_owned(), execution_id.to_owned()),
        ]);
        Self {
            variables: definition.variables.clone(),
            environment: definition.settings.environment.clone(),
            metadata,
        }
    }

    /// Layer the current environment underneath: values already present
    /// (from the settings) win over inherited ones.
    pub fn with_process_environment(mut self) -> Self {
        let mut environment: HashMap<String, String> = std::env::vars().collect();
        environment.extend(self.environment);
        self.environment = environment;
        self
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Never executed (its group was not reached).
    #[default]
    Pending,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// The outcome of one step, stored at the step's declaration index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepResult {
    pub step: WorkflowStep,
    pub status: StepStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock time across all attempts, including back-off.
    pub duration: Duration,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts made beyond the first.
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// One run of a definition.
///
/// Holds its own copy of the definition, so later edits to the stored
/// definition never affect a run in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow: WorkflowDefinition,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Index-aligned with `workflow.steps`.
    pub results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub context: ExecutionContext,
}

impl WorkflowExecution {
    pub fn new(workflow: WorkflowDefinition) -> Self {
        let id = generate_execution_id();
        let context = ExecutionContext::from_definition(&workflow, &id);
        let results = vec![StepResult::default(); workflow.steps.len()];
        Self {
            id,
            workflow,
            start_time: Utc::now(),
            end_time: None,
            status: ExecutionStatus::Running,
            results,
            error: None,
            context,
        }
    }

    /// See [`ExecutionContext::with_process_environment`].
    pub fn with_process_environment(mut self) -> Self {
        self.context = self.context.with_process_environment();
        self
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// One-line human summary used for notifications and logs.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "workflow '{}' {} ({}): {} completed, {} failed, {} skipped",
            self.workflow.name,
            self.status,
            self.id,
            self.count(StepStatus::Completed),
            self.count(StepStatus::Failed),
            self.count(StepStatus::Skipped),
        );
        if let Some(error) = &self.error {
            line.push_str(": ");
            line.push_str(error);
        }
        line
    }
}

static LAST_EXECUTION_STAMP: AtomicI64 = AtomicI64::new(0);

/// `exec-<unix-micros>`, strictly increasing within the process so two runs
/// started in the same microsecond still get distinct IDs.
pub fn generate_execution_id() -> String {
    let now = Utc::now().timestamp_micros();
    let previous = LAST_EXECUTION_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(now.max(prev + 1)))
        .unwrap_or(now);
    format!("exec-{}", now.max(previous + 1))
}
