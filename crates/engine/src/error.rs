//! Engine-level error types.

use std::time::Duration;

use nodes::NodeError;
use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Configuration errors ------

    /// The definition failed the structural checks of
    /// [`validate_workflow_definition`](crate::validate::validate_workflow_definition).
    #[error("workflow '{0}' is invalid: a name, at least one step, and a name and type for every step are required")]
    InvalidDefinition(String),

    /// Two steps share a name while explicit dependencies are in use.
    #[error("duplicate step name: '{0}'")]
    DuplicateStepName(String),

    /// A step lists a dependency that names no step in the workflow.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// The declared dependencies cannot be ordered.
    #[error("step dependencies contain a cycle")]
    CycleDetected,

    // ------ Execution errors ------

    /// A step failed after exhausting its retries and was not allowed to
    /// continue on error.
    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// The run was cancelled (or its overall budget expired) before every
    /// group started.
    #[error("workflow execution was cancelled")]
    Cancelled,

    /// A parallel step worker terminated abnormally.
    #[error("step worker failed: {0}")]
    WorkerFailed(String),
}

/// Why a single attempt at a step failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("unsupported step type: {0}")]
    UnsupportedStepType(String),

    #[error("step timed out after {0:?}")]
    TimedOut(Duration),

    #[error("step cancelled")]
    Cancelled,

    #[error(transparent)]
    Node(#[from] NodeError),
}
