//! `engine` crate: workflow domain models, validation, grouping, condition
//! evaluation, step dispatch, and the execution engine.

pub mod models;
pub mod error;
pub mod duration;
pub mod validate;
pub mod grouping;
pub mod condition;
pub mod dispatch;
pub mod step;
pub mod executor;
pub mod templates;

pub use models::{
    ConditionKind, ExecutionContext, ExecutionStatus, FailureStrategy, NotificationMode,
    StepCondition, StepKind, StepResult, StepStatus, WorkflowDefinition, WorkflowExecution,
    WorkflowSettings, WorkflowStep, WorkflowTrigger,
};
pub use error::{EngineError, StepError};
pub use validate::{ensure_runnable, validate_workflow_definition};
pub use grouping::{StepGroup, group_steps, plan_step_groups};
pub use condition::{evaluate_condition, evaluate_step_conditions};
pub use dispatch::Dispatcher;
pub use step::StepExecutor;
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use templates::{create_workflow_from_template, get_workflow_template};
