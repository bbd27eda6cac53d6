//! Condition evaluation: decides whether a step is eligible to run.

use serde_json::Value;

use crate::models::{ConditionKind, ExecutionContext, StepCondition};

/// Evaluate one condition against the live context.
///
/// `variable` and `environment` conditions pass only when the field exists
/// and its stringified value equals `condition.value`. Any other kind
/// passes unconditionally.
pub fn evaluate_condition(condition: &StepCondition, ctx: &ExecutionContext) -> bool {
    match &condition.kind {
        ConditionKind::Variable => ctx
            .variables
            .get(&condition.field)
            .is_some_and(|actual| stringify_value(actual) == condition.value),
        ConditionKind::Environment => ctx
            .environment
            .get(&condition.field)
            .is_some_and(|actual| *actual == condition.value),
        ConditionKind::Other(_) => true,
    }
}

/// Logical AND over `conditions`; an empty slice is vacuously true.
pub fn evaluate_step_conditions(conditions: &[StepCondition], ctx: &ExecutionContext) -> bool {
    conditions.iter().all(|condition| evaluate_condition(condition, ctx))
}

/// Strings compare by their content; every other JSON value by its compact
/// JSON text (`true`, `3`, `null`, `["a"]`).
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
