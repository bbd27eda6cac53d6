//! Definition validation: run this before persisting or executing a workflow.

use crate::{EngineError, grouping::plan_step_groups, models::WorkflowDefinition};

/// Structural check: a name, at least one step, and a name and type on
/// every step. Pure; never panics.
pub fn validate_workflow_definition(definition: &WorkflowDefinition) -> bool {
    !definition.name.is_empty()
        && !definition.steps.is_empty()
        && definition
            .steps
            .iter()
            .all(|step| !step.name.is_empty() && !step.kind.as_str().is_empty())
}

/// Everything that must hold before a run may start: the structural check
/// plus a schedulable set of groups.
///
/// # Errors
/// [`EngineError::InvalidDefinition`], or any grouping error from
/// [`plan_step_groups`].
pub fn ensure_runnable(definition: &WorkflowDefinition) -> Result<(), EngineError> {
    if !validate_workflow_definition(definition) {
        return Err(EngineError::InvalidDefinition(definition.name.clone()));
    }
    plan_step_groups(&definition.steps).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StepKind, WorkflowStep};

    fn well_formed() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "ci",
            vec![
                WorkflowStep::shell("build", "cargo", &["build"]),
                WorkflowStep::shell("test", "cargo", &["test"]),
            ],
        )
    }

    #[test]
    fn well_formed_definition_is_valid() {
        assert!(validate_workflow_definition(&well_formed()));
        assert!(ensure_runnable(&well_formed()).is_ok());
    }

    #[test]
    fn zero_value_definition_is_invalid() {
        assert!(!validate_workflow_definition(&WorkflowDefinition::default()));
    }

    #[test]
    fn missing_name_is_invalid() {
        let def = WorkflowDefinition { name: String::new(), ..well_formed() };
        assert!(!validate_workflow_definition(&def));
    }

    #[test]
    fn missing_steps_is_invalid() {
        let def = WorkflowDefinition { steps: vec![], ..well_formed() };
        assert!(!validate_workflow_definition(&def));
        assert!(matches!(ensure_runnable(&def), Err(EngineError::InvalidDefinition(n)) if n == "ci"));
    }

    #[test]
    fn step_without_name_is_invalid() {
        let mut def = well_formed();
        def.steps[1].name.clear();
        assert!(!validate_workflow_definition(&def));
    }

    #[test]
    fn step_without_type_is_invalid() {
        let mut def = well_formed();
        def.steps[0].kind = StepKind::default();
        assert!(!validate_workflow_definition(&def));
    }

    #[test]
    fn unsupported_but_named_type_is_structurally_valid() {
        let mut def = well_formed();
        def.steps[0].kind = StepKind::from("docker");
        assert!(validate_workflow_definition(&def));
    }

    #[test]
    fn dependency_cycle_is_not_runnable() {
        let mut def = well_formed();
        def.steps[0].dependencies = vec!["test".into()];
        def.steps[1].dependencies = vec!["build".into()];
        assert!(validate_workflow_definition(&def));
        assert!(matches!(ensure_runnable(&def), Err(EngineError::CycleDetected)));
    }
}
