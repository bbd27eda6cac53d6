//! Canned definitions for common workflow shapes.

use chrono::Utc;

use crate::models::{
    FailureStrategy, NotificationMode, WorkflowDefinition, WorkflowSettings, WorkflowStep,
};

/// `(kind, description)` for every built-in template.
pub const TEMPLATE_KINDS: &[(&str, &str)] = &[
    ("basic", "Basic workflow template"),
    ("ci", "Continuous Integration workflow"),
    ("deploy", "Deployment workflow"),
];

/// The description and steps for `kind`; unknown kinds fall back to `basic`.
pub fn get_workflow_template(kind: &str) -> WorkflowDefinition {
    match kind {
        "ci" => WorkflowDefinition {
            description: "Continuous Integration workflow".into(),
            steps: vec![
                WorkflowStep::shell("checkout", "git", &["pull", "origin", "main"]),
                WorkflowStep::shell("build", "cargo", &["build", "--workspace"]),
                WorkflowStep::shell("test", "cargo", &["test", "--workspace"]),
                WorkflowStep::shell("lint", "cargo", &["clippy", "--workspace", "--", "-D", "warnings"]),
            ],
            ..WorkflowDefinition::default()
        },
        "deploy" => WorkflowDefinition {
            description: "Deployment workflow".into(),
            steps: vec![
                WorkflowStep::shell("build", "cargo", &["build", "--release"]),
                WorkflowStep::shell("deploy", "kubectl", &["apply", "-f", "deployment.yaml"]),
            ],
            ..WorkflowDefinition::default()
        },
        _ => WorkflowDefinition {
            description: "Basic workflow template".into(),
            steps: vec![WorkflowStep::shell("hello", "echo", &["Hello, World!"])],
            ..WorkflowDefinition::default()
        },
    }
}

/// A complete, savable definition named `name` built from template `kind`.
pub fn create_workflow_from_template(name: &str, kind: &str) -> WorkflowDefinition {
    let template = get_workflow_template(kind);

    WorkflowDefinition {
        name: name.to_owned(),
        description: template.description,
        version: "1.0.0".into(),
        steps: template.steps,
        settings: WorkflowSettings {
            timeout: "30m".into(),
            max_retries: 3,
            failure_strategy: FailureStrategy::Stop,
            notification_mode: NotificationMode::OnFailure,
            ..WorkflowSettings::default()
        },
        last_updated: Some(Utc::now()),
        ..WorkflowDefinition::default()
    }
}
