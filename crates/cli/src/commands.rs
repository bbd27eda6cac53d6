//! Sub-command implementations.
//!
//! Each command writes its report to `out` and returns an `anyhow` error
//! carrying the context the user sees.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use chrono::SecondsFormat;
use engine::templates::TEMPLATE_KINDS;
use engine::{
    Dispatcher, ExecutorConfig, WorkflowExecution, WorkflowExecutor, create_workflow_from_template,
    ensure_runnable,
};
use nodes::{ChannelNotifier, ReqwestCaller, SystemRunner};
use store::StoreConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Dispatcher backed by real processes, HTTP and the webhook notifier.
pub fn system_dispatcher(webhooks: &[String]) -> anyhow::Result<Dispatcher> {
    let http = Arc::new(ReqwestCaller::new().context("failed to build HTTP client")?);
    let mut notifier = ChannelNotifier::new(http.clone());
    for (channel, url) in parse_webhooks(webhooks)? {
        notifier = notifier.with_webhook(channel, url);
    }
    Ok(Dispatcher::new(Arc::new(SystemRunner::new()), http, Arc::new(notifier)))
}

/// Split `channel=url` pairs.
pub fn parse_webhooks(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| pair.trim())
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((channel, url)) if !channel.is_empty() && !url.is_empty() => {
                Ok((channel.to_owned(), url.to_owned()))
            }
            _ => Err(anyhow!("invalid webhook '{pair}': expected channel=url")),
        })
        .collect()
}

/// Load, run and record the workflow named by `workflow`.
///
/// The execution record is saved whatever the outcome; a failure to save
/// is logged and does not change the result.
pub async fn execute(
    config: &StoreConfig,
    workflow: Option<&str>,
    dispatcher: Dispatcher,
    cancel: &CancellationToken,
) -> anyhow::Result<WorkflowExecution> {
    let name = workflow
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("WORKFLOW environment variable is required"))?;

    let definition = store::load_workflow(&config.workflows_dir(), name)
        .await
        .with_context(|| format!("failed to load workflow '{name}'"))?;

    let executor = WorkflowExecutor::new(dispatcher, ExecutorConfig::default());
    let mut execution = WorkflowExecution::new(definition).with_process_environment();
    let outcome = executor.execute(&mut execution, cancel).await;

    match store::save_execution(&config.executions_dir(), &execution).await {
        Ok(path) => info!("execution record written to {}", path.display()),
        Err(e) => warn!("failed to record execution {}: {}", execution.id, e),
    }

    outcome.context("workflow execution failed")?;
    Ok(execution)
}

pub fn print_execution(out: &mut impl Write, execution: &WorkflowExecution) -> anyhow::Result<()> {
    writeln!(out, "{}", execution.summary())?;
    writeln!(
        out,
        "  started {}",
        execution.start_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    if let Some(elapsed) = execution.duration() {
        writeln!(out, "  took {} ms", elapsed.num_milliseconds())?;
    }
    for (step, result) in execution.workflow.steps.iter().zip(&execution.results) {
        write!(out, "  {:<24} {:<9}", step.name, result.status)?;
        if result.retry_count > 0 {
            write!(out, " retries={}", result.retry_count)?;
        }
        if let Some(error) = &result.error {
            write!(out, " {error}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub async fn list(config: &StoreConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let dir = config.workflows_dir();
    let mut workflows = store::discover_workflows(&dir)
        .await
        .with_context(|| format!("failed to list workflows in {}", dir.display()))?;
    workflows.sort_by(|a, b| a.name.cmp(&b.name));

    if workflows.is_empty() {
        writeln!(out, "no workflows in {}", dir.display())?;
    }
    for def in &workflows {
        writeln!(
            out,
            "{:<24} {:>3} steps  v{}  {}",
            def.name,
            def.steps.len(),
            def.version,
            def.description
        )?;
    }
    Ok(())
}

pub async fn status(config: &StoreConfig, id: Option<&str>, out: &mut impl Write) -> anyhow::Result<()> {
    let dir = config.executions_dir();
    match id.filter(|id| !id.is_empty()) {
        Some(id) => {
            let execution = store::load_execution(&dir, id)
                .await
                .with_context(|| format!("failed to load execution '{id}'"))?;
            print_execution(out, &execution)
        }
        None => {
            let executions = store::workflow_history(&dir, None, 0)
                .await
                .context("failed to read execution records")?;
            if executions.is_empty() {
                writeln!(out, "no recorded executions")?;
            }
            for execution in &executions {
                writeln!(out, "{}", execution.summary())?;
            }
            Ok(())
        }
    }
}

pub async fn create(
    config: &StoreConfig,
    name: Option<&str>,
    template: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let name = name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("WORKFLOW_NAME environment variable is required"))?;
    if !TEMPLATE_KINDS.iter().any(|(kind, _)| *kind == template) {
        warn!("unknown template '{template}', using 'basic'");
    }

    let dir = config.workflows_dir();
    let path = store::workflow_path(&dir, name)?;
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        bail!("workflow '{name}' already exists at {}", path.display());
    }

    let mut definition = create_workflow_from_template(name, template);
    let path = store::save_workflow(&dir, &mut definition)
        .await
        .with_context(|| format!("failed to save workflow '{name}'"))?;
    writeln!(out, "created workflow '{name}' at {}", path.display())?;
    Ok(())
}

/// Validate one workflow, or every discoverable one when `workflow` is
/// `None`. Fails if anything checked is invalid.
pub async fn validate(
    config: &StoreConfig,
    workflow: Option<&str>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let workflow = workflow.filter(|name| !name.is_empty());
    let dir = config.workflows_dir();
    let definitions = match workflow {
        Some(name) => vec![
            store::load_workflow(&dir, name)
                .await
                .with_context(|| format!("failed to load workflow '{name}'"))?,
        ],
        None => store::discover_workflows(&dir).await?,
    };

    let mut invalid = 0;
    for def in &definitions {
        match ensure_runnable(def) {
            Ok(()) => writeln!(out, "valid    {}", def.name)?,
            Err(e) => {
                invalid += 1;
                writeln!(out, "invalid  {}: {e}", def.name)?;
            }
        }
    }

    match (workflow, invalid) {
        (_, 0) => Ok(()),
        (Some(name), _) => bail!("workflow '{name}' is invalid"),
        (None, n) => bail!("{n} of {} workflows are invalid", definitions.len()),
    }
}

pub async fn history(
    config: &StoreConfig,
    workflow: Option<&str>,
    limit: usize,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let executions = store::workflow_history(&config.executions_dir(), workflow, limit)
        .await
        .context("failed to read execution records")?;
    for execution in &executions {
        writeln!(
            out,
            "{}  {:<24} {:<9} {}",
            execution.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            execution.workflow.name,
            execution.status,
            execution.id
        )?;
    }
    Ok(())
}

pub fn templates(out: &mut impl Write) -> anyhow::Result<()> {
    for (kind, description) in TEMPLATE_KINDS {
        writeln!(out, "{kind:<8} {description}")?;
    }
    Ok(())
}
