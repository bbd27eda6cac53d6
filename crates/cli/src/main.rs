//! `runbook` CLI entry-point.
//!
//! Available sub-commands:
//! - `execute`   run a stored workflow and record the execution.
//! - `list`      list stored workflows.
//! - `status`    show one recorded execution, or all of them.
//! - `create`    create a workflow from a template.
//! - `validate`  validate one stored workflow, or every one.
//! - `history`   show recent executions, newest first.
//! - `templates` list the available templates.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use store::StoreConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "runbook", about = "Declarative workflow runner", version)]
struct Cli {
    /// State directory holding `workflows/` and `executions/`.
    #[arg(long, env = "RUNBOOK_DIR", default_value = store::config::DEFAULT_ROOT, global = true)]
    root: PathBuf,

    /// Extra notification channels as `channel=url` pairs.
    #[arg(
        long = "notify-webhook",
        env = "RUNBOOK_NOTIFY_WEBHOOKS",
        value_delimiter = ',',
        global = true
    )]
    webhooks: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a stored workflow.
    Execute {
        #[arg(long, env = "WORKFLOW")]
        workflow: Option<String>,
    },
    /// List stored workflows.
    List,
    /// Show a recorded execution, or every recorded execution.
    Status {
        #[arg(long, env = "EXECUTION_ID")]
        id: Option<String>,
    },
    /// Create a workflow from a template.
    Create {
        #[arg(long, env = "WORKFLOW_NAME")]
        name: Option<String>,
        #[arg(long, env = "TEMPLATE", default_value = "basic")]
        template: String,
    },
    /// Validate one stored workflow, or all of them.
    Validate {
        #[arg(long, env = "WORKFLOW")]
        workflow: Option<String>,
    },
    /// Show recent executions.
    History {
        #[arg(long, env = "WORKFLOW")]
        workflow: Option<String>,
        #[arg(long, env = "LIMIT", default_value_t = 10)]
        limit: usize,
    },
    /// List the available workflow templates.
    Templates,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = StoreConfig::new(cli.root);
    let mut out = std::io::stdout();

    match cli.command {
        Command::Execute { workflow } => {
            let dispatcher = commands::system_dispatcher(&cli.webhooks)?;
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling workflow");
                    on_interrupt.cancel();
                }
            });

            let execution =
                commands::execute(&config, workflow.as_deref(), dispatcher, &cancel).await?;
            commands::print_execution(&mut out, &execution)?;
        }
        Command::List => commands::list(&config, &mut out).await?,
        Command::Status { id } => commands::status(&config, id.as_deref(), &mut out).await?,
        Command::Create { name, template } => {
            commands::create(&config, name.as_deref(), &template, &mut out).await?
        }
        Command::Validate { workflow } => {
            commands::validate(&config, workflow.as_deref(), &mut out).await?
        }
        Command::History { workflow, limit } => {
            commands::history(&config, workflow.as_deref(), limit, &mut out).await?
        }
        Command::Templates => commands::templates(&mut out)?,
    }

    Ok(())
}
