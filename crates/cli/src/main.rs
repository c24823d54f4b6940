//! `automation-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a workflow JSON file and print its execution order.
//! - `run`      — execute a workflow JSON file with the built-in node catalog.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::{
    ExecutionMode, ExecutionStep, ExecutorConfig, RunMetadata, RunOptions, RunStatus, StepStatus,
    WorkflowExecutor, WorkflowGraph,
};
use nodes::builtin::{HttpClientConfig, HttpEmailTransport};
use nodes::{builtin_registry, BuiltinConfig};

#[derive(Parser)]
#[command(name = "automation-engine", about = "Workflow automation engine", version)]
struct Cli {
    /// Log output format (logs go to stderr).
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow definition JSON file and print the report.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Trigger payload seeded into the context, as a JSON object.
        #[arg(long)]
        seed: Option<String>,
        /// Executor configuration (TOML).
        #[arg(long, env = "AUTOMATION_CONFIG")]
        config: Option<PathBuf>,
        /// Run one node at a time in topological order.
        #[arg(long)]
        sequential: bool,
        #[arg(long, default_value = "default")]
        tenant: String,
        /// Email provider endpoint; emails are only logged when unset.
        #[arg(long, env = "EMAIL_ENDPOINT")]
        email_endpoint: Option<String>,
        #[arg(long, env = "EMAIL_API_KEY", hide_env_values = true)]
        email_api_key: Option<String>,
    },
}

/// A workflow file: the graph plus optional identification.
#[derive(Deserialize)]
struct WorkflowDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    graph: WorkflowGraph,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Command::Validate { path } => {
            let doc = read_workflow(&path)?;
            match engine::compute_execution_order(&doc.graph) {
                Ok(order) => {
                    println!("Workflow is valid. Execution order: {order:?}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    Ok(ExitCode::from(1))
                }
            }
        }
        Command::Run {
            path,
            seed,
            config,
            sequential,
            tenant,
            email_endpoint,
            email_api_key,
        } => {
            let doc = read_workflow(&path)?;

            let mut config = match config {
                Some(config_path) => ExecutorConfig::load(&config_path)
                    .with_context(|| format!("loading {}", config_path.display()))?,
                None => ExecutorConfig::default(),
            };
            if sequential {
                config.mode = ExecutionMode::Sequential;
            }

            let mut builtins = BuiltinConfig::default();
            if let Some(endpoint) = email_endpoint {
                let transport = HttpEmailTransport::new(endpoint, email_api_key, &HttpClientConfig::default())
                    .context("building email transport")?;
                builtins.email_transport = Arc::new(transport);
            }
            let registry = builtin_registry(builtins).context("registering built-in nodes")?;
            let executor = WorkflowExecutor::new(registry, config)?;

            let cancellation = CancellationToken::new();
            let on_interrupt = cancellation.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling run");
                    on_interrupt.cancel();
                }
            });

            let workflow_id = doc.id.clone().unwrap_or_else(|| file_stem(&path));
            if let Some(name) = &doc.name {
                info!(%workflow_id, %name, "loaded workflow");
            }
            let options = RunOptions::new()
                .with_seed(parse_seed(seed.as_deref())?)
                .with_cancellation(cancellation)
                .with_observer(Arc::new(log_step));

            let result = executor
                .run(&doc.graph, RunMetadata::new(workflow_id, tenant), options)
                .await?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(match result.status() {
                RunStatus::Completed => ExitCode::SUCCESS,
                RunStatus::Failed => ExitCode::from(2),
                RunStatus::Cancelled => ExitCode::from(130),
            })
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("failed to create env filter: {e}"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Pretty => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

fn read_workflow(path: &Path) -> anyhow::Result<WorkflowDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn parse_seed(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("--seed is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--seed must be a JSON object, got {other}"),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_string())
}

fn log_step(step: &ExecutionStep) {
    match step.status {
        StepStatus::Running => info!(step = step.step_index, node_id = %step.node_id, node_type = %step.node_type, "step started"),
        StepStatus::Error => warn!(
            node_id = %step.node_id,
            duration_ms = step.duration_ms,
            error = step.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default(),
            "step failed"
        ),
        status => info!(node_id = %step.node_id, ?status, duration_ms = step.duration_ms, "step finished"),
    }
}
