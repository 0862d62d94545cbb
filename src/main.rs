//! AgentRunner CLI Entry Point
//!
//! Provides a command-line interface for running and checking workflows.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow
//! agentrunner run workflow.yaml
//!
//! # Seed the context
//! agentrunner run workflow.yaml --input user=ada --input count=3
//!
//! # Persist definitions and executions
//! agentrunner run workflow.yaml --store-dir .agentrunner
//!
//! # Check a definition without running it
//! agentrunner validate workflow.yaml
//!
//! # List built-in agents
//! agentrunner agents
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};
use serde_json::Value;

use agentrunner::agents::{AgentDirectory, EchoAgent, ShellAgent};
use agentrunner::monitoring::{health_report, ExecutionTimeline};
use agentrunner::store::{FileStore, InMemoryStore, WorkflowStore};
use agentrunner::workflow::model::{Context, ExecutionStatus, WorkflowExecution};
use agentrunner::workflow::{load_context_file, load_definition_file};
use agentrunner::{Engine, EngineConfig, APP_NAME, VERSION};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "agentrunner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs workflows by dispatching steps to pluggable agents")]
struct Cli {
    /// Engine configuration file (YAML or JSON)
    #[arg(short, long, global = true, env = "AGENTRUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file and wait for it to finish
    Run {
        /// Path to the workflow definition (YAML or JSON)
        file: PathBuf,

        /// Context value as key=value; JSON values are parsed, anything else is a string
        #[arg(short, long = "input", value_parser = parse_key_value)]
        inputs: Vec<(String, Value)>,

        /// File holding the initial context (YAML or JSON mapping)
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Recorded as the execution's initiator
        #[arg(long, default_value = "cli")]
        executed_by: String,

        /// Persist definitions and executions in this directory
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Working directory for the shell agent
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Maximum concurrently running steps in Parallel mode
        #[arg(long)]
        parallel: Option<usize>,
    },

    /// Validate a workflow file against the built-in agents
    Validate {
        /// Path to the workflow definition (YAML or JSON)
        file: PathBuf,
    },

    /// List built-in agents with their operations and health
    Agents,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Agent Workflow Execution Engine");
    println!();
}

/// Parses `key=value`. The value is read as JSON when possible.
fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Checks that the working directory exists.
fn check_working_directory(dir: &Path) -> CliResult<()> {
    if !dir.exists() {
        return Err(format!("Working directory does not exist: {}", dir.display()).into());
    }
    if !dir.is_dir() {
        return Err(format!("Path is not a directory: {}", dir.display()).into());
    }
    info!("Working directory: {}", dir.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Registers the built-in agents.
async fn builtin_agents(config: &EngineConfig) -> CliResult<Arc<AgentDirectory>> {
    let agents = Arc::new(AgentDirectory::new());
    agents.register(Arc::new(EchoAgent::new())).await?;
    agents
        .register(Arc::new(ShellAgent::new(config.working_dir.clone())))
        .await?;
    Ok(agents)
}

fn open_store(config: &EngineConfig) -> CliResult<Arc<dyn WorkflowStore>> {
    match &config.store_dir {
        Some(dir) => Ok(Arc::new(FileStore::open(dir)?)),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn colored_status(status: ExecutionStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        ExecutionStatus::Completed => text.green().bold(),
        ExecutionStatus::Failed => text.red().bold(),
        ExecutionStatus::Cancelled => text.yellow().bold(),
        ExecutionStatus::Pending | ExecutionStatus::Running => text.normal(),
    }
}

fn print_execution(execution: &WorkflowExecution) -> CliResult<()> {
    println!();
    println!("Execution {}: {}", execution.id, colored_status(execution.status));
    if let Some(message) = &execution.error_message {
        println!("  {} {}", "Error:".red(), message);
    }
    println!(
        "  Duration: {} ms",
        execution.duration().num_milliseconds()
    );

    print!("{}", ExecutionTimeline::from_execution(execution).gantt_chart());

    println!();
    println!("Output:");
    println!("{}", serde_json::to_string_pretty(&execution.output_data)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_workflow(
    config_path: Option<&Path>,
    file: &Path,
    inputs: Vec<(String, Value)>,
    input_file: Option<&Path>,
    executed_by: &str,
    store_dir: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    parallel: Option<usize>,
) -> CliResult<bool> {
    let mut config = load_config(config_path)?;
    if store_dir.is_some() {
        config.store_dir = store_dir;
    }
    if working_dir.is_some() {
        config.working_dir = working_dir;
    }
    if parallel.is_some() {
        config.max_parallel_steps = parallel;
    }
    if let Some(dir) = &config.working_dir {
        check_working_directory(dir)?;
    }

    let agents = builtin_agents(&config).await?;
    let engine = Engine::from_config(agents.clone(), open_store(&config)?, &config);

    let definition = load_definition_file(file)?;
    let definition = match engine.create_workflow(definition.clone()).await {
        Err(e) if e.is_conflict() => {
            info!("Workflow '{}' already stored; updating it", definition.id);
            engine.update_workflow(definition).await?
        }
        other => other?,
    };
    info!(
        "Workflow loaded: '{}' with {} steps ({} mode)",
        definition.name,
        definition.steps.len(),
        definition.execution_mode
    );

    let mut input = match input_file {
        Some(path) => load_context_file(path)?,
        None => Context::new(),
    };
    input.extend(inputs);

    let execution = engine
        .execute_workflow(&definition.id, input, executed_by)
        .await?;
    info!("Execution {} started", execution.id);

    let poll_interval = config.poll_interval();
    let finished = tokio::select! {
        result = engine.wait_for_execution(&execution.id, poll_interval) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; cancelling execution {}", execution.id);
            engine.cancel_execution(&execution.id).await?;
            engine.wait_for_execution(&execution.id, poll_interval).await?
        }
    };

    print_execution(&finished)?;
    print!("{}", health_report(&agents.all_health().await));

    Ok(finished.status == ExecutionStatus::Completed)
}

async fn validate_file(config_path: Option<&Path>, file: &Path) -> CliResult<bool> {
    let config = load_config(config_path)?;
    let agents = builtin_agents(&config).await?;
    let engine = Engine::from_config(agents, Arc::new(InMemoryStore::new()), &config);

    let definition = load_definition_file(file)?;
    let result = engine.validate_workflow(&definition);

    for error in &result.errors {
        println!("{} {}", "error:".red().bold(), error);
    }
    for warning in &result.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }

    if result.is_valid {
        println!(
            "{} '{}' is valid ({} steps, {} warnings)",
            "ok:".green().bold(),
            definition.name,
            definition.steps.len(),
            result.warnings.len()
        );
    }
    Ok(result.is_valid)
}

async fn list_agents(config_path: Option<&Path>) -> CliResult<bool> {
    let config = load_config(config_path)?;
    let agents = builtin_agents(&config).await?;

    for agent in agents.list() {
        println!("{} ({})", agent.id.bold(), agent.name);
        for capability in &agent.capabilities {
            println!("  {:10} {}", capability.name, capability.description);
        }
    }
    print!("{}", health_report(&agents.all_health().await));
    Ok(true)
}

async fn run(cli: Cli) -> CliResult<bool> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            file,
            inputs,
            input_file,
            executed_by,
            store_dir,
            working_dir,
            parallel,
        } => {
            run_workflow(
                config_path,
                &file,
                inputs,
                input_file.as_deref(),
                &executed_by,
                store_dir,
                working_dir,
                parallel,
            )
            .await
        }
        Commands::Validate { file } => validate_file(config_path, &file).await,
        Commands::Agents => list_agents(config_path).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    print_banner();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
