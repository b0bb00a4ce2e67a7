use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use conductor::orchestration::BatchRun;
use conductor::routing::RoutingDecision;
use conductor::util;
use conductor::{
    AgentRegistry, CommandExecutor, Conductor, Config, CoordinatorEvent, Error, OrchestrationMode,
    Result, RunOptions, Task, TaskFile,
};

/// Conductor - dependency-aware task scheduling and agent routing
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CONDUCTOR_DEBUG=1     Enable debug logging (alternative to --debug)\n    CONDUCTOR_LOG=...     Explicit log filter directive")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.conductor/conductor.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file (default: ~/.conductor/conductor.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Agent registry file, overriding the config's agents_file
    #[arg(short = 'a', long, global = true)]
    pub agents: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a batch of tasks from a TOML or JSON file
    Run {
        /// Task file (`[[tasks]]` TOML, or a JSON array)
        file: PathBuf,

        /// Orchestration mode: flat, hierarchical or hybrid
        #[arg(short, long)]
        mode: Option<OrchestrationMode>,

        /// Retries per task after the first attempt
        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-attempt timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Cancel the whole batch after this many seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Attempts in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the full run as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the parallel groups a task file would run in
    Plan {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Show which agent a task description would be routed to
    Route {
        description: String,

        #[arg(short, long)]
        mode: Option<OrchestrationMode>,

        #[arg(long)]
        json: bool,
    },

    /// List the agent registry
    Agents {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    conductor::log::init_with_debug(cli.debug);
    info!(debug = conductor::log::is_debug(), "conductor starting");

    let outcome = match cli.command.clone() {
        Command::Run {
            file,
            mode,
            max_retries,
            timeout,
            deadline,
            concurrency,
            json,
        } => {
            let mut options = RunOptions::new();
            if let Some(mode) = mode {
                options = options.mode(mode);
            }
            if let Some(max_retries) = max_retries {
                options = options.max_retries(max_retries);
            }
            if let Some(secs) = timeout {
                options = options.timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = deadline {
                options = options.deadline(Duration::from_secs(secs));
            }
            if let Some(concurrency) = concurrency {
                options = options.max_concurrency(concurrency);
            }
            run_batch(&cli, &file, options, json)
        }
        Command::Plan { file, json } => run_plan(&file, json).map(|_| true),
        Command::Route {
            description,
            mode,
            json,
        } => run_route(&cli, &description, mode, json).map(|_| true),
        Command::Agents { json } => run_agents(&cli, json).map(|_| true),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {}", e);
            if e.is_structural() {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Config::load_from(path)
        }
        None => Config::load(),
    }
}

fn load_registry(cli: &Cli, config: &Config) -> Result<AgentRegistry> {
    match &cli.agents {
        Some(path) => AgentRegistry::load(path),
        None => config.load_registry(),
    }
}

/// Run a task file. Returns whether every task succeeded.
fn run_batch(cli: &Cli, file: &Path, options: RunOptions, json: bool) -> Result<bool> {
    let config = load_config(cli)?;
    let registry = load_registry(cli, &config)?;
    let executor = CommandExecutor::new(config.executor.effective_command())?;
    let conductor = Conductor::with_config(&config, registry, Arc::new(executor))?;

    let rt = tokio::runtime::Runtime::new()?;
    let run = rt.block_on(async {
        let path = file.to_path_buf();
        let tasks = util::blocking(move || TaskFile::load(&path)).await?;
        info!(tasks = tasks.len(), file = %file.display(), "running batch");

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling batch");
                    cancel.cancel();
                }
            })
        };

        let (tx, rx) = mpsc::channel(256);
        let printer = tokio::spawn(print_events(rx));

        let result = conductor
            .run_batch_with(tasks, options.cancel(cancel).events(tx))
            .await;
        interrupt.abort();
        // The sender is gone once the run returns, so the printer drains and exits.
        let _ = printer.await;
        result
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }
    info!(summary = %run.summary, "batch finished");
    Ok(run.summary.all_succeeded())
}

async fn print_events(mut rx: mpsc::Receiver<CoordinatorEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            CoordinatorEvent::GroupStarted { index, tasks } => {
                let ids: Vec<&str> = tasks.iter().map(|t| t.as_str()).collect();
                eprintln!("[group {}] starting: {}", index + 1, ids.join(", "));
            }
            CoordinatorEvent::GroupCompleted { index } => {
                eprintln!("[group {}] done", index + 1);
            }
            CoordinatorEvent::TaskRouted { task_id, decision } => {
                eprintln!("  {} -> {} ({})", task_id, decision.agent_role, decision.reason);
            }
            CoordinatorEvent::TaskStarted {
                task_id,
                attempt,
                ..
            } if attempt > 1 => {
                eprintln!("  {} attempt {}", task_id, attempt);
            }
            CoordinatorEvent::TaskStarted { .. } => {}
            CoordinatorEvent::TaskRetrying {
                task_id,
                delay,
                error,
                ..
            } => {
                eprintln!(
                    "  {} failed ({}), retrying in {}ms",
                    task_id,
                    util::truncate(&error, 80),
                    delay.as_millis()
                );
            }
            CoordinatorEvent::TaskSucceeded { task_id, attempts } => {
                eprintln!("  {} succeeded ({} attempt(s))", task_id, attempts);
            }
            CoordinatorEvent::TaskFailed {
                task_id,
                kind,
                error,
            } => {
                eprintln!(
                    "  {} failed [{}]: {}",
                    task_id,
                    kind,
                    util::truncate(&error, 80)
                );
            }
            CoordinatorEvent::TaskBlocked {
                task_id,
                dependency,
            } => {
                eprintln!("  {} blocked by {}", task_id, dependency);
            }
            CoordinatorEvent::TaskCancelled { task_id } => {
                eprintln!("  {} cancelled", task_id);
            }
            CoordinatorEvent::AllComplete { summary } => {
                eprintln!("{}", summary);
            }
        }
    }
}

fn print_run(run: &BatchRun) {
    println!();
    println!("{:<20} {:<10} {:<16} {:>8}  DETAIL", "TASK", "STATUS", "AGENT", "ATTEMPTS");
    for result in &run.results {
        let status = match result.failure {
            None => result.status.to_string(),
            Some(kind) => kind.to_string(),
        };
        let detail = if result.is_success() {
            result.output.lines().next().unwrap_or("").to_string()
        } else {
            result.last_error().unwrap_or("").to_string()
        };
        println!(
            "{:<20} {:<10} {:<16} {:>8}  {}",
            util::truncate(result.task_id.as_str(), 20),
            util::truncate(&status, 10),
            result.agent_role.as_deref().unwrap_or("-"),
            result.attempts,
            util::truncate(&detail, 60)
        );
    }
    println!();
    println!("{}", run.summary);
}

fn run_plan(file: &Path, json: bool) -> Result<()> {
    let tasks = TaskFile::load(file)?;
    let plan = conductor::TaskGraphBuilder::new().plan(&tasks)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "{} tasks in {} group(s), widest group {}",
        plan.task_count(),
        plan.depth(),
        plan.max_width()
    );
    for (index, group) in plan.groups().iter().enumerate() {
        let ids: Vec<&str> = group.iter().map(|t| t.as_str()).collect();
        println!("  {}. {}", index + 1, ids.join(", "));
    }
    Ok(())
}

fn run_route(
    cli: &Cli,
    description: &str,
    mode: Option<OrchestrationMode>,
    json: bool,
) -> Result<()> {
    let config = load_config(cli)?;
    let registry = load_registry(cli, &config)?;
    let router = conductor::AgentRouter::new(&config.routing)?;
    let task = Task::new("cli", description);
    task.validate()?;

    let decision = router.route(&task, &registry, mode.unwrap_or(config.execution.mode));
    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        print_decision(&decision);
    }
    Ok(())
}

fn print_decision(decision: &RoutingDecision) {
    println!("  Agent:        {}", decision.agent_role);
    println!("  Tier:         {}", decision.tier);
    println!("  Domain:       {}", decision.domain.as_deref().unwrap_or("-"));
    println!("  Mode:         {}", decision.orchestration_mode);
    println!("  Coordination: {}", decision.coordination);
    println!("  Score:        {}", decision.score);
    if decision.fallback {
        println!("  Fallback:     yes");
    }
    println!("  Reason:       {}", decision.reason);
}

fn run_agents(cli: &Cli, json: bool) -> Result<()> {
    let config = load_config(cli)?;
    let registry = load_registry(cli, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(registry.agents())?);
        return Ok(());
    }

    println!("{:<20} {:<6} {:<12} {:<16} CAPABILITIES", "ROLE", "TIER", "DOMAIN", "PARENT");
    for agent in registry.agents() {
        let marker = if agent.role == registry.default_agent().role {
            "*"
        } else {
            ""
        };
        println!(
            "{:<20} {:<6} {:<12} {:<16} {}",
            format!("{}{}", agent.role, marker),
            u8::from(agent.tier),
            agent.domain.as_deref().unwrap_or("-"),
            agent.parent.as_deref().unwrap_or("-"),
            agent.capabilities.join(", ")
        );
    }
    println!();
    println!("* default agent");
    Ok(())
}
