use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use cli::output::{exit_code, format_entry, format_event};
use config::Config;
use wiggum::agent::ProcessLauncher;
use wiggum::backpressure::BackpressureRunner;
use wiggum::domain::{BackpressureTrigger, LoopMode, TaskStatus};
use wiggum::runner::{EventSink, LoopRunner};
use wiggum::workspace::{PlanFileDetector, Workspace};

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wiggum")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("wiggum.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        if let Some(level) = &config.log_level {
            builder.parse_filters(level);
        }
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_runner(workspace: &Workspace, config: &Config) -> LoopRunner<ProcessLauncher, BackpressureRunner> {
    LoopRunner::new(
        Arc::new(ProcessLauncher::new(config.agent_command())),
        Arc::new(BackpressureRunner::new(config.check_options())),
        workspace.session_log(),
    )
    .with_config(config.runner_config())
    .with_detector(Box::new(PlanFileDetector::new(workspace.plan_path())))
}

/// Cancellation token tripped by Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Stopping after interrupt...".yellow());
            info!("Ctrl-C received, cancelling");
            trip.cancel();
        }
    });
    cancel
}

async fn run_application(cli: &Cli, config: &Config) -> Result<i32> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            dir,
            max_iterations,
            budget,
            model,
            skip_permissions,
        } => {
            let mut config = config.clone();
            config.agent.skip_permissions |= *skip_permissions;
            handle_run_command(dir, *max_iterations, *budget, model.clone(), &config, cli.is_verbose()).await
        }
        Commands::Tail { session_id, lines, dir } => handle_tail_command(&dir.dir, session_id, *lines),
        Commands::Check { trigger, dir } => handle_check_command(&dir.dir, *trigger, config, cli.is_verbose()).await,
        Commands::Status { dir } => handle_status_command(&dir.dir),
    }
}

async fn handle_run_command(
    dir: &Path,
    max_iterations: Option<u32>,
    budget: Option<f64>,
    model: Option<String>,
    config: &Config,
    verbose: bool,
) -> Result<i32> {
    let workspace = Workspace::new(dir);
    let mut loop_instance = workspace.load().context("Failed to load workspace")?;

    if max_iterations.is_some() || budget.is_some() {
        loop_instance.config.mode = LoopMode::Bounded;
        if max_iterations.is_some() {
            loop_instance.config.max_iterations = max_iterations;
        }
        if budget.is_some() {
            loop_instance.config.budget_usd = budget;
        }
    }
    if model.is_some() {
        loop_instance.config.model = model;
    }

    println!(
        "{} {} in {} ({} tasks, {} checks)",
        "Running:".green(),
        loop_instance.name.bold(),
        loop_instance.target_dir.display(),
        loop_instance.plan.tasks.len(),
        loop_instance.backpressure.checks.len()
    );

    let runner = build_runner(&workspace, config);
    let cancel = ctrl_c_token();
    let summary = runner
        .start(
            &mut loop_instance,
            move |event| println!("{}", format_event(&event, verbose)),
            &cancel,
        )
        .await;

    println!(
        "{} {} iterations, ${:.4}, {} turns",
        "Summary:".bold(),
        summary.iterations(),
        summary.cumulative_cost_usd(),
        summary.total_turns()
    );
    Ok(exit_code(summary.reason))
}

fn handle_tail_command(dir: &Path, session_id: &str, lines: usize) -> Result<i32> {
    let workspace = Workspace::new(dir);
    let entries = workspace
        .session_log()
        .tail(session_id, lines)
        .context(format!("Failed to read session {}", session_id))?;
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(0)
}

async fn handle_check_command(dir: &Path, trigger: BackpressureTrigger, config: &Config, verbose: bool) -> Result<i32> {
    let workspace = Workspace::new(dir);
    let loop_instance = workspace.load().context("Failed to load workspace")?;
    let runner = build_runner(&workspace, config);

    let (events, forwarder) = EventSink::from_callback(move |event| println!("{}", format_event(&event, verbose)));
    let passed = runner
        .run_trigger(&loop_instance, trigger, &events, &ctrl_c_token())
        .await;
    drop(events);
    forwarder.await.context("Event printer failed")?;

    if passed {
        println!("{} all {} checks passed", "OK:".green(), trigger.as_str());
        Ok(0)
    } else {
        println!("{} {} checks failed", "FAILED:".red(), trigger.as_str());
        Ok(1)
    }
}

fn handle_status_command(dir: &Path) -> Result<i32> {
    let workspace = Workspace::new(dir);
    let loop_instance = workspace.load().context("Failed to load workspace")?;
    let loop_config = &loop_instance.config;

    println!("{} {}", "Loop:".green(), loop_instance.name.bold());
    println!("  target:  {}", loop_instance.target_dir.display());
    match loop_config.mode {
        LoopMode::Yolo => println!("  mode:    yolo"),
        LoopMode::Bounded => println!(
            "  mode:    bounded (max iterations: {}, budget: {})",
            loop_config
                .max_iterations
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
            loop_config
                .budget_usd
                .map(|b| format!("${:.2}", b))
                .unwrap_or_else(|| "-".to_string())
        ),
    }
    println!("  model:   {}", loop_config.model.as_deref().unwrap_or("(agent default)"));

    let plan = &loop_instance.plan;
    println!(
        "{} {} total, {} completed, {} in progress, {} pending, {} skipped",
        "Tasks:".green(),
        plan.tasks.len(),
        plan.count(TaskStatus::Completed),
        plan.count(TaskStatus::InProgress),
        plan.count(TaskStatus::Pending),
        plan.count(TaskStatus::Skipped)
    );

    println!("{}", "Checks:".green());
    for check in &loop_instance.backpressure.checks {
        println!("  {} [{}] {}", check.name, check.trigger.as_str(), check.command.dimmed());
    }

    let sessions = workspace.session_log().sessions().context("Failed to list sessions")?;
    println!("{} {}", "Sessions:".green(), sessions.len());
    for session in sessions.iter().rev().take(5) {
        println!("  {}", session);
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    let code = run_application(&cli, &config).await.context("Application failed")?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
