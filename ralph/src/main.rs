//! Headless host for the ralph task loop.
//!
//! Runs the orchestrator against a project directory, renders its events on
//! stdout and maps single-letter stdin lines to loop commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ralph::agents::CliAdapterFactory;
use ralph::core::selector::{all_settled, next_task_index};
use ralph::core::types::{AgentType, LoopMode, Task};
use ralph::exit_codes;
use ralph::io::config::{RalphConfig, load_config, write_config};
use ralph::io::paths::ProjectPaths;
use ralph::io::task_store::{load_tasks, save_tasks};
use ralph::io::validator::CommandValidator;
use ralph::logging;
use ralph::orchestrator::{Command, Event, HostChannels, LoopStop, Orchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Autonomous task loop driving AI coding agents"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Create `.ralph/config.toml` and an empty `tasks.json` if missing.
    Init {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the loop until every task is settled or Ctrl-C.
    Run(RunArgs),
    /// Print the task list and the task that would run next.
    Tasks {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// List models offered by a backend. Every invocation queries the backend.
    Models {
        #[arg(long)]
        agent: AgentType,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, default_value = ".")]
    dir: PathBuf,
    /// Backend for this session (overrides config).
    #[arg(long)]
    agent: Option<AgentType>,
    #[arg(long)]
    model: Option<String>,
    /// `planning` or `building` (overrides config).
    #[arg(long)]
    mode: Option<LoopMode>,
    /// Print one JSON event per line instead of text.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        CliCommand::Init { dir, force } => cmd_init(&dir, force),
        CliCommand::Tasks { dir } => cmd_tasks(&dir),
        CliCommand::Run(args) => runtime()?.block_on(cmd_run(args)),
        CliCommand::Models { agent, dir } => runtime()?.block_on(cmd_models(&dir, agent)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")
}

fn cmd_init(dir: &Path, force: bool) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    if force || !paths.config_path.exists() {
        write_config(&paths.config_path, &RalphConfig::default())?;
        println!("wrote {}", paths.config_path.display());
    }
    if force || !paths.tasks_path.exists() {
        save_tasks(&paths.tasks_path, &[])?;
        println!("wrote {}", paths.tasks_path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_tasks(dir: &Path) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    let tasks = load_tasks(&paths.tasks_path)?;
    for task in &tasks {
        println!("{}", task_line(task));
    }
    match next_task_index(&tasks) {
        Some(idx) => {
            println!("next: {}", tasks[idx].id);
            Ok(exit_codes::OK)
        }
        None if all_settled(&tasks) => {
            println!("all tasks settled");
            Ok(exit_codes::COMPLETE)
        }
        None => {
            println!("no pending tasks");
            Ok(exit_codes::COMPLETE)
        }
    }
}

async fn cmd_models(dir: &Path, agent: AgentType) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    let config = load_config(&paths.config_path)?;
    let factory = CliAdapterFactory::new(&paths.root, &config);
    let cancel = CancellationToken::new();
    for model in factory.list_models(&cancel, agent).await? {
        println!("{model}");
    }
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs) -> Result<i32> {
    let paths = ProjectPaths::new(&args.dir);
    let mut config = load_config(&paths.config_path)?;
    if let Some(agent) = args.agent {
        config.agent = agent;
    }
    if args.model.is_some() {
        config.model = args.model;
    }

    let factory = Arc::new(CliAdapterFactory::new(&paths.root, &config));
    let validator = Arc::new(CommandValidator::new(
        &paths.root,
        config.validation_output_limit_bytes,
    ));
    let mut mode = args.mode.unwrap_or(config.mode);
    let (orchestrator, host) = Orchestrator::new(paths, config, factory, validator)?;
    // An explicit flag beats the mode persisted by the previous session.
    let orchestrator = match args.mode {
        Some(mode) => orchestrator.with_mode_override(mode),
        None => orchestrator,
    };
    let HostChannels {
        mut events,
        commands,
    } = host;

    let cancel = CancellationToken::new();
    let mut loop_task = tokio::spawn(orchestrator.run(cancel.clone()));
    let mut keys = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let outcome = loop {
        tokio::select! {
            joined = &mut loop_task => break joined.context("orchestrator task panicked")?,
            Some(event) = events.recv() => {
                if let Event::Snapshot(snapshot) = &event
                    && let Some(current) = snapshot.state.loop_mode
                {
                    mode = current;
                }
                if let Event::ModeChanged { mode: current } = &event {
                    mode = *current;
                }
                render(&event, args.json)?;
            }
            line = keys.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Some(command) = parse_key(&line, mode) {
                        if command == Command::Stop {
                            cancel.cancel();
                        }
                        if commands.try_send(command).is_err() {
                            warn!("command channel full, dropping command");
                        }
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    debug!(err = %err, "stdin closed");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => cancel.cancel(),
        }
    };

    while let Ok(event) = events.try_recv() {
        render(&event, args.json)?;
    }
    Ok(stop_code(outcome?))
}

fn stop_code(stop: LoopStop) -> i32 {
    match stop {
        LoopStop::Complete => exit_codes::OK,
        LoopStop::Cancelled => exit_codes::CANCELLED,
    }
}

/// Map a stdin line to a loop command.
fn parse_key(line: &str, mode: LoopMode) -> Option<Command> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "p" => Some(Command::TogglePause),
        "r" => Some(Command::Retry),
        "s" => Some(Command::Skip),
        "m" => Some(Command::ChangeMode(mode.toggled())),
        "q" => Some(Command::Stop),
        "a" => {
            let agent = AgentType::from_name_or_default(words.next()?);
            let model = words.next().map(str::to_string);
            Some(Command::ChangeAdapter { agent, model })
        }
        other => {
            eprintln!("unknown key {other:?} (p pause, r retry, s skip, m mode, a <agent> [model], q quit)");
            None
        }
    }
}

fn render(event: &Event, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event).context("serialize event")?);
        return Ok(());
    }
    match event {
        Event::Snapshot(snapshot) => {
            let pending = next_task_index(&snapshot.tasks).map(|idx| &snapshot.tasks[idx].id);
            debug!(
                tasks = snapshot.tasks.len(),
                next = ?pending,
                status = ?snapshot.state.loop_status,
                "snapshot"
            );
        }
        Event::Output { text, .. } => println!("{text}"),
        Event::IterationStarted {
            iteration, title, ..
        } => println!("== iteration {iteration}: {title}"),
        Event::IterationComplete {
            iteration,
            validation,
            passed,
            duration,
            agent_error,
            ..
        } => {
            let verdict = if *passed { "passed" } else { "failed" };
            println!(
                "== iteration {iteration} {verdict} in {:.1}s",
                duration.as_secs_f64()
            );
            if let Some(reason) = agent_error {
                println!("   agent: {reason}");
            }
            if let Some(result) = validation.as_ref().filter(|result| !result.passed) {
                println!("   validation `{}` failed:\n{}", result.command, result.output);
            }
        }
        Event::Done => println!("== all tasks settled"),
        Event::Error { message, .. } => eprintln!("error: {message}"),
        Event::Paused => println!("== paused"),
        Event::Resumed => println!("== resumed"),
        Event::ModeChanged { mode } => println!("== mode: {}", mode.as_str()),
    }
    Ok(())
}

fn task_line(task: &Task) -> String {
    format!(
        "[{}] {} (priority {}): {}",
        task.status.as_str(),
        task.id,
        task.priority,
        task.title
    )
}
