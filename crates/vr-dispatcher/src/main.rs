//! vr-dispatcherd entry point.
//!
//! Reads a JSON array of commands, dispatches them over ssh and prints the
//! answers as a JSON array in input order. Commands for different routers
//! run in parallel; commands for the same router run in input order.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vr_dispatcher::{Answer, AppConfig, Dispatcher, DEFAULT_CONFIG_PATH};
use vr_transport::SshExecutor;
use vr_types::NetworkElementCommand;

/// Virtual router command dispatcher
#[derive(Parser, Debug)]
#[command(name = "vr-dispatcherd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// JSON file with the commands to dispatch (stdin if omitted)
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Log level, overrides the config file (RUST_LOG still wins)
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn read_commands(input: Option<&PathBuf>) -> Result<Vec<NetworkElementCommand>> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read commands from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Failed to parse commands")
}

async fn run(args: Args) -> Result<()> {
    let loaded = AppConfig::read_file(&args.config)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();
    init_logging(args.log_level.as_deref().unwrap_or(&config.logging.level))?;
    if !found {
        warn!(path = %args.config.display(), "Config file not found, using defaults");
    }
    config.validate()?;

    let commands = read_commands(args.input.as_ref())?;
    info!(
        commands = commands.len(),
        config = %args.config.display(),
        "--- Starting vr-dispatcherd ---"
    );

    let executor = Arc::new(SshExecutor::new(config.transport.clone()));
    let dispatcher = Arc::new(Dispatcher::new(executor.clone(), &config.dispatcher));
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut per_target: BTreeMap<String, Vec<(usize, NetworkElementCommand)>> = BTreeMap::new();
    for (index, command) in commands.into_iter().enumerate() {
        per_target
            .entry(command.target.name.clone())
            .or_default()
            .push((index, command));
    }
    let targets: Vec<String> = per_target.keys().cloned().collect();
    let total: usize = per_target.values().map(Vec::len).sum();

    {
        let executor = executor.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling in-flight operations");
                shutdown.store(true, Ordering::SeqCst);
                for target in &targets {
                    executor.cancel_target(target);
                }
            }
        });
    }

    let mut tasks = JoinSet::new();
    for (_, queue) in per_target {
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let mut answers = Vec::with_capacity(queue.len());
            for (index, command) in queue {
                let answer = if shutdown.load(Ordering::SeqCst) {
                    Answer::failure("Dispatcher interrupted before the command ran")
                } else {
                    dispatcher.dispatch(&command).await
                };
                answers.push((index, answer));
            }
            answers
        });
    }

    let mut answers: Vec<Option<Answer>> = vec![None; total];
    while let Some(joined) = tasks.join_next().await {
        for (index, answer) in joined.context("Dispatch task failed")? {
            answers[index] = Some(answer);
        }
    }
    let answers: Vec<Answer> = answers.into_iter().flatten().collect();

    let failed = answers.iter().filter(|a| !a.result()).count();
    println!("{}", serde_json::to_string_pretty(&answers)?);
    info!(answers = answers.len(), failed, "vr-dispatcherd finished");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "vr-dispatcherd failed");
            eprintln!("vr-dispatcherd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
