use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser, Subcommand};
use config::SimulateArgs;
use events::{EventMonitor, OutputArgs};
use sleepy_core::{config::SimConfiguration, events::EventTracker, sim::Simulation};
use tokio::{fs, sync::mpsc, task};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod config;
mod events;

#[derive(Parser)]
#[command(
    version,
    about = "Simulates lottery-based longest-chain consensus under dynamic participation"
)]
struct Cli {
    /// Log more (repeatable).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate with parameters given on the command line.
    Simulate(SimulateArgs),
    /// Simulate with parameters read from a TOML or YAML file.
    Run {
        parameters: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn read_config(command: Command) -> Result<(SimConfiguration, OutputArgs)> {
    match command {
        Command::Simulate(args) => {
            let config = config::read_config((&args).into())?;
            Ok((config, args.output))
        }
        Command::Run {
            parameters,
            seed,
            output,
        } => Ok((config::read_config_file(&parameters, seed)?, output)),
    }
}

/// Runs the simulation while a monitor writes out its events. The monitor
/// is always drained, so records emitted before a failure still reach the output.
async fn simulate(config: SimConfiguration, output: OutputArgs) -> Result<()> {
    let (events_sink, events_source) = mpsc::unbounded_channel();
    let monitor =
        tokio::spawn(EventMonitor::new(events_source, output.output, output.format).run());

    let tracker = EventTracker::new(events_sink);
    let outcome = task::spawn_blocking(move || -> Result<Simulation> {
        let mut simulation = Simulation::new(config, tracker)?;
        simulation.run()?;
        Ok(simulation)
    })
    .await
    .map_err(anyhow::Error::from)
    .and_then(|simulation| simulation);

    // the monitor only finishes once every tracker is gone
    let outcome = match outcome {
        Ok(simulation) => write_dot(output.dot.as_deref(), simulation).await,
        Err(error) => Err(error),
    };
    let monitored = monitor.await?;
    outcome?;
    monitored
}

async fn write_dot(path: Option<&Path>, simulation: Simulation) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let dot = simulation.ledger().to_dot();
    drop(simulation);
    fs::write(path, dot)
        .await
        .with_context(|| format!("could not write block tree to {}", path.display()))?;
    info!("wrote block tree to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::builder()
        .with_default_directive(log_level(cli.verbose).into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    let (config, output) = read_config(cli.command)?;
    simulate(config, output).await
}
