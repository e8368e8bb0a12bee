use std::{path::PathBuf, pin::Pin};

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Serialize;
use sleepy_core::{
    events::Event,
    sim::metrics::{RoundRecord, Summary},
};
use tokio::{
    fs::{self, File},
    io::{self, AsyncWrite, AsyncWriteExt as _, BufWriter},
    sync::mpsc,
};
use tracing::{info, info_span, warn};

type TraceSink = Pin<Box<dyn AsyncWrite + Send + 'static>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    JsonStream,
    CborStream,
}

#[derive(Args)]
pub struct OutputArgs {
    /// Where to write the event stream (stdout if omitted).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,
    /// Write the final block tree to this file in Graphviz format.
    #[arg(long)]
    pub dot: Option<PathBuf>,
}

pub struct EventMonitor {
    events_source: mpsc::UnboundedReceiver<Event>,
    output_path: Option<PathBuf>,
    format: OutputFormat,
}

impl EventMonitor {
    pub fn new(
        events_source: mpsc::UnboundedReceiver<Event>,
        output_path: Option<PathBuf>,
        format: OutputFormat,
    ) -> Self {
        Self {
            events_source,
            output_path,
            format,
        }
    }

    // Write every event emitted by the simulation to the output,
    // then report on the run once the simulation hangs up.
    pub async fn run(mut self) -> Result<()> {
        if let Some(path) = &self.output_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file: TraceSink = match &self.output_path {
            Some(path) => Box::pin(BufWriter::new(File::create(path).await?)),
            None => Box::pin(BufWriter::new(io::stdout())),
        };
        let mut output = OutputTarget {
            format: self.format,
            file,
        };

        let mut summary = None;
        while let Some(event) = self.events_source.recv().await {
            match &event {
                Event::Config(config) => {
                    info!(
                        "running {} with seed {}",
                        config.participation.name(),
                        config.seed
                    );
                }
                Event::BlockProposed { .. } => {}
                Event::Round(record) => log_round(record),
                Event::Summary(s) => summary = Some(s.clone()),
            }
            output.write(&event).await?;
        }

        output.flush().await?;

        match summary {
            Some(summary) => log_summary(&summary),
            None => warn!("simulation finished without a summary"),
        }
        Ok(())
    }
}

fn log_round(record: &RoundRecord) {
    info!(
        "round {}: {} online ({:.3}), {} proposer(s), {} vote(s), chain length {}, confirmed depth {}",
        record.round,
        record.online,
        record.online_fraction,
        record.proposers,
        record.votes_counted,
        record.chain_length,
        record.best_confirmed_depth,
    );
}

fn log_summary(summary: &Summary) {
    info_span!("chain").in_scope(|| {
        info!("{} round(s) were simulated.", summary.rounds);
        info!(
            "{} block(s) were proposed, {} of them were orphaned.",
            summary.total_blocks, summary.orphaned_blocks
        );
        info!("The final chain is {} block(s) long.", summary.final_chain_length);
        info!(
            "Confirmed depth: {} (k-deep), {} (fast), {} (best).",
            summary.confirmed_depth, summary.fast_confirmed_depth, summary.best_confirmed_depth
        );
        info!(
            "{} fork(s) were created and {} reorg(s) happened (deepest {}).",
            summary.total_forks, summary.total_reorgs, summary.deepest_reorg
        );
    });

    info_span!("participation").in_scope(|| {
        let stats = &summary.participation;
        info!(
            "Online fraction: {:.3} ± {:.3} (min {:.3}, max {:.3}).",
            stats.mean, stats.std_dev, stats.min, stats.max
        );
    });
}

struct OutputTarget {
    format: OutputFormat,
    file: TraceSink,
}

impl OutputTarget {
    async fn write<T: Serialize>(&mut self, event: &T) -> Result<()> {
        match self.format {
            OutputFormat::JsonStream => {
                let mut string = serde_json::to_string(event)?;
                string.push('\n');
                self.file.write_all(string.as_bytes()).await?;
            }
            OutputFormat::CborStream => {
                let bytes = minicbor_serde::to_vec(event)?;
                self.file.write_all(&bytes).await?;
            }
        }
        Ok(())
    }

    async fn flush(mut self) -> Result<()> {
        self.file.shutdown().await?;
        Ok(())
    }
}
