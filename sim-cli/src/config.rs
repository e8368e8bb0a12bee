use std::{fs, path::Path};

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use sleepy_core::config::{
    AlternatingConfig, DEFAULT_CONFIRM_FAST_EPS, DEFAULT_CONFIRM_SLOW_KAPPA,
    DEFAULT_FRACTION_LOW_PARTICIPATION, IidConfig, MomoseRenConfig, ParticipationConfig,
    RawConfig, SimConfiguration,
};

use crate::events::OutputArgs;

#[derive(Args)]
pub struct SimulateArgs {
    /// Last round to simulate; rounds run from 0 up to and including this one.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), default_value_t = 1)]
    pub t_horizon: u64,
    /// Number of parties.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), default_value_t = 5)]
    pub n: u64,
    #[arg(long, default_value_t = 1.0)]
    pub probability_lottery_block: f64,
    #[arg(long, default_value_t = 1.0)]
    pub probability_lottery_vote: f64,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Rounds a block must age before it counts as k-deep confirmed.
    #[arg(long, default_value_t = DEFAULT_CONFIRM_SLOW_KAPPA)]
    pub confirm_slow_kappa: u64,
    #[arg(long, default_value_t = DEFAULT_CONFIRM_FAST_EPS)]
    pub confirm_fast_eps: f64,
    /// Also emit an event for every proposed block.
    #[arg(long)]
    pub trace_blocks: bool,
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(subcommand)]
    pub model: ModelCommand,
}

#[derive(Clone, Subcommand)]
pub enum ModelCommand {
    FullParticipation,
    IidParticipation {
        #[arg(long, default_value_t = 0.6)]
        fraction_iid: f64,
        #[arg(long)]
        fraction_participation_lb: f64,
    },
    SimpleAlternatingParticipation {
        #[arg(long, default_value_t = 0.0)]
        fraction_warmup: f64,
        /// Share of each full/low cycle spent at low participation.
        #[arg(long, default_value_t = DEFAULT_FRACTION_LOW_PARTICIPATION)]
        fraction_low_participation: f64,
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..), default_value_t = 1)]
        periods: u64,
        #[arg(long, default_value_t = 0.5)]
        low_participation: f64,
    },
    MomoseRenParticipation {
        #[arg(long, default_value_t = 0.2)]
        fraction_warmup: f64,
        #[arg(long, default_value_t = 0.01)]
        fraction_crement: f64,
        #[arg(long)]
        fraction_low_participation_lb: f64,
        #[arg(long)]
        fraction_low_participation_ub: f64,
        #[arg(long)]
        fraction_high_participation_lb: f64,
        #[arg(long)]
        fraction_high_participation_ub: f64,
    },
}

impl From<ModelCommand> for ParticipationConfig {
    fn from(value: ModelCommand) -> Self {
        match value {
            ModelCommand::FullParticipation => Self::FullParticipation,
            ModelCommand::IidParticipation {
                fraction_iid,
                fraction_participation_lb,
            } => Self::IidParticipation(IidConfig {
                fraction_iid,
                fraction_participation_lb,
            }),
            ModelCommand::SimpleAlternatingParticipation {
                fraction_warmup,
                fraction_low_participation,
                periods,
                low_participation,
            } => Self::SimpleAlternatingParticipation(AlternatingConfig {
                fraction_warmup,
                fraction_low_participation,
                periods,
                low_participation,
            }),
            ModelCommand::MomoseRenParticipation {
                fraction_warmup,
                fraction_crement,
                fraction_low_participation_lb,
                fraction_low_participation_ub,
                fraction_high_participation_lb,
                fraction_high_participation_ub,
            } => Self::MomoseRenParticipation(MomoseRenConfig {
                fraction_warmup,
                fraction_crement,
                fraction_low_participation_lb,
                fraction_low_participation_ub,
                fraction_high_participation_lb,
                fraction_high_participation_ub,
            }),
        }
    }
}

impl From<&SimulateArgs> for RawConfig {
    fn from(args: &SimulateArgs) -> Self {
        RawConfig {
            seed: Some(args.seed),
            t_horizon: args.t_horizon,
            n: args.n,
            probability_lottery_block: args.probability_lottery_block,
            probability_lottery_vote: args.probability_lottery_vote,
            confirm_slow_kappa: Some(args.confirm_slow_kappa),
            confirm_fast_eps: Some(args.confirm_fast_eps),
            trace_blocks: args.trace_blocks,
            participation: args.model.clone().into(),
        }
    }
}

/// Reads a parameter file, as TOML unless its extension says YAML.
pub fn read_config_file(path: &Path, seed: Option<u64>) -> Result<SimConfiguration> {
    let file = fs::read_to_string(path)
        .with_context(|| format!("could not read parameters from {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    let mut raw_config: RawConfig = if is_yaml {
        serde_yaml::from_str(&file)
            .with_context(|| format!("invalid parameters in {}", path.display()))?
    } else {
        toml::from_str(&file).with_context(|| format!("invalid parameters in {}", path.display()))?
    };
    if let Some(seed) = seed {
        raw_config.seed = Some(seed);
    }
    read_config(raw_config)
}

pub fn read_config(raw_config: RawConfig) -> Result<SimConfiguration> {
    let config: SimConfiguration = raw_config.into();
    config.validate()?;
    Ok(config)
}
