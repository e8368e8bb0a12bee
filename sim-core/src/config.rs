use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIRM_SLOW_KAPPA: u64 = 10;
pub const DEFAULT_CONFIRM_FAST_EPS: f64 = 0.001;
pub const DEFAULT_FRACTION_LOW_PARTICIPATION: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    pub seed: Option<u64>,
    pub t_horizon: u64,
    pub n: u64,
    pub probability_lottery_block: f64,
    pub probability_lottery_vote: f64,
    pub confirm_slow_kappa: Option<u64>,
    pub confirm_fast_eps: Option<f64>,
    #[serde(default)]
    pub trace_blocks: bool,
    pub participation: ParticipationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum ParticipationConfig {
    FullParticipation,
    IidParticipation(IidConfig),
    SimpleAlternatingParticipation(AlternatingConfig),
    MomoseRenParticipation(MomoseRenConfig),
}

impl ParticipationConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FullParticipation => "full-participation",
            Self::IidParticipation(_) => "iid-participation",
            Self::SimpleAlternatingParticipation(_) => "simple-alternating-participation",
            Self::MomoseRenParticipation(_) => "momose-ren-participation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IidConfig {
    /// Chance that a party is in the fully participating regime for a round.
    pub fraction_iid: f64,
    /// Chance that a party outside that regime is online anyway.
    pub fraction_participation_lb: f64,
}

impl IidConfig {
    pub fn expected_online_fraction(&self) -> f64 {
        self.fraction_iid + (1.0 - self.fraction_iid) * self.fraction_participation_lb
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternatingConfig {
    #[serde(default)]
    pub fraction_warmup: f64,
    /// Share of each full/low cycle spent at low participation.
    #[serde(default = "default_fraction_low_participation")]
    pub fraction_low_participation: f64,
    pub periods: u64,
    pub low_participation: f64,
}

fn default_fraction_low_participation() -> f64 {
    DEFAULT_FRACTION_LOW_PARTICIPATION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomoseRenConfig {
    pub fraction_warmup: f64,
    pub fraction_crement: f64,
    pub fraction_low_participation_lb: f64,
    pub fraction_low_participation_ub: f64,
    pub fraction_high_participation_lb: f64,
    pub fraction_high_participation_ub: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimConfiguration {
    pub seed: u64,
    pub t_horizon: u64,
    pub n: usize,
    pub probability_lottery_block: f64,
    pub probability_lottery_vote: f64,
    pub confirm_slow_kappa: u64,
    pub confirm_fast_eps: f64,
    #[serde(skip)]
    pub trace_blocks: bool,
    pub participation: ParticipationConfig,
}

impl From<RawConfig> for SimConfiguration {
    fn from(value: RawConfig) -> Self {
        Self {
            seed: value.seed.unwrap_or_default(),
            t_horizon: value.t_horizon,
            n: value.n as usize,
            probability_lottery_block: value.probability_lottery_block,
            probability_lottery_vote: value.probability_lottery_vote,
            confirm_slow_kappa: value
                .confirm_slow_kappa
                .unwrap_or(DEFAULT_CONFIRM_SLOW_KAPPA),
            confirm_fast_eps: value.confirm_fast_eps.unwrap_or(DEFAULT_CONFIRM_FAST_EPS),
            trace_blocks: value.trace_blocks,
            participation: value.participation,
        }
    }
}

impl SimConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.t_horizon == 0 {
            bail!("t-horizon must be at least 1");
        }
        if self.n == 0 {
            bail!("n must be at least 1");
        }
        check_fraction("probability-lottery-block", self.probability_lottery_block)?;
        check_fraction("probability-lottery-vote", self.probability_lottery_vote)?;
        check_fraction("confirm-fast-eps", self.confirm_fast_eps)?;

        match &self.participation {
            ParticipationConfig::FullParticipation => {}
            ParticipationConfig::IidParticipation(iid) => {
                check_fraction("fraction-iid", iid.fraction_iid)?;
                check_fraction("fraction-participation-lb", iid.fraction_participation_lb)?;
            }
            ParticipationConfig::SimpleAlternatingParticipation(alt) => {
                if alt.periods < 1 {
                    bail!("periods must be at least 1");
                }
                check_fraction("low-participation", alt.low_participation)?;
                check_fraction("fraction-low-participation", alt.fraction_low_participation)?;
                check_fraction("fraction-warmup", alt.fraction_warmup)?;
                if alt.fraction_warmup >= 1.0 {
                    bail!("fraction-warmup must leave room for at least one period");
                }
            }
            ParticipationConfig::MomoseRenParticipation(mr) => {
                check_fraction("fraction-warmup", mr.fraction_warmup)?;
                check_fraction("fraction-crement", mr.fraction_crement)?;
                if mr.fraction_crement <= 0.0 {
                    bail!("fraction-crement must be positive");
                }
                check_band(
                    "fraction-low-participation",
                    mr.fraction_low_participation_lb,
                    mr.fraction_low_participation_ub,
                )?;
                check_band(
                    "fraction-high-participation",
                    mr.fraction_high_participation_lb,
                    mr.fraction_high_participation_ub,
                )?;
            }
        }
        Ok(())
    }

    /// Votes a block's subtree needs within a single round to be fast-confirmed.
    pub fn fast_confirmation_threshold(&self) -> u64 {
        let expected_voters = self.n as f64 * self.probability_lottery_vote;
        let threshold = (expected_voters * (0.75 + 0.5 * self.confirm_fast_eps)).ceil() as u64;
        threshold.max(1)
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{name} must be in [0, 1] (got {value})");
    }
    Ok(())
}

fn check_band(name: &str, lb: f64, ub: f64) -> Result<()> {
    check_fraction(&format!("{name}-lb"), lb)?;
    check_fraction(&format!("{name}-ub"), ub)?;
    if lb > ub {
        bail!("{name}-lb ({lb}) must not exceed {name}-ub ({ub})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        AlternatingConfig, IidConfig, MomoseRenConfig, ParticipationConfig, RawConfig,
        SimConfiguration,
    };

    fn raw(participation: ParticipationConfig) -> RawConfig {
        RawConfig {
            seed: None,
            t_horizon: 100,
            n: 10,
            probability_lottery_block: 0.5,
            probability_lottery_vote: 0.5,
            confirm_slow_kappa: None,
            confirm_fast_eps: None,
            trace_blocks: false,
            participation,
        }
    }

    fn momose_ren() -> MomoseRenConfig {
        MomoseRenConfig {
            fraction_warmup: 0.2,
            fraction_crement: 0.01,
            fraction_low_participation_lb: 0.2,
            fraction_low_participation_ub: 0.4,
            fraction_high_participation_lb: 0.7,
            fraction_high_participation_ub: 0.9,
        }
    }

    #[test]
    fn should_fill_in_defaults() {
        let config: SimConfiguration = raw(ParticipationConfig::FullParticipation).into();
        assert_eq!(config.seed, 0);
        assert_eq!(config.confirm_slow_kappa, 10);
        assert_eq!(config.confirm_fast_eps, 0.001);
        config.validate().unwrap();
    }

    #[test]
    fn should_reject_empty_runs() {
        let mut config: SimConfiguration = raw(ParticipationConfig::FullParticipation).into();
        config.t_horizon = 0;
        assert!(config.validate().is_err());

        let mut config: SimConfiguration = raw(ParticipationConfig::FullParticipation).into();
        config.n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_probabilities_outside_unit_interval() {
        let mut config: SimConfiguration = raw(ParticipationConfig::FullParticipation).into();
        config.probability_lottery_block = 1.5;
        assert!(config.validate().is_err());

        let mut config: SimConfiguration = raw(ParticipationConfig::FullParticipation).into();
        config.probability_lottery_vote = -0.1;
        assert!(config.validate().is_err());

        let mut config: SimConfiguration = raw(ParticipationConfig::FullParticipation).into();
        config.probability_lottery_vote = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_periods() {
        let config: SimConfiguration = raw(ParticipationConfig::SimpleAlternatingParticipation(
            AlternatingConfig {
                fraction_warmup: 0.0,
                fraction_low_participation: 0.5,
                periods: 0,
                low_participation: 0.1,
            },
        ))
        .into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_low_share_outside_unit_interval() {
        let config: SimConfiguration = raw(ParticipationConfig::SimpleAlternatingParticipation(
            AlternatingConfig {
                fraction_warmup: 0.0,
                fraction_low_participation: 1.5,
                periods: 2,
                low_participation: 0.1,
            },
        ))
        .into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fraction-low-participation"));
    }

    #[test]
    fn should_reject_inverted_bands() {
        let mut mr = momose_ren();
        mr.fraction_high_participation_lb = 0.95;
        let config: SimConfiguration =
            raw(ParticipationConfig::MomoseRenParticipation(mr)).into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fraction-high-participation-lb"));

        let config: SimConfiguration =
            raw(ParticipationConfig::MomoseRenParticipation(momose_ren())).into();
        config.validate().unwrap();
    }

    #[test]
    fn should_reject_bad_iid_fractions() {
        let config: SimConfiguration =
            raw(ParticipationConfig::IidParticipation(IidConfig {
                fraction_iid: 0.6,
                fraction_participation_lb: 1.2,
            }))
            .into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_compute_expected_iid_fraction() {
        let iid = IidConfig {
            fraction_iid: 0.6,
            fraction_participation_lb: 0.5,
        };
        assert!((iid.expected_online_fraction() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn should_never_require_zero_votes_for_fast_confirmation() {
        let mut config: SimConfiguration = raw(ParticipationConfig::FullParticipation).into();
        config.probability_lottery_vote = 0.0;
        assert_eq!(config.fast_confirmation_threshold(), 1);

        config.probability_lottery_vote = 1.0;
        config.n = 100;
        assert_eq!(config.fast_confirmation_threshold(), 76);
    }

    #[test]
    fn should_round_trip_participation_models_through_serde() {
        let config = ParticipationConfig::MomoseRenParticipation(momose_ren());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"model\":\"momose-ren-participation\""));
        let parsed: ParticipationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
