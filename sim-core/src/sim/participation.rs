use anyhow::Result;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution as _};
use serde::Serialize;

use crate::{
    clock::Round,
    config::{AlternatingConfig, IidConfig, MomoseRenConfig, ParticipationConfig, SimConfiguration},
    model::Party,
    probability::{BoundedWalk, bernoulli},
};

/// Decides which parties are online each round.
///
/// Every model works from a target fraction and then flips an independent
/// coin per party, so the online count fluctuates around the target.
#[derive(Debug)]
pub enum ParticipationScheduler {
    Full,
    Iid(IidSchedule),
    SimpleAlternating(AlternatingSchedule),
    MomoseRen(MomoseRenSchedule),
}

impl ParticipationScheduler {
    pub fn new(config: &SimConfiguration) -> Result<Self> {
        Ok(match &config.participation {
            ParticipationConfig::FullParticipation => Self::Full,
            ParticipationConfig::IidParticipation(iid) => Self::Iid(IidSchedule::new(iid)?),
            ParticipationConfig::SimpleAlternatingParticipation(alt) => {
                Self::SimpleAlternating(AlternatingSchedule::new(alt, config.t_horizon)?)
            }
            ParticipationConfig::MomoseRenParticipation(mr) => {
                Self::MomoseRen(MomoseRenSchedule::new(mr, config.t_horizon))
            }
        })
    }

    /// Marks every party online or offline for `round`, returning the
    /// fraction of parties the model aimed for.
    pub fn schedule<R: Rng + ?Sized>(
        &mut self,
        round: Round,
        parties: &mut [Party],
        rng: &mut R,
    ) -> Result<f64> {
        match self {
            Self::Full => {
                for party in parties.iter_mut() {
                    party.online = true;
                }
                Ok(1.0)
            }
            Self::Iid(schedule) => {
                schedule.schedule(parties, rng);
                Ok(schedule.expected_fraction)
            }
            Self::SimpleAlternating(schedule) => schedule.schedule(round, parties, rng),
            Self::MomoseRen(schedule) => schedule.schedule(round, parties, rng),
        }
    }
}

#[derive(Debug)]
pub struct IidSchedule {
    regime: Bernoulli,
    fallback: Bernoulli,
    expected_fraction: f64,
}

impl IidSchedule {
    fn new(config: &IidConfig) -> Result<Self> {
        Ok(Self {
            regime: bernoulli(config.fraction_iid)?,
            fallback: bernoulli(config.fraction_participation_lb)?,
            expected_fraction: config.expected_online_fraction(),
        })
    }

    fn schedule<R: Rng + ?Sized>(&self, parties: &mut [Party], rng: &mut R) {
        for party in parties.iter_mut() {
            // parties in the typical regime are always online,
            // the rest only show up at the baseline rate
            party.online = self.regime.sample(rng) || self.fallback.sample(rng);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlternatingPhase {
    Warmup,
    Full,
    Low,
}

#[derive(Debug)]
pub struct AlternatingSchedule {
    warmup_rounds: u64,
    periods: u64,
    total_rounds: u64,
    fraction_low_participation: f64,
    low_participation: f64,
    low: Bernoulli,
}

impl AlternatingSchedule {
    fn new(config: &AlternatingConfig, t_horizon: u64) -> Result<Self> {
        let total_rounds = t_horizon + 1;
        let warmup_rounds = (config.fraction_warmup * t_horizon as f64).floor() as u64;
        Ok(Self {
            warmup_rounds: warmup_rounds.min(t_horizon),
            periods: config.periods,
            total_rounds,
            fraction_low_participation: config.fraction_low_participation,
            low_participation: config.low_participation,
            low: bernoulli(config.low_participation)?,
        })
    }

    /// After the warm-up the remaining rounds are cut into `periods` equal
    /// phases. Each consecutive pair of phases is one full/low cycle, and
    /// the last `fraction_low_participation` of every cycle runs low.
    pub fn phase(&self, round: Round) -> AlternatingPhase {
        let Some(progress) = round.number().checked_sub(self.warmup_rounds) else {
            return AlternatingPhase::Warmup;
        };
        let span = u128::from(self.total_rounds - self.warmup_rounds);
        let progress = u128::from(progress).min(span - 1);
        // position within the cycle, where one phase spans `span` units
        let cycle = 2 * span;
        let position = progress * u128::from(self.periods) % cycle;
        if position as f64 >= cycle as f64 * (1.0 - self.fraction_low_participation) {
            AlternatingPhase::Low
        } else {
            AlternatingPhase::Full
        }
    }

    fn schedule<R: Rng + ?Sized>(
        &self,
        round: Round,
        parties: &mut [Party],
        rng: &mut R,
    ) -> Result<f64> {
        match self.phase(round) {
            AlternatingPhase::Warmup | AlternatingPhase::Full => {
                for party in parties.iter_mut() {
                    party.online = true;
                }
                Ok(1.0)
            }
            AlternatingPhase::Low => {
                for party in parties.iter_mut() {
                    party.online = self.low.sample(rng);
                }
                Ok(self.low_participation)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MomoseRenStage {
    Warmup,
    Ramp,
    Hold,
}

/// Low participation during warm-up, a linear climb into the high band,
/// then a random walk inside the high band for the rest of the run.
#[derive(Debug)]
pub struct MomoseRenSchedule {
    warmup_rounds: u64,
    ramp_rounds: u64,
    crement: f64,
    low_ub: f64,
    high_lb: f64,
    low_walk: BoundedWalk,
    high_walk: BoundedWalk,
    stage: Option<MomoseRenStage>,
}

impl MomoseRenSchedule {
    fn new(config: &MomoseRenConfig, t_horizon: u64) -> Self {
        let warmup_rounds = (config.fraction_warmup * t_horizon as f64).floor() as u64;
        let gap = config.fraction_high_participation_lb - config.fraction_low_participation_ub;
        let ramp_rounds = if gap > 0.0 {
            (gap / config.fraction_crement).ceil() as u64
        } else {
            0
        };
        Self {
            warmup_rounds,
            ramp_rounds,
            crement: config.fraction_crement,
            low_ub: config.fraction_low_participation_ub,
            high_lb: config.fraction_high_participation_lb,
            low_walk: BoundedWalk::centered(
                config.fraction_low_participation_lb,
                config.fraction_low_participation_ub,
                config.fraction_crement,
            ),
            high_walk: BoundedWalk::centered(
                config.fraction_high_participation_lb,
                config.fraction_high_participation_ub,
                config.fraction_crement,
            ),
            stage: None,
        }
    }

    pub fn stage(&self, round: Round) -> MomoseRenStage {
        let r = round.number();
        if r < self.warmup_rounds {
            MomoseRenStage::Warmup
        } else if r < self.warmup_rounds.saturating_add(self.ramp_rounds) {
            MomoseRenStage::Ramp
        } else {
            MomoseRenStage::Hold
        }
    }

    fn level<R: Rng + ?Sized>(&mut self, round: Round, rng: &mut R) -> f64 {
        let stage = self.stage(round);
        let entering = self.stage != Some(stage);
        self.stage = Some(stage);
        match stage {
            MomoseRenStage::Warmup if entering => self.low_walk.level(),
            MomoseRenStage::Warmup => self.low_walk.advance(rng),
            MomoseRenStage::Ramp => {
                let step = (round.number() - self.warmup_rounds + 1) as f64;
                (self.low_ub + step * self.crement).min(self.high_lb)
            }
            MomoseRenStage::Hold if entering => self.high_walk.level(),
            MomoseRenStage::Hold => self.high_walk.advance(rng),
        }
    }

    fn schedule<R: Rng + ?Sized>(
        &mut self,
        round: Round,
        parties: &mut [Party],
        rng: &mut R,
    ) -> Result<f64> {
        let level = self.level(round, rng);
        let online = bernoulli(level.clamp(0.0, 1.0))?;
        for party in parties.iter_mut() {
            party.online = online.sample(rng);
        }
        Ok(level)
    }
}
