use anyhow::Result;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution as _};

use crate::{
    config::SimConfiguration,
    model::{LotteryResult, Party},
    probability::bernoulli,
};

/// Simulates sortition: every online party independently checks whether
/// it may propose a block and whether it may vote this round.
#[derive(Debug, Clone)]
pub struct LotterySampler {
    block: Bernoulli,
    vote: Bernoulli,
}

impl LotterySampler {
    pub fn new(config: &SimConfiguration) -> Result<Self> {
        Ok(Self {
            block: bernoulli(config.probability_lottery_block)?,
            vote: bernoulli(config.probability_lottery_vote)?,
        })
    }

    /// Draws this round's lottery for every party, in index order.
    /// Offline parties lose both lotteries and consume no randomness.
    pub fn sample<R: Rng + ?Sized>(&self, parties: &mut [Party], rng: &mut R) {
        for party in parties.iter_mut() {
            party.lottery = if party.online {
                LotteryResult {
                    is_proposer: self.block.sample(rng),
                    is_voter: self.vote.sample(rng),
                }
            } else {
                LotteryResult::default()
            };
        }
    }
}
