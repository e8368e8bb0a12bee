use anyhow::{Context as _, Result};
use rand_chacha::{ChaChaRng, rand_core::SeedableRng};
use tracing::{debug, info, trace};

use crate::{
    clock::{Round, RoundClock},
    config::SimConfiguration,
    events::EventTracker,
    model::{Party, PartyId},
    sim::{
        ledger::BlockTree,
        lottery::LotterySampler,
        metrics::{MetricsRecorder, RoundState, Summary},
        participation::ParticipationScheduler,
    },
};

pub mod ledger;
pub mod lottery;
pub mod metrics;
pub mod participation;

pub struct Simulation {
    config: SimConfiguration,
    tracker: EventTracker,
    rng: ChaChaRng,
    clock: RoundClock,
    parties: Vec<Party>,
    scheduler: ParticipationScheduler,
    sampler: LotterySampler,
    ledger: BlockTree,
    recorder: MetricsRecorder,
}

impl Simulation {
    pub fn new(config: SimConfiguration, tracker: EventTracker) -> Result<Self> {
        config.validate()?;
        let rng = ChaChaRng::seed_from_u64(config.seed);
        let clock = RoundClock::new(config.t_horizon);
        let parties = (0..config.n).map(|id| Party::new(PartyId::new(id))).collect();
        let scheduler = ParticipationScheduler::new(&config)?;
        let sampler = LotterySampler::new(&config)?;
        let ledger = BlockTree::new(config.n, config.fast_confirmation_threshold());
        let recorder = MetricsRecorder::new(tracker.clone(), config.confirm_slow_kappa);
        Ok(Self {
            config,
            tracker,
            rng,
            clock,
            parties,
            scheduler,
            sampler,
            ledger,
            recorder,
        })
    }

    /// Runs every remaining round, then reports the summary.
    pub fn run(&mut self) -> Result<Summary> {
        info!(
            "simulating {} rounds with {} parties under {}",
            self.clock.total_rounds(),
            self.config.n,
            self.config.participation.name(),
        );
        self.tracker.track_config(&self.config);
        while let Some(round) = self.clock.tick() {
            self.run_round(round)
                .with_context(|| format!("failed to simulate round {round}"))?;
        }
        Ok(self.recorder.finish(&self.ledger))
    }

    pub fn ledger(&self) -> &BlockTree {
        &self.ledger
    }

    fn run_round(&mut self, round: Round) -> Result<()> {
        let target = self
            .scheduler
            .schedule(round, &mut self.parties, &mut self.rng)?;
        self.sampler.sample(&mut self.parties, &mut self.rng);

        self.ledger.begin_round(round)?;
        let mut blocks_created = 0;
        for party in self.parties.iter().filter(|p| p.lottery.is_proposer) {
            let id = self.ledger.propose(party.id, round)?;
            debug!("party {} proposed block {id} in round {round}", party.id);
            blocks_created += 1;
            if self.config.trace_blocks {
                if let Some(block) = self.ledger.get(id) {
                    self.tracker.track_block_proposed(block);
                }
            }
        }
        for party in self.parties.iter().filter(|p| p.lottery.is_voter) {
            self.ledger.vote(party.id, round)?;
        }

        let update = self.ledger.resolve_head();
        if update.reorg {
            debug!(
                "round {round}: reorg of depth {} from block {} to block {}",
                update.reorg_depth, update.previous, update.head
            );
        }
        trace!(
            "round {round}: head {} after {} votes",
            update.head, update.votes_counted
        );

        self.recorder.record_round(RoundState {
            round,
            parties: &self.parties,
            target_participation: target,
            blocks_created,
            update,
            ledger: &self.ledger,
        });
        Ok(())
    }
}
