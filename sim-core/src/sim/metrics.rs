use average::Variance;
use itertools::Itertools as _;
use serde::Serialize;

use crate::{
    clock::Round,
    events::EventTracker,
    model::{BlockId, Party},
    sim::ledger::{BlockTree, HeadUpdate},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: Round,
    pub online: usize,
    pub online_fraction: f64,
    pub target_participation: f64,
    pub proposers: usize,
    pub voters: usize,
    pub votes_counted: u64,
    pub head: BlockId,
    pub chain_length: u64,
    pub blocks_created: usize,
    pub forks_created: usize,
    pub reorg: bool,
    pub reorg_depth: u64,
    pub unresolved_fork_depth: u64,
    pub confirmed_depth: u64,
    pub fast_confirmed_depth: u64,
    pub best_confirmed_depth: u64,
    /// Round in which the k-deep confirmed tip was proposed.
    pub confirmed_round: Round,
    pub fast_confirmed_round: Round,
    pub best_confirmed_round: Round,
    pub total_blocks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub rounds: u64,
    pub final_chain_length: u64,
    pub confirmed_depth: u64,
    pub fast_confirmed_depth: u64,
    pub best_confirmed_depth: u64,
    pub confirmed_round: Round,
    pub fast_confirmed_round: Round,
    pub best_confirmed_round: Round,
    pub total_blocks: usize,
    pub orphaned_blocks: usize,
    pub total_forks: usize,
    pub total_reorgs: u64,
    pub deepest_reorg: u64,
    pub participation: ParticipationStats,
}

/// Distribution of the per-round online fraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipationStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl ParticipationStats {
    pub fn from_fractions<Iter: IntoIterator<Item = f64> + Clone>(data: Iter) -> Self {
        let v: Variance = data.clone().into_iter().collect();
        let (min, max) = data
            .into_iter()
            .minmax_by(f64::total_cmp)
            .into_option()
            .unwrap_or_default();
        Self {
            mean: v.mean(),
            std_dev: v.population_variance().sqrt(),
            min,
            max,
        }
    }
}

/// Depth and proposal round of a confirmed tip.
fn tip_position(ledger: &BlockTree, id: BlockId) -> (u64, Round) {
    ledger
        .get(id)
        .map(|block| (block.depth, block.round))
        .unwrap_or((0, Round::zero()))
}

/// Everything the recorder looks at once a round has been resolved.
pub struct RoundState<'a> {
    pub round: Round,
    pub parties: &'a [Party],
    pub target_participation: f64,
    pub blocks_created: usize,
    pub update: HeadUpdate,
    pub ledger: &'a BlockTree,
}

/// Turns resolved rounds into records and keeps the running totals
/// needed for the final summary.
pub struct MetricsRecorder {
    tracker: EventTracker,
    confirm_slow_kappa: u64,
    participation: Vec<f64>,
    total_forks: usize,
    total_reorgs: u64,
    deepest_reorg: u64,
    last_round: Option<Round>,
}

impl MetricsRecorder {
    pub fn new(tracker: EventTracker, confirm_slow_kappa: u64) -> Self {
        Self {
            tracker,
            confirm_slow_kappa,
            participation: vec![],
            total_forks: 0,
            total_reorgs: 0,
            deepest_reorg: 0,
            last_round: None,
        }
    }

    pub fn record_round(&mut self, state: RoundState) -> RoundRecord {
        let RoundState {
            round,
            parties,
            target_participation,
            blocks_created,
            update,
            ledger,
        } = state;

        let online = parties.iter().filter(|p| p.online).count();
        let online_fraction = if parties.is_empty() {
            0.0
        } else {
            online as f64 / parties.len() as f64
        };
        let proposers = parties.iter().filter(|p| p.lottery.is_proposer).count();
        let voters = parties.iter().filter(|p| p.lottery.is_voter).count();
        let forks_created = blocks_created.saturating_sub(1);

        self.participation.push(online_fraction);
        self.total_forks += forks_created;
        if update.reorg {
            self.total_reorgs += 1;
            self.deepest_reorg = self.deepest_reorg.max(update.reorg_depth);
        }
        self.last_round = Some(round);

        let (confirmed_depth, confirmed_round) =
            tip_position(ledger, ledger.confirmed_tip(round, self.confirm_slow_kappa));
        let (fast_confirmed_depth, fast_confirmed_round) =
            tip_position(ledger, ledger.fast_tip());
        let (best_confirmed_depth, best_confirmed_round) =
            tip_position(ledger, ledger.best_confirmed(round, self.confirm_slow_kappa));
        let record = RoundRecord {
            round,
            online,
            online_fraction,
            target_participation,
            proposers,
            voters,
            votes_counted: update.votes_counted,
            head: update.head,
            chain_length: ledger.head().depth,
            blocks_created,
            forks_created,
            reorg: update.reorg,
            reorg_depth: update.reorg_depth,
            unresolved_fork_depth: update.unresolved_fork_depth,
            confirmed_depth,
            fast_confirmed_depth,
            best_confirmed_depth,
            confirmed_round,
            fast_confirmed_round,
            best_confirmed_round,
            total_blocks: ledger.len() - 1,
        };
        self.tracker.track_round(record.clone());
        record
    }

    pub fn finish(&self, ledger: &BlockTree) -> Summary {
        let (slow, best) = match self.last_round {
            Some(round) => (
                ledger.confirmed_tip(round, self.confirm_slow_kappa),
                ledger.best_confirmed(round, self.confirm_slow_kappa),
            ),
            None => (BlockId::GENESIS, BlockId::GENESIS),
        };
        let (confirmed_depth, confirmed_round) = tip_position(ledger, slow);
        let (fast_confirmed_depth, fast_confirmed_round) = tip_position(ledger, ledger.fast_tip());
        let (best_confirmed_depth, best_confirmed_round) = tip_position(ledger, best);
        let summary = Summary {
            rounds: self.participation.len() as u64,
            final_chain_length: ledger.head().depth,
            confirmed_depth,
            fast_confirmed_depth,
            best_confirmed_depth,
            confirmed_round,
            fast_confirmed_round,
            best_confirmed_round,
            total_blocks: ledger.len() - 1,
            orphaned_blocks: ledger.orphaned(),
            total_forks: self.total_forks,
            total_reorgs: self.total_reorgs,
            deepest_reorg: self.deepest_reorg,
            participation: ParticipationStats::from_fractions(self.participation.iter().copied()),
        };
        self.tracker.track_summary(summary.clone());
        summary
    }
}
