use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Result, anyhow, bail};
use tracing::trace;

use crate::{
    clock::Round,
    model::{Block, BlockId, PartyId, Vote},
};

/// Outcome of running fork choice at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadUpdate {
    pub head: BlockId,
    pub previous: BlockId,
    /// Set when the previous head is no longer on the canonical chain.
    pub reorg: bool,
    /// Blocks abandoned by the reorg, counted from the previous head back to the common ancestor.
    pub reorg_depth: u64,
    pub common_ancestor: BlockId,
    /// Distance from the first weight-tied branch point on the canonical chain to the head.
    pub unresolved_fork_depth: u64,
    pub votes_counted: u64,
}

/// Every block ever proposed, with the votes it has received.
///
/// Blocks live in an arena indexed by their id. Fork choice follows the
/// heaviest subtree from genesis, breaking ties in favour of the older block.
#[derive(Debug)]
pub struct BlockTree {
    n: u64,
    fast_threshold: u64,
    blocks: Vec<Block>,
    children: Vec<Vec<BlockId>>,
    subtree_weight: Vec<u64>,
    head: BlockId,
    fast_tip: BlockId,
    round: Option<Round>,
    proposal_parent: BlockId,
    proposers: HashSet<PartyId>,
    voters: HashSet<PartyId>,
    pending: BTreeMap<BlockId, u64>,
}

impl BlockTree {
    pub fn new(n: usize, fast_threshold: u64) -> Self {
        Self {
            n: n as u64,
            fast_threshold,
            blocks: vec![Block::genesis()],
            children: vec![vec![]],
            subtree_weight: vec![0],
            head: BlockId::GENESIS,
            fast_tip: BlockId::GENESIS,
            round: None,
            proposal_parent: BlockId::GENESIS,
            proposers: HashSet::new(),
            voters: HashSet::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Opens a new round. Everything proposed or voted on in this round
    /// builds on the head as it stands now.
    pub fn begin_round(&mut self, round: Round) -> Result<()> {
        if let Some(current) = self.round {
            if round <= current {
                bail!("round {round} does not follow round {current}");
            }
        }
        self.round = Some(round);
        self.proposers.clear();
        self.voters.clear();
        self.pending.clear();
        self.proposal_parent = self.head;
        Ok(())
    }

    pub fn propose(&mut self, proposer: PartyId, round: Round) -> Result<BlockId> {
        self.check_round(round)?;
        if !self.proposers.insert(proposer) {
            bail!("party {proposer} already proposed a block in round {round}");
        }
        let parent = self.proposal_parent;
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Block {
            id,
            parent: Some(parent),
            round,
            proposer: Some(proposer),
            depth: self.block(parent).depth + 1,
            votes: 0,
            round_votes: 0,
            last_voted: None,
        });
        self.children[parent.to_inner()].push(id);
        self.children.push(vec![]);
        self.subtree_weight.push(0);
        Ok(id)
    }

    /// Votes for the block every proposal this round extends.
    /// Returns whether the vote was counted.
    pub fn vote(&mut self, voter: PartyId, round: Round) -> Result<bool> {
        self.record_vote(Vote {
            voter,
            target: self.proposal_parent,
            round,
        })
    }

    pub fn record_vote(&mut self, vote: Vote) -> Result<bool> {
        let Vote {
            voter,
            target,
            round,
        } = vote;
        self.check_round(round)?;
        let n = self.n;
        let block = self.blocks.get_mut(target.to_inner()).ok_or_else(|| {
            anyhow!("party {voter} voted in round {round} for unknown block {target}")
        })?;
        if self.voters.contains(&voter) {
            trace!("ignoring second vote from party {voter} in round {round}");
            return Ok(false);
        }
        if block.last_voted != Some(round) {
            block.last_voted = Some(round);
            block.round_votes = 0;
        }
        if block.round_votes >= n {
            bail!("block {target} received more than {n} votes in round {round} (from party {voter})");
        }
        block.round_votes += 1;
        block.votes += 1;
        self.voters.insert(voter);
        *self.pending.entry(target).or_default() += 1;
        Ok(true)
    }

    /// Applies this round's votes and runs fork choice.
    pub fn resolve_head(&mut self) -> HeadUpdate {
        let pending = std::mem::take(&mut self.pending);
        let mut round_weight: HashMap<BlockId, u64> = HashMap::new();
        let mut votes_counted = 0;
        for (target, count) in pending {
            votes_counted += count;
            let mut cursor = Some(target);
            while let Some(id) = cursor {
                self.subtree_weight[id.to_inner()] += count;
                *round_weight.entry(id).or_default() += count;
                cursor = self.block(id).parent;
            }
        }

        let mut head = BlockId::GENESIS;
        let mut first_tie = None;
        while let Some((best, tied)) = self.heaviest_child(head, |id| self.weight(id)) {
            if tied && first_tie.is_none() {
                first_tie = Some(head);
            }
            head = best;
        }
        let unresolved_fork_depth = first_tie
            .map(|branch| self.block(head).depth - self.block(branch).depth)
            .unwrap_or(0);

        self.advance_fast_tip(&round_weight);

        let previous = self.head;
        self.head = head;
        let reorg = !self.is_ancestor(previous, head);
        let common_ancestor = if reorg {
            self.common_ancestor(previous, head)
        } else {
            previous
        };
        HeadUpdate {
            head,
            previous,
            reorg,
            reorg_depth: self.block(previous).depth - self.block(common_ancestor).depth,
            common_ancestor,
            unresolved_fork_depth,
            votes_counted,
        }
    }

    fn advance_fast_tip(&mut self, round_weight: &HashMap<BlockId, u64>) {
        let weight = |id: BlockId| round_weight.get(&id).copied().unwrap_or_default();
        let mut tip = BlockId::GENESIS;
        while let Some((best, _)) = self.heaviest_child(tip, weight) {
            if weight(best) < self.fast_threshold {
                break;
            }
            tip = best;
        }
        if self.block(tip).depth > self.block(self.fast_tip).depth {
            trace!("fast-confirmed block {tip}");
            self.fast_tip = tip;
        }
    }

    /// The heaviest child of `id` by `weight`, and whether another child ties with it.
    fn heaviest_child(
        &self,
        id: BlockId,
        weight: impl Fn(BlockId) -> u64,
    ) -> Option<(BlockId, bool)> {
        let children = &self.children[id.to_inner()];
        let (&first, rest) = children.split_first()?;
        let mut best = (first, weight(first));
        let mut tied = false;
        for &child in rest {
            let child_weight = weight(child);
            if child_weight > best.1 {
                best = (child, child_weight);
                tied = false;
            } else if child_weight == best.1 {
                tied = true;
            }
        }
        Some((best.0, tied))
    }

    /// Deepest block on the canonical chain created at least `kappa` rounds before `round`.
    pub fn confirmed_tip(&self, round: Round, kappa: u64) -> BlockId {
        let Some(cutoff) = round.checked_sub(kappa) else {
            return BlockId::GENESIS;
        };
        let mut cursor = self.block(self.head);
        while cursor.round > cutoff {
            match cursor.parent {
                Some(parent) => cursor = self.block(parent),
                None => break,
            }
        }
        cursor.id
    }

    pub fn fast_tip(&self) -> BlockId {
        self.fast_tip
    }

    /// The deeper of the k-deep and fast confirmation tips.
    pub fn best_confirmed(&self, round: Round, kappa: u64) -> BlockId {
        let slow = self.confirmed_tip(round, kappa);
        if self.block(self.fast_tip).depth > self.block(slow).depth {
            self.fast_tip
        } else {
            slow
        }
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.to_inner())
    }

    pub fn head(&self) -> &Block {
        self.block(self.head)
    }

    /// Votes cast for `id` and all of its descendants.
    pub fn weight(&self, id: BlockId) -> u64 {
        self.subtree_weight
            .get(id.to_inner())
            .copied()
            .unwrap_or_default()
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true, genesis always exists.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// The canonical chain, from genesis to the head.
    pub fn chain(&self) -> Vec<BlockId> {
        let mut chain = vec![];
        let mut cursor = Some(self.head);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.block(id).parent;
        }
        chain.reverse();
        chain
    }

    /// Whether `ancestor` is `descendant` or lies on its path to genesis.
    pub fn is_ancestor(&self, ancestor: BlockId, descendant: BlockId) -> bool {
        let (Some(ancestor), Some(mut cursor)) = (self.get(ancestor), self.get(descendant)) else {
            return false;
        };
        while cursor.depth > ancestor.depth {
            let Some(parent) = cursor.parent else {
                return false;
            };
            cursor = self.block(parent);
        }
        cursor.id == ancestor.id
    }

    /// Blocks which are not on the canonical chain.
    pub fn orphaned(&self) -> usize {
        self.blocks.len() - (self.head().depth as usize + 1)
    }

    fn common_ancestor(&self, a: BlockId, b: BlockId) -> BlockId {
        let mut a = self.block(a);
        let mut b = self.block(b);
        while a.id != b.id {
            let deeper = if a.depth >= b.depth { &mut a } else { &mut b };
            match deeper.parent {
                Some(parent) => *deeper = self.block(parent),
                None => break,
            }
        }
        a.id
    }

    /// Renders the tree in Graphviz format, canonical chain highlighted.
    pub fn to_dot(&self) -> String {
        let canonical: HashSet<BlockId> = self.chain().into_iter().collect();
        let mut dot = String::from("digraph blocktree {\n    rankdir=LR;\n    node [shape=box];\n");
        for block in &self.blocks {
            let label = match block.proposer {
                Some(proposer) => format!(
                    "{} @ round {}\\nproposer {}\\nvotes {} / weight {}",
                    block.id,
                    block.round,
                    proposer,
                    block.votes,
                    self.weight(block.id)
                ),
                None => format!("genesis\\nweight {}", self.weight(block.id)),
            };
            let style = if canonical.contains(&block.id) {
                ", style=filled, fillcolor=lightblue"
            } else {
                ""
            };
            dot.push_str(&format!("    b{} [label=\"{label}\"{style}];\n", block.id));
            if let Some(parent) = block.parent {
                dot.push_str(&format!("    b{parent} -> b{};\n", block.id));
            }
        }
        dot.push_str("}\n");
        dot
    }

    fn check_round(&self, round: Round) -> Result<()> {
        match self.round {
            Some(current) if current == round => Ok(()),
            Some(current) => bail!("round {round} is not the current round {current}"),
            None => bail!("round {round} was never started"),
        }
    }

    fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.to_inner()]
    }
}
