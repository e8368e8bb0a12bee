use std::fmt::Display;

use serde::Serialize;

use crate::clock::Round;

macro_rules! id_wrapper {
    ($outer:ident, $inner:ty) => {
        #[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $outer($inner);
        impl Display for $outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
        impl Serialize for $outer {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_u64(self.0 as u64)
            }
        }
        impl $outer {
            #[allow(unused)]
            pub fn new(value: $inner) -> Self {
                Self(value)
            }
            #[allow(unused)]
            pub fn to_inner(self) -> $inner {
                self.0
            }
        }
    };
}

id_wrapper!(PartyId, usize);
id_wrapper!(BlockId, usize);

impl BlockId {
    pub const GENESIS: BlockId = BlockId(0);
}

#[derive(Clone, Debug)]
pub struct Block {
    pub id: BlockId,
    pub parent: Option<BlockId>,
    pub round: Round,
    pub proposer: Option<PartyId>,
    pub depth: u64,
    /// Votes cast directly for this block over the whole run.
    pub votes: u64,
    /// Votes cast directly for this block in `last_voted`.
    pub round_votes: u64,
    pub last_voted: Option<Round>,
}

impl Block {
    pub fn genesis() -> Self {
        Self {
            id: BlockId::GENESIS,
            parent: None,
            round: Round::zero(),
            proposer: None,
            depth: 0,
            votes: 0,
            round_votes: 0,
            last_voted: None,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vote {
    pub voter: PartyId,
    pub target: BlockId,
    pub round: Round,
}

/// Lottery outcome of a single party for a single round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LotteryResult {
    pub is_proposer: bool,
    pub is_voter: bool,
}

/// A member of the population. Only the current round's status is kept.
#[derive(Clone, Debug)]
pub struct Party {
    pub id: PartyId,
    pub online: bool,
    pub lottery: LotteryResult,
}

impl Party {
    pub fn new(id: PartyId) -> Self {
        Self {
            id,
            online: false,
            lottery: LotteryResult::default(),
        }
    }
}
