use std::fmt::Display;

use serde::Serialize;

/// A round is one discrete step of the simulation, counted from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Round(u64);

impl Round {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn number(self) -> u64 {
        self.0
    }

    /// The round `rounds` steps before this one, if the simulation had reached it.
    pub fn checked_sub(self, rounds: u64) -> Option<Round> {
        self.0.checked_sub(rounds).map(Round)
    }
}

impl From<u64> for Round {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Round {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

/// Hands out rounds `0..=horizon`, in order, each exactly once.
///
/// The clock is the only thing in the simulation which creates new rounds;
/// every other component receives the current round from it.
#[derive(Debug)]
pub struct RoundClock {
    next: u64,
    horizon: u64,
}

impl RoundClock {
    pub fn new(horizon: u64) -> Self {
        Self { next: 0, horizon }
    }

    /// Number of rounds this clock produces in total.
    pub fn total_rounds(&self) -> u64 {
        self.horizon + 1
    }

    pub fn tick(&mut self) -> Option<Round> {
        if self.next > self.horizon {
            return None;
        }
        let round = Round(self.next);
        self.next += 1;
        Some(round)
    }
}

impl Iterator for RoundClock {
    type Item = Round;

    fn next(&mut self) -> Option<Self::Item> {
        self.tick()
    }
}
