//! Consensus types and data structures

use crate::error::DecodeError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Index of a participant in `[0, N)`; also selects its network endpoint.
pub type ParticipantId = usize;

/// Round number. Rounds are numbered from 1.
pub type Round = u64;

/// The closed set of values participants agree on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plan {
    Attack,
    Retreat,
}

impl Plan {
    pub const ALL: [Plan; 2] = [Plan::Attack, Plan::Retreat];

    /// Uniform draw over [`Plan::ALL`].
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Attack => "Attack",
            Plan::Retreat => "Retreat",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Attack" => Ok(Plan::Attack),
            "Retreat" => Ok(Plan::Retreat),
            other => Err(DecodeError::UnknownPlan(other.to_string())),
        }
    }
}

/// A plan as received from a peer for a given round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    pub from: ParticipantId,
    pub round: Round,
    pub plan: Plan,
}

/// Fault model derived from the participant count and the traitor set.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FaultBounds {
    pub total: usize,
    pub traitors: usize,
    /// R = |TraitorSet| + 1
    pub rounds: Round,
    /// floor(N / 2) + |TraitorSet|; a value must be counted strictly more
    /// often than this to win by overwhelming majority.
    pub threshold: usize,
}

impl FaultBounds {
    pub fn new(total: usize, traitors: usize) -> Self {
        Self {
            total,
            traitors,
            rounds: traitors as Round + 1,
            threshold: total / 2 + traitors,
        }
    }

    /// Number of peer messages a participant waits for in every phase.
    pub fn peers(&self) -> usize {
        self.total.saturating_sub(1)
    }

    pub fn description(&self) -> String {
        format!(
            "King algorithm: {} participants, tolerating {} traitors over {} rounds (majority > {})",
            self.total, self.traitors, self.rounds, self.threshold
        )
    }
}
