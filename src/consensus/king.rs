//! Rotating king selection.

use crate::consensus::types::{ParticipantId, Round};
use crate::error::RoundError;
use crate::topology::TraitorSet;
use std::fmt;
use std::str::FromStr;

/// What a reselected king does to the round counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KingPolicy {
    /// Only the id treated as king changes; broadcast and collect keep
    /// using the scheduled round.
    #[default]
    DisplayOnly,
    /// The candidates skipped while reselecting are also skipped as rounds.
    AdvanceRound,
}

impl FromStr for KingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "display-only" => Ok(KingPolicy::DisplayOnly),
            "advance-round" => Ok(KingPolicy::AdvanceRound),
            other => Err(format!(
                "unknown king policy {other:?} (expected display-only or advance-round)"
            )),
        }
    }
}

impl fmt::Display for KingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KingPolicy::DisplayOnly => f.write_str("display-only"),
            KingPolicy::AdvanceRound => f.write_str("advance-round"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KingChoice {
    pub king: ParticipantId,
    /// Candidates passed over before `king` was accepted.
    pub skipped: u64,
}

/// The king for `round` is `round mod N`, unless both the previous king and
/// that candidate are traitors, in which case the following ids are tried.
/// At most N candidates are examined.
pub fn choose_king(
    round: Round,
    total: usize,
    previous_king: ParticipantId,
    traitors: &TraitorSet,
) -> Result<KingChoice, RoundError> {
    let previous_is_traitor = traitors.contains(previous_king);
    let n = total as Round;

    for skipped in 0..n {
        let candidate = ((round + skipped) % n) as ParticipantId;
        if !(previous_is_traitor && traitors.contains(candidate)) {
            return Ok(KingChoice {
                king: candidate,
                skipped,
            });
        }
    }

    Err(RoundError::NoEligibleKing {
        round,
        attempts: total,
    })
}
