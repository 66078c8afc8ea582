//! End-of-round decision rule.

use crate::consensus::types::{ParticipantId, Plan, Proposal};
use serde::Serialize;
use std::collections::BTreeMap;

/// Votes per plan among the proposals received from peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    counts: BTreeMap<Plan, usize>,
}

impl Tally {
    pub fn count(proposals: &[Proposal]) -> Self {
        let mut counts = BTreeMap::new();
        for proposal in proposals {
            *counts.entry(proposal.plan).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn votes(&self, plan: Plan) -> usize {
        self.counts.get(&plan).copied().unwrap_or(0)
    }

    /// Most voted plan; ties resolve to the first plan in `Plan` order.
    pub fn leader(&self) -> Option<(Plan, usize)> {
        self.counts
            .iter()
            .fold(None, |best, (&plan, &votes)| match best {
                Some((_, best_votes)) if best_votes >= votes => best,
                _ => Some((plan, votes)),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// One plan was counted more than `threshold` times.
    Majority(Plan),
    /// No overwhelming majority; the king's proposal was adopted.
    King(Plan),
    /// No overwhelming majority and nothing received from the king.
    Retained(Plan),
}

impl Decision {
    pub fn plan(&self) -> Plan {
        match self {
            Decision::Majority(plan) | Decision::King(plan) | Decision::Retained(plan) => *plan,
        }
    }
}

/// Only peer proposals are tallied; the participant's own plan is not
/// added to the count. If the king appears more than once, its latest
/// arrival is used.
pub fn decide(
    current: Plan,
    proposals: &[Proposal],
    king: ParticipantId,
    threshold: usize,
) -> (Tally, Decision) {
    let tally = Tally::count(proposals);

    let decision = match tally.leader() {
        Some((plan, votes)) if votes > threshold => Decision::Majority(plan),
        _ => match proposals.iter().rev().find(|p| p.from == king) {
            Some(proposal) => Decision::King(proposal.plan),
            None => Decision::Retained(current),
        },
    };

    (tally, decision)
}
