//! Per-participant mutable state.
//!
//! The state is owned by the participant's engine task; inbound messages
//! reach it through the engine's inbox, so no lock guards it.

use crate::consensus::types::{ParticipantId, Plan, Proposal, Round};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// How repeated proposals from one sender in one round are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Every arrival is stored, so a sender repeating itself inflates both
    /// the collected count and the tally.
    #[default]
    AcceptAll,
    /// Only the first proposal per sender and round is stored.
    KeepFirst,
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept-all" => Ok(DedupPolicy::AcceptAll),
            "keep-first" => Ok(DedupPolicy::KeepFirst),
            other => Err(format!(
                "unknown dedup policy {other:?} (expected accept-all or keep-first)"
            )),
        }
    }
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupPolicy::AcceptAll => f.write_str("accept-all"),
            DedupPolicy::KeepFirst => f.write_str("keep-first"),
        }
    }
}

/// Round -> proposals received for that round, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ProposalTable {
    policy: DedupPolicy,
    rounds: HashMap<Round, Vec<Proposal>>,
}

impl ProposalTable {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            rounds: HashMap::new(),
        }
    }

    /// Returns false when the proposal was rejected as a duplicate.
    pub fn record(&mut self, proposal: Proposal) -> bool {
        let entries = self.rounds.entry(proposal.round).or_default();
        if self.policy == DedupPolicy::KeepFirst
            && entries.iter().any(|p| p.from == proposal.from)
        {
            return false;
        }
        entries.push(proposal);
        true
    }

    pub fn count(&self, round: Round) -> usize {
        self.rounds.get(&round).map_or(0, Vec::len)
    }

    pub fn entries(&self, round: Round) -> &[Proposal] {
        self.rounds.get(&round).map_or(&[], Vec::as_slice)
    }
}

/// Distinct peers that have signalled readiness.
#[derive(Debug, Clone, Default)]
pub struct AckSet {
    senders: BTreeSet<ParticipantId>,
}

impl AckSet {
    /// Returns false if `from` had already been recorded.
    pub fn record(&mut self, from: ParticipantId) -> bool {
        self.senders.insert(from)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.senders.contains(&id)
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantState {
    pub id: ParticipantId,
    pub round: Round,
    pub plan: Plan,
    pub proposals: ProposalTable,
    pub acks: AckSet,
}

impl ParticipantState {
    pub fn new(id: ParticipantId, plan: Plan, policy: DedupPolicy) -> Self {
        Self {
            id,
            round: 0,
            plan,
            proposals: ProposalTable::new(policy),
            acks: AckSet::default(),
        }
    }
}
