//! King algorithm participant.
//!
//! Each participant runs as a single task that owns its
//! [`ParticipantState`]. The transport pushes decoded messages into the
//! participant's inbox; the task drains the inbox only while it waits for
//! the readiness barrier or for a round's proposals, re-checking the release
//! condition after every arrival. Proposals for rounds the participant has
//! not reached yet are kept in the table until that round starts.

use crate::consensus::decision::{decide, Decision, Tally};
use crate::consensus::king::{choose_king, KingPolicy};
use crate::consensus::state::{DedupPolicy, ParticipantState};
use crate::consensus::traitor::Role;
use crate::consensus::types::{FaultBounds, ParticipantId, Plan, Round};
use crate::error::RoundError;
use crate::network::{deliver, Inbox, Message, Transport};
use crate::topology::TraitorSet;
use chrono::Utc;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Immutable protocol parameters shared by every participant of a run.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub total: usize,
    pub traitors: TraitorSet,
    pub king_policy: KingPolicy,
    pub dedup_policy: DedupPolicy,
}

impl ProtocolSettings {
    pub fn new(total: usize, traitors: TraitorSet) -> Self {
        Self {
            total,
            traitors,
            king_policy: KingPolicy::default(),
            dedup_policy: DedupPolicy::default(),
        }
    }

    pub fn with_king_policy(mut self, policy: KingPolicy) -> Self {
        self.king_policy = policy;
        self
    }

    pub fn with_dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.dedup_policy = policy;
        self
    }

    pub fn bounds(&self) -> FaultBounds {
        self.traitors.bounds(self.total)
    }

    pub fn role_of(&self, id: ParticipantId) -> Role {
        if self.traitors.contains(id) {
            Role::Traitor
        } else {
            Role::Honest
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Barrier,
    Round(Round),
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Barrier => f.write_str("readiness barrier"),
            Phase::Round(round) => write!(f, "round {round}"),
            Phase::Stopped => f.write_str("stopped"),
        }
    }
}

/// Snapshot published by a running participant.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantStatus {
    pub id: ParticipantId,
    pub phase: Phase,
    pub plan: Plan,
    pub king: Option<ParticipantId>,
    pub acks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    pub round: Round,
    pub king: ParticipantId,
    pub tally: Tally,
    pub decision: Decision,
    /// Unix milliseconds.
    pub decided_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantReport {
    pub id: ParticipantId,
    pub role: Role,
    pub plan: Plan,
    pub rounds: Vec<RoundRecord>,
}

pub struct KingParticipant {
    state: ParticipantState,
    role: Role,
    settings: Arc<ProtocolSettings>,
    transport: Arc<dyn Transport>,
    inbox: Inbox,
    status: Arc<RwLock<ParticipantStatus>>,
    rng: StdRng,
    previous_king: ParticipantId,
}

impl KingParticipant {
    pub fn new(
        id: ParticipantId,
        plan: Plan,
        settings: Arc<ProtocolSettings>,
        transport: Arc<dyn Transport>,
        inbox: Inbox,
        rng: StdRng,
    ) -> Self {
        let status = ParticipantStatus {
            id,
            phase: Phase::Idle,
            plan,
            king: None,
            acks: 0,
        };

        Self {
            state: ParticipantState::new(id, plan, settings.dedup_policy),
            role: settings.role_of(id),
            settings,
            transport,
            inbox,
            status: Arc::new(RwLock::new(status)),
            rng,
            previous_king: 0,
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.state.id
    }

    pub fn status(&self) -> Arc<RwLock<ParticipantStatus>> {
        Arc::clone(&self.status)
    }

    /// Readiness barrier, then R rounds. Returns the final plan.
    pub async fn run(mut self) -> Result<ParticipantReport, RoundError> {
        self.wait_for_peers().await?;

        let bounds = self.settings.bounds();
        let mut records = Vec::new();
        let mut round: Round = 1;

        while round <= bounds.rounds {
            let choice = choose_king(
                round,
                self.settings.total,
                self.previous_king,
                &self.settings.traitors,
            )?;
            self.previous_king = choice.king;

            if self.settings.king_policy == KingPolicy::AdvanceRound && choice.skipped > 0 {
                round += choice.skipped;
                if round > bounds.rounds {
                    info!(node = self.id(), round, "reselected king lies past the last round");
                    break;
                }
            }

            info!(node = self.id(), king = choice.king, round, "chose king");
            records.push(self.run_round(round, choice.king, &bounds).await?);
            round += 1;
        }

        self.publish(|status| status.phase = Phase::Stopped);
        info!(node = self.id(), plan = %self.state.plan, rounds = records.len(), "finished");

        Ok(ParticipantReport {
            id: self.id(),
            role: self.role,
            plan: self.state.plan,
            rounds: records,
        })
    }

    /// Sends an ack to every peer, then waits until acks from N - 1
    /// distinct peers have arrived.
    async fn wait_for_peers(&mut self) -> Result<(), RoundError> {
        self.publish(|status| status.phase = Phase::Barrier);

        let id = self.id();
        for peer in self.peers() {
            deliver(&*self.transport, id, peer, Message::ack(id)).await;
        }

        let expected = self.settings.bounds().peers();
        while self.state.acks.len() < expected {
            let message = self.next_message().await?;
            self.absorb(message);
        }

        info!(node = id, "received all ready messages");
        Ok(())
    }

    async fn run_round(
        &mut self,
        round: Round,
        king: ParticipantId,
        bounds: &FaultBounds,
    ) -> Result<RoundRecord, RoundError> {
        self.state.round = round;
        self.publish(|status| {
            status.phase = Phase::Round(round);
            status.king = Some(king);
        });

        self.broadcast_plan(round).await;

        while self.state.proposals.count(round) < bounds.peers() {
            let message = self.next_message().await?;
            self.absorb(message);
        }

        let collected = self.state.proposals.entries(round);
        let summary: Vec<String> = collected
            .iter()
            .map(|p| format!("{}:{}", p.from, p.plan))
            .collect();
        info!(
            node = self.id(),
            round,
            count = collected.len(),
            plans = %summary.join(" "),
            "collected plans"
        );

        let (tally, decision) = decide(self.state.plan, collected, king, bounds.threshold);
        self.state.plan = decision.plan();
        self.publish(|status| {
            status.plan = decision.plan();
            status.phase = Phase::Idle;
        });
        info!(node = self.id(), round, ?decision, "decided");

        Ok(RoundRecord {
            round,
            king,
            tally,
            decision,
            decided_at: Utc::now().timestamp_millis(),
        })
    }

    /// Honest participants send their plan to everyone; traitors draw a
    /// fresh plan for every destination.
    async fn broadcast_plan(&mut self, round: Round) {
        let id = self.id();
        let transport = Arc::clone(&self.transport);
        for peer in self.peers() {
            let plan = self.role.outgoing_plan(self.state.plan, &mut self.rng);
            deliver(&*transport, id, peer, Message::plan(id, round, plan)).await;
        }
    }

    fn absorb(&mut self, message: Message) {
        let id = self.id();
        match message {
            Message::Ack { from } => {
                if from == id || from >= self.settings.total {
                    warn!(node = id, from, "ignoring ack from unknown participant");
                } else if self.state.acks.record(from) {
                    let acks = self.state.acks.len();
                    self.publish(|status| status.acks = acks);
                }
            }
            Message::Plan(proposal) => {
                if self.state.proposals.record(proposal) {
                    info!(node = id, from = proposal.from, round = proposal.round, "received plan");
                    if proposal.round > self.state.round {
                        debug!(node = id, current = self.state.round, "plan kept for a later round");
                    }
                } else {
                    warn!(
                        node = id,
                        from = proposal.from,
                        round = proposal.round,
                        "rejected repeated plan from sender"
                    );
                }
            }
        }
    }

    async fn next_message(&mut self) -> Result<Message, RoundError> {
        match self.inbox.recv().await {
            Some(message) => Ok(message),
            None => {
                let phase = self.status.read().phase;
                debug!(node = self.id(), %phase, "inbox closed");
                Err(RoundError::InboxClosed {
                    id: self.id(),
                    phase: phase.to_string(),
                })
            }
        }
    }

    fn peers(&self) -> Vec<ParticipantId> {
        let id = self.id();
        (0..self.settings.total).filter(|&peer| peer != id).collect()
    }

    fn publish(&self, update: impl FnOnce(&mut ParticipantStatus)) {
        let mut status = self.status.write();
        update(&mut *status);
    }
}
