//! Broadcast behavior of honest and traitorous participants.

use crate::consensus::types::Plan;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Honest,
    /// Sends an independently drawn plan to every destination.
    Traitor,
}

impl Role {
    pub fn is_traitor(&self) -> bool {
        matches!(self, Role::Traitor)
    }

    /// Plan to put in the message for one destination. Called once per
    /// peer per round.
    pub fn outgoing_plan<R: Rng + ?Sized>(&self, current: Plan, rng: &mut R) -> Plan {
        match self {
            Role::Honest => current,
            Role::Traitor => Plan::random(rng),
        }
    }
}
