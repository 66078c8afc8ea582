//! Wire envelope.
//!
//! Exactly one message travels over each TCP connection and the closed
//! connection is the message boundary: there is no length prefix and no
//! multiplexing. The body is a single JSON object
//! `{"type": "plan" | "ack", "from": int, "round": int, "plan": string}`
//! followed by a newline. Capitalized field names are accepted on input.

use crate::consensus::types::{ParticipantId, Plan, Proposal, Round};
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Largest body accepted from a single connection.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

const KIND_PLAN: &str = "plan";
const KIND_ACK: &str = "ack";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Readiness signal sent once to every peer before round 1.
    Ack { from: ParticipantId },
    Plan(Proposal),
}

#[derive(Serialize, Deserialize, Debug)]
struct WireMessage {
    #[serde(rename = "type", alias = "Type")]
    kind: String,
    #[serde(alias = "From")]
    from: ParticipantId,
    #[serde(alias = "Round", default)]
    round: Round,
    #[serde(alias = "Plan", default)]
    plan: String,
}

impl Message {
    pub fn ack(from: ParticipantId) -> Self {
        Message::Ack { from }
    }

    pub fn plan(from: ParticipantId, round: Round, plan: Plan) -> Self {
        Message::Plan(Proposal { from, round, plan })
    }

    pub fn sender(&self) -> ParticipantId {
        match self {
            Message::Ack { from } => *from,
            Message::Plan(proposal) => proposal.from,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ack { .. } => KIND_ACK,
            Message::Plan(_) => KIND_PLAN,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let wire = match self {
            Message::Ack { from } => WireMessage {
                kind: KIND_ACK.to_string(),
                from: *from,
                round: 0,
                plan: String::new(),
            },
            Message::Plan(proposal) => WireMessage {
                kind: KIND_PLAN.to_string(),
                from: proposal.from,
                round: proposal.round,
                plan: proposal.plan.to_string(),
            },
        };
        let mut bytes = serde_json::to_vec(&wire)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() > MAX_MESSAGE_BYTES {
            return Err(DecodeError::TooLarge {
                limit: MAX_MESSAGE_BYTES,
            });
        }
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        match wire.kind.as_str() {
            KIND_ACK => Ok(Message::Ack { from: wire.from }),
            KIND_PLAN => Ok(Message::Plan(Proposal {
                from: wire.from,
                round: wire.round,
                plan: wire.plan.parse()?,
            })),
            _ => Err(DecodeError::UnknownKind(wire.kind)),
        }
    }
}
