//! Error taxonomy for the transport, the round loop and configuration.
//!
//! Transport and decode errors are handled where they happen (logged and
//! dropped); they are never surfaced to the decision logic.

use crate::consensus::types::{ParticipantId, Round};
use crate::topology::Endpoint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message type {0:?}")]
    UnknownKind(String),

    #[error("unknown plan {0:?}")]
    UnknownPlan(String),

    #[error("message exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to {endpoint}: {source}")]
    Write {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read connection: {0}")]
    Read(#[source] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("no endpoint known for participant {0}")]
    UnknownPeer(ParticipantId),

    #[error("participant {0} is no longer accepting messages")]
    PeerGone(ParticipantId),
}

#[derive(Debug, Error)]
pub enum RoundError {
    #[error("no eligible king for round {round} after {attempts} candidates")]
    NoEligibleKing { round: Round, attempts: usize },

    #[error("inbox of participant {id} closed during {phase}")]
    InboxClosed { id: ParticipantId, phase: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid node id {0:?}")]
    InvalidNodeId(String),

    #[error("node id {id} is out of range for {total} participants")]
    NodeIdOutOfRange { id: ParticipantId, total: usize },

    #[error("several addresses configured: node ids to run locally are required")]
    MissingNodeIds,

    #[error("address list is empty")]
    NoAddresses,

    #[error("at least one participant is required")]
    TooFewParticipants,

    #[error("in-process transports and ephemeral ports need every participant local")]
    PartialInProcessCluster,

    #[error("base port {base} cannot fit {total} participants")]
    PortOverflow { base: u16, total: usize },
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Round(#[from] RoundError),

    #[error("participant task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
