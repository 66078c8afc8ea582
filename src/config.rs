//! Run configuration.
//!
//! Every process of a run must agree on the address list, the participant
//! count and the base port, since each derives the same topology from them.

use crate::consensus::{DedupPolicy, KingPolicy, ParticipantId, ProtocolSettings};
use crate::error::ConfigError;
use crate::topology::{Topology, TraitorSet, DEFAULT_BASE_PORT};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// One TCP connection per message.
    #[default]
    Tcp,
    /// In-process channels; every participant must run in this process.
    Local,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(TransportKind::Tcp),
            "local" => Ok(TransportKind::Local),
            other => Err(format!("unknown transport {other:?} (expected tcp or local)")),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => f.write_str("tcp"),
            TransportKind::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub addresses: Vec<String>,
    pub total_nodes: usize,
    /// Participants to instantiate in this process. `None` means all of
    /// them, which is only allowed with a single address.
    pub node_ids: Option<Vec<ParticipantId>>,
    /// Participant `i` listens on `base_port + i + 1`. Zero binds every
    /// participant to an OS-assigned port (single process only).
    pub base_port: u16,
    pub king_policy: KingPolicy,
    pub dedup_policy: DedupPolicy,
    pub transport: TransportKind,
    /// Seeds initial plans and traitor lies for reproducible runs.
    pub seed: Option<u64>,
    /// Overrides the default traitor set. Simulation input only.
    pub traitors: Option<Vec<ParticipantId>>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["127.0.0.1".to_string()],
            total_nodes: 5,
            node_ids: None,
            base_port: DEFAULT_BASE_PORT,
            king_policy: KingPolicy::default(),
            dedup_policy: DedupPolicy::default(),
            transport: TransportKind::default(),
            seed: None,
            traitors: None,
        }
    }
}

impl ClusterConfig {
    pub fn new(total_nodes: usize) -> Self {
        Self {
            total_nodes,
            ..Self::default()
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_traitors(mut self, traitors: Vec<ParticipantId>) -> Self {
        self.traitors = Some(traitors);
        self
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_nodes == 0 {
            return Err(ConfigError::TooFewParticipants);
        }
        if self.addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        for &id in self.traitors.iter().flatten() {
            self.check_id(id)?;
        }

        let local = self.local_ids()?;
        let in_process = self.transport == TransportKind::Local || self.base_port == 0;
        if in_process && local.len() != self.total_nodes {
            return Err(ConfigError::PartialInProcessCluster);
        }

        if self.base_port != 0 {
            self.topology()?;
        }
        Ok(())
    }

    /// Ids to run here, sorted and without repeats.
    pub fn local_ids(&self) -> Result<Vec<ParticipantId>, ConfigError> {
        match &self.node_ids {
            Some(ids) => {
                let unique: BTreeSet<ParticipantId> = ids.iter().copied().collect();
                for &id in &unique {
                    self.check_id(id)?;
                }
                Ok(unique.into_iter().collect())
            }
            None if self.addresses.len() == 1 => Ok((0..self.total_nodes).collect()),
            None => Err(ConfigError::MissingNodeIds),
        }
    }

    pub fn topology(&self) -> Result<Topology, ConfigError> {
        Topology::derive(self.total_nodes, &self.addresses, self.base_port)
    }

    pub fn traitor_set(&self) -> TraitorSet {
        match &self.traitors {
            Some(ids) => TraitorSet::from_ids(ids.iter().copied()),
            None => TraitorSet::for_participants(self.total_nodes),
        }
    }

    pub fn protocol_settings(&self) -> ProtocolSettings {
        ProtocolSettings::new(self.total_nodes, self.traitor_set())
            .with_king_policy(self.king_policy)
            .with_dedup_policy(self.dedup_policy)
    }

    fn check_id(&self, id: ParticipantId) -> Result<(), ConfigError> {
        if id >= self.total_nodes {
            return Err(ConfigError::NodeIdOutOfRange {
                id,
                total: self.total_nodes,
            });
        }
        Ok(())
    }
}

/// Comma-separated addresses; blanks are skipped.
pub fn parse_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comma-separated participant ids, e.g. `"0, 2,3"`.
pub fn parse_node_ids(list: &str) -> Result<Vec<ParticipantId>, ConfigError> {
    list.split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse()
                .map_err(|_| ConfigError::InvalidNodeId(token.to_string()))
        })
        .collect()
}
