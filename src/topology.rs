//! Static cluster layout: where every participant listens and who the
//! traitors are. Every process derives the same values from the same
//! configuration, so no coordination is needed.

use crate::consensus::types::{FaultBounds, ParticipantId};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;

pub const DEFAULT_BASE_PORT: u16 = 8000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Endpoint of every participant, indexed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    endpoints: Vec<Endpoint>,
}

impl Topology {
    /// Participant `i` listens on `addresses[i % len]` at `base_port + i + 1`.
    pub fn derive(total: usize, addresses: &[String], base_port: u16) -> Result<Self, ConfigError> {
        if addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        if total == 0 {
            return Err(ConfigError::TooFewParticipants);
        }

        let endpoints = (0..total)
            .map(|i| {
                let port = u16::try_from(i + 1)
                    .ok()
                    .and_then(|offset| base_port.checked_add(offset))
                    .ok_or(ConfigError::PortOverflow {
                        base: base_port,
                        total,
                    })?;
                Ok(Endpoint::new(addresses[i % addresses.len()].clone(), port))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { endpoints })
    }

    /// Used when listeners were bound first (e.g. on OS-assigned ports).
    pub fn from_endpoints(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn endpoint(&self, id: ParticipantId) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// round((N - 1) / 4), rounding halves up.
pub fn traitor_count(total: usize) -> usize {
    (total + 1) / 4
}

/// Simulation oracle: which participants lie. Never discovered at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraitorSet {
    ids: BTreeSet<ParticipantId>,
}

impl TraitorSet {
    /// The highest-numbered `traitor_count(total)` ids.
    pub fn for_participants(total: usize) -> Self {
        let count = traitor_count(total);
        Self {
            ids: (total - count..total).collect(),
        }
    }

    pub fn from_ids(ids: impl IntoIterator<Item = ParticipantId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.ids.iter().copied()
    }

    pub fn bounds(&self, total: usize) -> FaultBounds {
        FaultBounds::new(total, self.len())
    }
}
