//! Byzantine King algorithm simulation.
//!
//! Participants exchange readiness acks and plans over TCP (or in-process
//! channels), run `f + 1` king rounds and report the plan they settled on.

pub mod cluster;
pub mod config;
pub mod consensus;
pub mod error;
pub mod logger;
pub mod network;
pub mod topology;

pub use cluster::{Cluster, ClusterReport};
pub use config::{ClusterConfig, TransportKind};
pub use error::{ClusterError, ConfigError, DecodeError, RoundError, TransportError};
