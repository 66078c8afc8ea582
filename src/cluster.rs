//! Simulation harness.
//!
//! Builds the participants hosted by this process, starts their transports
//! before anyone passes the readiness barrier, runs every participant to
//! completion and collects the final plans.

use crate::config::{ClusterConfig, TransportKind};
use crate::consensus::{
    FaultBounds, KingParticipant, ParticipantId, ParticipantReport, Plan, ProtocolSettings,
};
use crate::error::{ClusterError, ConfigError};
use crate::network::{Inbox, Listener, ListenerHandle, LocalTransport, TcpTransport, Transport};
use crate::topology::{Endpoint, Topology};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub bounds: FaultBounds,
    pub participants: Vec<ParticipantReport>,
    /// Local participants that could not start listening and never ran.
    pub unreachable: Vec<ParticipantId>,
}

impl ClusterReport {
    /// The plan every honest participant hosted here ended with, if they
    /// all ended with the same one.
    pub fn honest_agreement(&self) -> Option<Plan> {
        let mut honest = self
            .participants
            .iter()
            .filter(|p| !p.role.is_traitor())
            .map(|p| p.plan);
        let first = honest.next()?;
        honest.all(|plan| plan == first).then_some(first)
    }

    pub fn plan_of(&self, id: ParticipantId) -> Option<Plan> {
        self.participants.iter().find(|p| p.id == id).map(|p| p.plan)
    }
}

/// How a participant stops receiving once it has finished.
enum Mailbox {
    Tcp(ListenerHandle),
    Local {
        transport: LocalTransport,
        id: ParticipantId,
    },
}

impl Mailbox {
    async fn close(self) {
        match self {
            Mailbox::Tcp(handle) => handle.stop().await,
            Mailbox::Local { transport, id } => transport.unregister(id),
        }
    }
}

pub struct Cluster {
    config: ClusterConfig,
    settings: Arc<ProtocolSettings>,
    local_ids: Vec<ParticipantId>,
    initial_plans: HashMap<ParticipantId, Plan>,
}

impl Cluster {
    pub fn from_config(config: ClusterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            settings: Arc::new(config.protocol_settings()),
            local_ids: config.local_ids()?,
            initial_plans: HashMap::new(),
            config,
        })
    }

    /// Fixes starting plans instead of drawing them at random.
    pub fn with_initial_plans(
        mut self,
        plans: impl IntoIterator<Item = (ParticipantId, Plan)>,
    ) -> Self {
        self.initial_plans.extend(plans);
        self
    }

    pub async fn run(self) -> Result<ClusterReport, ClusterError> {
        info!(
            transport = %self.config.transport,
            local = ?self.local_ids,
            traitors = ?self.settings.traitors.iter().collect::<Vec<_>>(),
            "{}",
            self.settings.bounds().description()
        );

        let (participants, unreachable) = match self.config.transport {
            TransportKind::Local => (self.start_local(), Vec::new()),
            TransportKind::Tcp => self.start_tcp().await?,
        };
        self.drive(participants, unreachable).await
    }

    fn start_local(&self) -> Vec<(KingParticipant, Mailbox)> {
        let local = LocalTransport::new();
        let shared: Arc<dyn Transport> = Arc::new(local.clone());

        self.local_ids
            .iter()
            .map(|&id| {
                let (tx, rx) = mpsc::unbounded_channel();
                local.register(id, tx);
                let mailbox = Mailbox::Local {
                    transport: local.clone(),
                    id,
                };
                (self.participant(id, Arc::clone(&shared), rx), mailbox)
            })
            .collect()
    }

    async fn start_tcp(
        &self,
    ) -> Result<(Vec<(KingParticipant, Mailbox)>, Vec<ParticipantId>), ClusterError> {
        let mut listeners = Vec::new();
        let mut unreachable = Vec::new();

        let topology = if self.config.base_port == 0 {
            for &id in &self.local_ids {
                let address = &self.config.addresses[id % self.config.addresses.len()];
                listeners.push(Listener::bind(id, &Endpoint::new(address.clone(), 0)).await?);
            }
            Topology::from_endpoints(
                listeners
                    .iter()
                    .map(|l| l.local_endpoint().clone())
                    .collect(),
            )
        } else {
            let topology = self.config.topology()?;
            for &id in &self.local_ids {
                let Some(endpoint) = topology.endpoint(id) else {
                    continue;
                };
                // A participant that cannot listen is unreachable; its peers
                // wait for it indefinitely, as they would for a crashed one.
                match Listener::bind(id, endpoint).await {
                    Ok(listener) => listeners.push(listener),
                    Err(e) => {
                        error!(node = id, error = %e, "failed to start server");
                        unreachable.push(id);
                    }
                }
            }
            topology
        };

        let shared: Arc<dyn Transport> = Arc::new(TcpTransport::new(Arc::new(topology)));

        let participants = listeners
            .into_iter()
            .map(|listener| {
                let id = listener.id();
                let (tx, rx) = mpsc::unbounded_channel();
                let mailbox = Mailbox::Tcp(listener.serve(tx));
                (self.participant(id, Arc::clone(&shared), rx), mailbox)
            })
            .collect();
        Ok((participants, unreachable))
    }

    fn participant(
        &self,
        id: ParticipantId,
        transport: Arc<dyn Transport>,
        inbox: Inbox,
    ) -> KingParticipant {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };
        let plan = self
            .initial_plans
            .get(&id)
            .copied()
            .unwrap_or_else(|| Plan::random(&mut rng));

        info!(node = id, role = ?self.settings.role_of(id), %plan, "participant created");
        KingParticipant::new(id, plan, Arc::clone(&self.settings), transport, inbox, rng)
    }

    async fn drive(
        &self,
        participants: Vec<(KingParticipant, Mailbox)>,
        unreachable: Vec<ParticipantId>,
    ) -> Result<ClusterReport, ClusterError> {
        let mut tasks = JoinSet::new();
        for (participant, mailbox) in participants {
            tasks.spawn(async move {
                let result = participant.run().await;
                mailbox.close().await;
                result
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            reports.push(joined??);
        }
        reports.sort_by_key(|r| r.id);

        Ok(ClusterReport {
            bounds: self.settings.bounds(),
            participants: reports,
            unreachable,
        })
    }
}
