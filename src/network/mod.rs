//! Point-to-point message delivery.
//!
//! Delivery is best-effort and at-most-once: a failed send is reported to
//! the caller, which logs it and moves on. Nothing is retried.

pub mod listener;
pub mod message;

pub use listener::{Listener, ListenerHandle};
pub use message::Message;

use crate::consensus::types::ParticipantId;
use crate::error::TransportError;
use crate::topology::{Endpoint, Topology};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Messages handed from the transport to a participant's engine.
pub type Inbox = mpsc::UnboundedReceiver<Message>;
pub type InboxSender = mpsc::UnboundedSender<Message>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, to: ParticipantId, message: Message) -> Result<(), TransportError>;

    fn name(&self) -> &str;
}

/// Opens a fresh connection, writes one message and closes it.
pub async fn send_message(endpoint: &Endpoint, message: &Message) -> Result<(), TransportError> {
    let bytes = message.encode()?;

    let mut stream = TcpStream::connect(endpoint.to_string())
        .await
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;

    let write_err = |source| TransportError::Write {
        endpoint: endpoint.clone(),
        source,
    };
    stream.write_all(&bytes).await.map_err(write_err)?;
    stream.shutdown().await.map_err(write_err)?;
    Ok(())
}

/// Sends and logs the outcome. Failures are dropped.
pub async fn deliver(transport: &dyn Transport, from: ParticipantId, to: ParticipantId, message: Message) {
    match transport.send(to, message).await {
        Ok(()) => {
            if let Message::Plan(proposal) = message {
                debug!(node = from, peer = to, round = proposal.round, plan = %proposal.plan, "plan sent");
            }
        }
        Err(e) => warn!(
            node = from,
            peer = to,
            transport = transport.name(),
            kind = message.kind(),
            error = %e,
            "send failed"
        ),
    }
}

pub struct TcpTransport {
    topology: Arc<Topology>,
}

impl TcpTransport {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, to: ParticipantId, message: Message) -> Result<(), TransportError> {
        let endpoint = self
            .topology
            .endpoint(to)
            .ok_or(TransportError::UnknownPeer(to))?;
        send_message(endpoint, &message).await
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// In-process delivery straight into registered inboxes.
#[derive(Clone, Default)]
pub struct LocalTransport {
    inboxes: Arc<RwLock<HashMap<ParticipantId, InboxSender>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ParticipantId, inbox: InboxSender) {
        self.inboxes.write().insert(id, inbox);
    }

    /// Equivalent of closing a listener: later sends to `id` fail.
    pub fn unregister(&self, id: ParticipantId) {
        self.inboxes.write().remove(&id);
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, to: ParticipantId, message: Message) -> Result<(), TransportError> {
        let inboxes = self.inboxes.read();
        let inbox = inboxes.get(&to).ok_or(TransportError::UnknownPeer(to))?;
        inbox.send(message).map_err(|_| TransportError::PeerGone(to))
    }

    fn name(&self) -> &str {
        "local"
    }
}
