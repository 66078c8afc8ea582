//! Per-participant TCP accept loop.

use crate::consensus::types::ParticipantId;
use crate::error::TransportError;
use crate::network::message::{Message, MAX_MESSAGE_BYTES};
use crate::network::InboxSender;
use crate::topology::Endpoint;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Listener {
    id: ParticipantId,
    listener: TcpListener,
    endpoint: Endpoint,
}

impl Listener {
    pub async fn bind(id: ParticipantId, endpoint: &Endpoint) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(endpoint.to_string())
            .await
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;

        // Report the port actually bound, which differs when binding port 0.
        let endpoint = listener
            .local_addr()
            .map(Endpoint::from)
            .unwrap_or_else(|_| endpoint.clone());

        info!(node = id, %endpoint, "listening");
        Ok(Self {
            id,
            listener,
            endpoint,
        })
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Accepts connections until the returned handle is stopped. Every
    /// connection is handled on its own task and forwards at most one
    /// message into `inbox`.
    pub fn serve(self, inbox: InboxSender) -> ListenerHandle {
        let (shutdown, mut stopped) = watch::channel(false);
        let Listener { id, listener, .. } = self;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            let inbox = inbox.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(id, stream, &inbox).await {
                                    warn!(node = id, error = %e, "dropping inbound connection");
                                }
                            });
                        }
                        Err(e) => warn!(node = id, error = %e, "accept failed"),
                    },
                }
            }
            debug!(node = id, "listener closed");
        });

        ListenerHandle { shutdown, task }
    }
}

pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stops accepting and closes the socket.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Reads until the peer closes its write half, then decodes one message.
async fn handle_connection(
    id: ParticipantId,
    stream: TcpStream,
    inbox: &InboxSender,
) -> Result<(), TransportError> {
    let mut body = Vec::new();
    stream
        .take(MAX_MESSAGE_BYTES as u64 + 1)
        .read_to_end(&mut body)
        .await
        .map_err(TransportError::Read)?;

    let message = Message::decode(&body)?;
    debug!(node = id, from = message.sender(), kind = message.kind(), "message received");

    if inbox.send(message).is_err() {
        debug!(node = id, "engine stopped, message discarded");
    }
    Ok(())
}
