use log::debug;
use shared::EntityId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::registry::Registry;

/// An encoded message, shared between every recipient of a broadcast.
pub type Outbound = Arc<[u8]>;

/// What happened to a message handed to [`ClientHandle::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The writer is behind and the queue is full; the message was dropped.
    Dropped,
    /// The writer task has ended.
    Closed,
}

/// Transport handle for one connection.
///
/// Sending only queues bytes for the connection's writer task, so a slow
/// socket never stalls the caller. The queue is bounded: a client that
/// stops reading loses messages instead of growing server memory.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: EntityId,
    pub addr: SocketAddr,
    sender: mpsc::Sender<Outbound>,
}

impl ClientHandle {
    pub fn new(id: EntityId, addr: SocketAddr, sender: mpsc::Sender<Outbound>) -> Self {
        ClientHandle { id, addr, sender }
    }

    /// Queues `bytes` for this client without waiting.
    pub fn send(&self, bytes: Outbound) -> Delivery {
        match self.sender.try_send(bytes) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub type ClientRegistry = Registry<ClientHandle>;

/// Writes queued messages to the socket until the queue closes or a write fails.
///
/// A failed write only ends this task; the reader side of the connection
/// notices the dead socket and does the cleanup.
pub async fn write_outbound<W: AsyncWrite + Unpin>(
    client_id: EntityId,
    mut writer: W,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(bytes) = outbound.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            debug!("Write to player {} failed: {}", client_id, e);
            return;
        }
    }
    debug!("Outbound queue for player {} closed", client_id);
}
