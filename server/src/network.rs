//! Server network layer: accepting connections and moving bytes
//!
//! Every connection gets a reader task that decodes inputs into the shared
//! queue and a writer task that drains the connection's outbound channel.
//! Neither task ever touches game state directly; the tick engine does.

use log::{debug, error, info, warn};
use shared::{
    encode, AssignIdentity, EncodeError, EntityId, FrameReader, Message, MessageQueue, Timestamp,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::{write_outbound, ClientHandle, ClientRegistry};
use crate::config::ServerConfig;
use crate::entity::{Entity, EntityRegistry};
use crate::game::TickEngine;
use crate::registry::{IdAllocator, RegistryError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
}

/// Aborts the wrapped task when dropped, so the tick loop dies with `run`.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    ids: IdAllocator,
    entities: Arc<EntityRegistry>,
    clients: Arc<ClientRegistry>,
    queue: Arc<MessageQueue>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            config,
            ids: IdAllocator::new(),
            entities: Arc::new(EntityRegistry::new()),
            clients: Arc::new(ClientRegistry::new()),
            queue: Arc::new(MessageQueue::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn entities(&self) -> Arc<EntityRegistry> {
        Arc::clone(&self.entities)
    }

    pub fn clients(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.clients)
    }

    /// Starts the tick loop and accepts connections until an unrecoverable error.
    ///
    /// Dropping the returned future stops the tick loop too. Connection
    /// tasks already spawned finish on their own when their sockets close.
    pub async fn run(self) -> Result<(), ServerError> {
        let engine = TickEngine::new(
            &self.config,
            Arc::clone(&self.entities),
            Arc::clone(&self.clients),
            Arc::clone(&self.queue),
        );
        let _tick_loop = AbortOnDrop(tokio::spawn(engine.run()));

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    self.accept(stream, addr)?;
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Registers a new connection and starts its reader and writer tasks.
    ///
    /// The identity message is queued before the client becomes visible to
    /// the tick engine, so it always precedes the first snapshot.
    fn accept(&self, stream: TcpStream, addr: SocketAddr) -> Result<EntityId, ServerError> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let id = self.ids.next();
        let hello: Arc<[u8]> = Arc::from(encode(&Message::from(AssignIdentity::new(id)))?);

        self.entities
            .insert(id, Entity::spawn(id, self.config.spawn, Timestamp::now()))?;

        let (reader, writer) = stream.into_split();
        let (sender, outbound) = mpsc::channel(self.config.outbound_capacity.max(1));
        tokio::spawn(write_outbound(id, writer, outbound));

        let client = ClientHandle::new(id, addr, sender);
        client.send(hello);
        if let Err(e) = self.clients.insert(id, client) {
            self.entities.remove(id);
            return Err(e.into());
        }

        info!("Player {} connected from {}", id, addr);

        tokio::spawn(handle_connection(
            id,
            BufReader::new(reader),
            Arc::clone(&self.queue),
            Arc::clone(&self.clients),
            Arc::clone(&self.entities),
        ));

        Ok(id)
    }
}

/// Reads until the connection ends, then removes the player from the game.
pub async fn handle_connection<R: AsyncBufRead + Unpin>(
    id: EntityId,
    reader: R,
    queue: Arc<MessageQueue>,
    clients: Arc<ClientRegistry>,
    entities: Arc<EntityRegistry>,
) {
    let received = read_client_messages(id, reader, &queue).await;

    // Dropping the handle closes the outbound channel, which ends the writer.
    let client = clients.remove(id);
    entities.remove(id);

    match client {
        Some(client) => info!(
            "Player {} ({}) disconnected after {} inputs",
            id, client.addr, received
        ),
        None => info!("Player {} disconnected after {} inputs", id, received),
    }
}

/// Pushes every valid input from `reader` onto `queue`, stamped with the
/// time it was read. Returns how many were queued.
///
/// Malformed frames and messages a client has no business sending are
/// logged and skipped. Only read errors and end of stream stop the loop.
pub async fn read_client_messages<R: AsyncBufRead + Unpin>(
    id: EntityId,
    reader: R,
    queue: &MessageQueue,
) -> usize {
    let mut frames = FrameReader::new(reader);
    let mut queued = 0;

    loop {
        let message = match frames.next_message().await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                warn!("Discarding malformed message from player {}: {}", id, e);
                continue;
            }
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("Closing connection to player {}: {}", id, e);
                break;
            }
            Err(e) => {
                debug!("Read from player {} failed: {}", id, e);
                break;
            }
        };

        match message {
            Message::ClientInput(mut input) if input.player_id == id => {
                input.received_at = Some(Timestamp::now());
                queue.push(Message::ClientInput(input));
                queued += 1;
            }
            Message::ClientInput(input) => {
                warn!(
                    "Player {} sent input claiming to be player {}",
                    id, input.player_id
                );
            }
            other => {
                warn!(
                    "Player {} sent unexpected {:?} message",
                    id,
                    other.message_type()
                );
            }
        }
    }

    queued
}
