//! Client network layer and the predict/send/reconcile loop

use log::{debug, info, warn};
use shared::{
    encode, DecodeError, EncodeError, EntityId, FrameReader, Message, MessageQueue, Timestamp,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::config::ClientConfig;
use crate::game::{PredictionEngine, ReconcileError};
use crate::input::InputSource;
use crate::rendering::Renderer;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection to server closed")]
    Closed,
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// An established connection: identity received, reader and writer running.
///
/// Incoming messages pile up in a queue until [`Connection::drain`] takes
/// them. Outgoing messages are handed to the writer task, so sending never
/// waits on the socket.
pub struct Connection {
    player_id: EntityId,
    incoming: Arc<MessageQueue>,
    outgoing: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Self::handshake(BufReader::new(reader), writer).await
    }

    /// Waits for the server to assign our id, then starts the reader and
    /// writer tasks. Anything other than an identity as the first message
    /// fails the handshake.
    pub async fn handshake<R, W>(reader: R, writer: W) -> Result<Self, ClientError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut frames = FrameReader::new(reader);
        let player_id = match frames.next_message().await? {
            Some(Ok(Message::AssignIdentity(hello))) => hello.player_id,
            Some(Ok(other)) => {
                return Err(ClientError::Handshake(format!(
                    "expected an identity, got {:?}",
                    other.message_type()
                )))
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ClientError::Closed),
        };
        info!("Connected as player {}", player_id);

        let incoming = Arc::new(MessageQueue::new());
        let reader = tokio::spawn(read_server_messages(frames, Arc::clone(&incoming)));

        let (outgoing, outbound) = mpsc::unbounded_channel();
        tokio::spawn(write_messages(writer, outbound));

        Ok(Connection {
            player_id,
            incoming,
            outgoing,
            reader,
        })
    }

    pub fn player_id(&self) -> EntityId {
        self.player_id
    }

    pub fn send(&self, message: Message) -> Result<(), ClientError> {
        self.outgoing.send(message).map_err(|_| ClientError::Closed)
    }

    /// Takes every message received since the last call, oldest first.
    pub fn drain(&self) -> Vec<Message> {
        self.incoming.pop_all()
    }

    /// True once either direction of the connection has stopped.
    pub fn is_closed(&self) -> bool {
        self.reader.is_finished() || self.outgoing.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_server_messages<R: AsyncBufRead + Unpin>(
    mut frames: FrameReader<R>,
    incoming: Arc<MessageQueue>,
) {
    loop {
        match frames.next_message().await {
            Ok(Some(Ok(mut message))) => {
                message.set_received_at(Timestamp::now());
                incoming.push(message);
            }
            Ok(Some(Err(e))) => warn!("Discarding malformed message from server: {}", e),
            Ok(None) => {
                info!("Server closed the connection");
                return;
            }
            Err(e) => {
                warn!("Read from server failed: {}", e);
                return;
            }
        }
    }
}

async fn write_messages<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let bytes = match encode(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping unencodable {:?}: {}", message.message_type(), e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            warn!("Write to server failed: {}", e);
            return;
        }
    }
    debug!("Outbound queue closed");
}

/// Drives one player: sample input, predict, send, reconcile, render.
pub struct Client<I, R> {
    connection: Connection,
    engine: PredictionEngine,
    input: I,
    renderer: R,
    frame_period: Duration,
}

impl<I: InputSource, R: Renderer> Client<I, R> {
    pub fn new(connection: Connection, config: &ClientConfig, input: I, renderer: R) -> Self {
        let engine = PredictionEngine::new(connection.player_id(), config);
        Client {
            connection,
            engine,
            input,
            renderer,
            frame_period: config.frame_period,
        }
    }

    pub fn engine(&self) -> &PredictionEngine {
        &self.engine
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Runs a single frame. `elapsed` is the time since the previous frame.
    pub fn frame(&mut self, elapsed: Duration) -> Result<(), ClientError> {
        let keys = self.input.sample();
        if let Some(input) = self.engine.step(keys, elapsed) {
            self.connection.send(input.into())?;
        }

        for message in self.connection.drain() {
            match message {
                Message::WorldSnapshot(snapshot) => self.engine.apply_snapshot(&snapshot)?,
                other => warn!(
                    "Ignoring unexpected {:?} message from server",
                    other.message_type()
                ),
            }
        }

        self.renderer
            .render(&self.engine.units(), self.engine.player_id());
        Ok(())
    }

    /// Runs frames until the input source closes.
    ///
    /// Losing the connection or failing to reconcile ends the loop with an error.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut last_frame = Instant::now();

        while self.input.is_open() {
            if self.connection.is_closed() {
                return Err(ClientError::Closed);
            }

            let started = Instant::now();
            let elapsed = started - last_frame;
            last_frame = started;

            self.frame(elapsed)?;

            sleep(self.frame_period.saturating_sub(started.elapsed())).await;
        }

        info!("Input closed after {} inputs", self.engine.next_sequence());
        Ok(())
    }
}
