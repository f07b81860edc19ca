//! Newline-delimited JSON wire protocol.
//!
//! Every message is a single JSON object followed by one `\n`. The object
//! carries a numeric `"type"` tag next to the variant's own fields, so all
//! variants share one stream without any length prefix. Decoding peeks at
//! the tag on the untyped object first and only then parses the variant.

use crate::time::Timestamp;
use crate::{velocity, EntityId, FloatVector, InputState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const DELIMITER: u8 = b'\n';
pub const TYPE_KEY: &str = "type";
/// Longest frame a reader buffers before giving up on the stream.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    AssignIdentity = 1,
    ClientInput = 2,
    WorldSnapshot = 3,
}

impl MessageType {
    pub fn tag(self) -> u64 {
        self as u64
    }

    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(MessageType::AssignIdentity),
            2 => Some(MessageType::ClientInput),
            3 => Some(MessageType::WorldSnapshot),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message type key not present")]
    MissingType,
    #[error("message type is not a number")]
    NonNumericType,
    #[error("message type {0} matches no known message")]
    UnknownType(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("message did not serialize to a JSON object")]
    NotAnObject,
}

/// Sent by the server right after accepting a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignIdentity {
    pub sent_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<Timestamp>,
    pub player_id: EntityId,
}

impl AssignIdentity {
    pub fn new(player_id: EntityId) -> Self {
        Self {
            sent_at: Timestamp::now(),
            received_at: None,
            player_id,
        }
    }
}

/// One sampled input, sent by a client whenever a key is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInput {
    pub sent_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<Timestamp>,
    /// Strictly increasing per client, starting at 0.
    pub sequence: i64,
    pub input: InputState,
    /// Client-measured time the input was held for.
    pub elapsed: Duration,
    pub player_id: EntityId,
}

impl ClientInput {
    pub fn new(player_id: EntityId, sequence: i64, input: InputState, elapsed: Duration) -> Self {
        Self {
            sent_at: Timestamp::now(),
            received_at: None,
            sequence,
            input,
            elapsed,
            player_id,
        }
    }

    /// Displacement this input claims, before any clamping.
    pub fn displacement(&self) -> FloatVector {
        velocity(&self.input, self.elapsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntity {
    pub id: EntityId,
    pub position: FloatVector,
    pub last_acked_seq: i64,
}

/// Broadcast once per tick with every entity the server knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub sent_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<Timestamp>,
    pub entities: Vec<SnapshotEntity>,
}

impl WorldSnapshot {
    pub fn new(entities: Vec<SnapshotEntity>) -> Self {
        Self {
            sent_at: Timestamp::now(),
            received_at: None,
            entities,
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&SnapshotEntity> {
        self.entities.iter().find(|entity| entity.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    AssignIdentity(AssignIdentity),
    ClientInput(ClientInput),
    WorldSnapshot(WorldSnapshot),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::AssignIdentity(_) => MessageType::AssignIdentity,
            Message::ClientInput(_) => MessageType::ClientInput,
            Message::WorldSnapshot(_) => MessageType::WorldSnapshot,
        }
    }

    pub fn sent_at(&self) -> Timestamp {
        match self {
            Message::AssignIdentity(m) => m.sent_at,
            Message::ClientInput(m) => m.sent_at,
            Message::WorldSnapshot(m) => m.sent_at,
        }
    }

    pub fn received_at(&self) -> Option<Timestamp> {
        match self {
            Message::AssignIdentity(m) => m.received_at,
            Message::ClientInput(m) => m.received_at,
            Message::WorldSnapshot(m) => m.received_at,
        }
    }

    pub fn set_received_at(&mut self, at: Timestamp) {
        let slot = match self {
            Message::AssignIdentity(m) => &mut m.received_at,
            Message::ClientInput(m) => &mut m.received_at,
            Message::WorldSnapshot(m) => &mut m.received_at,
        };
        *slot = Some(at);
    }
}

impl From<AssignIdentity> for Message {
    fn from(message: AssignIdentity) -> Self {
        Message::AssignIdentity(message)
    }
}

impl From<ClientInput> for Message {
    fn from(message: ClientInput) -> Self {
        Message::ClientInput(message)
    }
}

impl From<WorldSnapshot> for Message {
    fn from(message: WorldSnapshot) -> Self {
        Message::WorldSnapshot(message)
    }
}

/// Serializes `message` into one newline-terminated line.
///
/// Object keys come out sorted, so equal messages encode to equal bytes.
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    let mut value = match message {
        Message::AssignIdentity(m) => serde_json::to_value(m)?,
        Message::ClientInput(m) => serde_json::to_value(m)?,
        Message::WorldSnapshot(m) => serde_json::to_value(m)?,
    };

    let object = value.as_object_mut().ok_or(EncodeError::NotAnObject)?;
    object.insert(
        TYPE_KEY.to_string(),
        Value::from(message.message_type().tag()),
    );

    let mut bytes = serde_json::to_vec(&value)?;
    bytes.push(DELIMITER);
    Ok(bytes)
}

/// Parses one line, with or without its trailing delimiter.
pub fn decode(raw: &[u8]) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_slice(trim_line(raw))?;

    let message_type = {
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
        let tag = match object.get(TYPE_KEY) {
            None => return Err(DecodeError::MissingType),
            Some(Value::Number(tag)) => tag,
            Some(_) => return Err(DecodeError::NonNumericType),
        };
        tag.as_u64()
            .and_then(MessageType::from_tag)
            .ok_or_else(|| DecodeError::UnknownType(tag.to_string()))?
    };

    let message = match message_type {
        MessageType::AssignIdentity => Message::AssignIdentity(serde_json::from_value(value)?),
        MessageType::ClientInput => Message::ClientInput(serde_json::from_value(value)?),
        MessageType::WorldSnapshot => Message::WorldSnapshot(serde_json::from_value(value)?),
    };
    Ok(message)
}

fn trim_line(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(&[DELIMITER]).unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Splits a byte stream into delimiter-terminated frames.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_len(inner, MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(512),
            max_len,
        }
    }

    /// Returns the next non-empty frame without its delimiter, or `None`
    /// once the stream has ended. A partial frame at end of stream is dropped.
    ///
    /// A frame longer than the reader's limit fails with
    /// [`io::ErrorKind::InvalidData`]; the stream cannot be resynchronised.
    pub async fn next_frame(&mut self) -> io::Result<Option<&[u8]>> {
        loop {
            self.buf.clear();
            let limit = self.max_len as u64 + 1;
            let read = (&mut self.inner)
                .take(limit)
                .read_until(DELIMITER, &mut self.buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }
            if self.buf.last() != Some(&DELIMITER) {
                if self.buf.len() > self.max_len {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("frame exceeds {} bytes", self.max_len),
                    ));
                }
                return Ok(None);
            }

            let len = trim_line(&self.buf).len();
            if len == 0 {
                continue;
            }
            return Ok(Some(&self.buf[..len]));
        }
    }

    /// Reads and decodes the next frame. The outer error is fatal to the
    /// stream, the inner one only to that message.
    pub async fn next_message(&mut self) -> io::Result<Option<Result<Message, DecodeError>>> {
        Ok(self.next_frame().await?.map(decode))
    }
}
