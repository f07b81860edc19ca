use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

pub mod protocol;
pub mod queue;
pub mod time;

pub use protocol::{
    decode, encode, AssignIdentity, ClientInput, DecodeError, EncodeError, FrameReader, Message,
    MessageType, SnapshotEntity, WorldSnapshot,
};
pub use queue::MessageQueue;
pub use time::Timestamp;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1339;

/// Pixels per second a unit moves along an axis while its key is held.
pub const SPEED: f32 = 300.0;
/// Upper bound on the elapsed time a single input may claim.
pub const MAX_DT: Duration = Duration::from_millis(50);
/// Jitter allowed between a claimed elapsed time and the observed gap between two inputs.
pub const MAX_DT_DIFF_MILLIS: u64 = 8;
pub const MAX_DT_DIFF: Duration = Duration::from_millis(MAX_DT_DIFF_MILLIS);

pub const SPAWN_POSITION: FloatVector = FloatVector { x: 30.0, y: 30.0 };
pub const ARENA: Bounds = Bounds {
    width: 1024.0,
    height: 768.0,
};

pub const TICK_PERIOD: Duration = Duration::from_millis(33);
pub const FRAME_PERIOD: Duration = Duration::from_millis(16);

/// Stored as `last_acked_seq` before any input has been applied.
pub const NO_SEQUENCE: i64 = -1;

/// Server-assigned entity id. Ids start at 1 and are never reused.
pub type EntityId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FloatVector {
    pub x: f32,
    pub y: f32,
}

impl FloatVector {
    pub const ZERO: FloatVector = FloatVector { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for FloatVector {
    type Output = FloatVector;

    fn add(self, other: FloatVector) -> FloatVector {
        FloatVector {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl AddAssign for FloatVector {
    fn add_assign(&mut self, other: FloatVector) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for FloatVector {
    type Output = FloatVector;

    fn sub(self, other: FloatVector) -> FloatVector {
        FloatVector {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

/// Which directional keys were held when the input was sampled.
///
/// Opposing keys may both be held; they cancel out in [`velocity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    /// Returns true if any key is held.
    pub fn any(&self) -> bool {
        self.up || self.down || self.left || self.right
    }
}

/// Rectangular play area, `[0, width] x [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn clamp(&self, position: FloatVector) -> FloatVector {
        FloatVector {
            x: position.x.clamp(0.0, self.width),
            y: position.y.clamp(0.0, self.height),
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        ARENA
    }
}

/// Displacement produced by holding `input` for `elapsed`.
///
/// Axes are resolved independently. Screen coordinates: `up` moves toward
/// negative y.
pub fn velocity(input: &InputState, elapsed: Duration) -> FloatVector {
    let distance = SPEED * elapsed.as_secs_f32();

    let x = match (input.left, input.right) {
        (true, false) => -distance,
        (false, true) => distance,
        _ => 0.0,
    };
    let y = match (input.up, input.down) {
        (true, false) => -distance,
        (false, true) => distance,
        _ => 0.0,
    };

    FloatVector { x, y }
}

/// Moves `position` by the displacement for `input` and keeps it inside `bounds`.
///
/// Server application, client prediction and client replay all step through here.
pub fn advance(
    position: FloatVector,
    input: &InputState,
    elapsed: Duration,
    bounds: &Bounds,
) -> FloatVector {
    bounds.clamp(position + velocity(input, elapsed))
}
