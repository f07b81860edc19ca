//! Server configuration

use shared::{
    Bounds, FloatVector, ARENA, DEFAULT_HOST, DEFAULT_PORT, MAX_DT, MAX_DT_DIFF, SPAWN_POSITION,
    TICK_PERIOD,
};
use std::time::Duration;

/// Messages buffered per connection before further snapshots are dropped.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Limits applied to the elapsed time a client claims for each input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    /// Longest single step an accepted input may move for.
    pub max_dt: Duration,
    /// How far a claim may exceed the observed gap between two inputs.
    pub max_dt_diff: Duration,
}

impl Default for InputLimits {
    fn default() -> Self {
        InputLimits {
            max_dt: MAX_DT,
            max_dt_diff: MAX_DT_DIFF,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, anything `TcpListener::bind` accepts.
    pub addr: String,
    pub tick_period: Duration,
    pub spawn: FloatVector,
    pub bounds: Bounds,
    pub limits: InputLimits,
    /// Per-connection outbound queue length. Must be at least 1.
    pub outbound_capacity: usize,
}

impl ServerConfig {
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets the tick period from a rate in Hz. Rates below 1 are treated as 1.
    pub fn with_tick_rate(mut self, tick_rate: u32) -> Self {
        self.tick_period = Duration::from_nanos(1_000_000_000 / u64::from(tick_rate.max(1)));
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            tick_period: TICK_PERIOD,
            spawn: SPAWN_POSITION,
            bounds: ARENA,
            limits: InputLimits::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}
