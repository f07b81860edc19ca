use shared::{Bounds, ARENA, DEFAULT_HOST, DEFAULT_PORT, FRAME_PERIOD, MAX_DT};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    /// Target time between two frames of the predict/send/reconcile loop.
    pub frame_period: Duration,
    /// Longest step a single frame may predict. Matches the server's limit.
    pub max_dt: Duration,
    pub bounds: Bounds,
}

impl ClientConfig {
    pub fn with_server_addr(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = addr.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            frame_period: FRAME_PERIOD,
            max_dt: MAX_DT,
            bounds: ARENA,
        }
    }
}
