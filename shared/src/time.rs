//! Wall-clock timestamps carried by every message.

use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_micros();
        Timestamp(micros.min(u64::MAX as u128) as u64)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let micros = rhs.as_micros().min(u64::MAX as u128) as u64;
        Timestamp(self.0.saturating_add(micros))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic_enough() {
        let t1 = Timestamp::now();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = Timestamp::now();
        assert!(t2 > t1);
        assert!(t2.duration_since(t1) >= Duration::from_millis(1));
    }

    #[test]
    fn test_duration_since_saturates() {
        let early = Timestamp::from_millis(100);
        let late = Timestamp::from_millis(110);

        assert_eq!(late.duration_since(early), Duration::from_millis(10));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn test_add_duration() {
        let t = Timestamp::from_millis(5) + Duration::from_micros(250);
        assert_eq!(t.as_micros(), 5_250);
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&Timestamp(42)).unwrap();
        assert_eq!(json, "42");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Timestamp(42));
    }
}
