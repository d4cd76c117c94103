//! Absolute and relative time.
//!
//! Domain code never reads the system clock; callers pass `now` in,
//! which keeps expiry logic deterministic under test.

use serde::{Deserialize, Serialize};

/// Absolute Unix time in seconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Current system time.
    pub fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Add a relative time (saturating).
    pub fn add(&self, delta: RelativeTime) -> Self {
        Self(self.0.saturating_add(delta.as_secs()))
    }

    /// Add seconds (saturating).
    pub fn add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Subtract seconds (saturating).
    pub fn sub_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// Whether this point in time lies at or before `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.0 <= now.0
    }
}

/// A duration in seconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RelativeTime(pub u64);

impl RelativeTime {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn from_minutes(minutes: u64) -> Self {
        Self(minutes.saturating_mul(60))
    }

    pub fn from_hours(hours: u64) -> Self {
        Self(hours.saturating_mul(3600))
    }

    pub fn from_days(days: u64) -> Self {
        Self(days.saturating_mul(86_400))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Zero duration.
    pub fn zero() -> Self {
        Self(0)
    }
}
