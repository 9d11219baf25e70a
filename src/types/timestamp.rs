//! Frame presentation timestamps.
//!
//! Timestamps are used for correlation and display only; nothing in the
//! pipeline makes scheduling decisions from them except live-source pacing,
//! which is owned by the source itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Nanosecond-resolution presentation time attached to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FrameTimestamp(u64);

impl FrameTimestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Build a timestamp from a whole-second part and a nanosecond part.
    ///
    /// `nanos` above one second carries into the seconds.
    pub const fn from_parts(seconds: u64, nanos: u64) -> Self {
        Self(seconds.saturating_mul(NANOS_PER_SECOND).saturating_add(nanos))
    }

    pub fn from_secs_f64(seconds: f64) -> Self {
        if seconds <= 0.0 || !seconds.is_finite() {
            return Self::ZERO;
        }
        Self(Duration::from_secs_f64(seconds).as_nanos().min(u128::from(u64::MAX)) as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn seconds(self) -> u64 {
        self.0 / NANOS_PER_SECOND
    }

    pub const fn subsec_nanos(self) -> u64 {
        self.0 % NANOS_PER_SECOND
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Elapsed time since `earlier`, or zero if `earlier` is later.
    pub const fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub const fn saturating_add(self, duration: Duration) -> Self {
        let nanos = duration.as_nanos();
        let nanos = if nanos > u64::MAX as u128 { u64::MAX } else { nanos as u64 };
        Self(self.0.saturating_add(nanos))
    }

    /// Human-legible `seconds.nanoseconds` form, fraction zero-padded to 9 digits.
    pub fn render(self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for FrameTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds(), self.subsec_nanos())
    }
}

impl From<Duration> for FrameTimestamp {
    fn from(value: Duration) -> Self {
        Self::ZERO.saturating_add(value)
    }
}
