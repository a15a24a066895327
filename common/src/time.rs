//! Monotonic engine time and wall-clock calibration
//!
//! The engine works in a single monotonic nanosecond domain anchored at
//! process start. Wall-clock instants (egress timestamps, wire sending
//! times) convert through a calibration pairing captured once at startup.

use crate::constants::{NANOS_PER_MICRO, NANOS_PER_MILLI, NANOS_PER_SEC};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

struct Clock {
    origin: Instant,
    wall_at_origin_ns: u64,
}

static CLOCK: Lazy<Clock> = Lazy::new(|| {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let wall_ns = wall.as_secs() * NANOS_PER_SEC + u64::from(wall.subsec_nanos());
    Clock {
        origin: Instant::now(),
        wall_at_origin_ns: wall_ns,
    }
});

/// Monotonic timestamp: nanoseconds since process start
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Ts(u64);

impl Ts {
    /// Current monotonic time
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        // u64 nanoseconds cover ~584 years of process uptime
        Self(CLOCK.origin.elapsed().as_nanos() as u64)
    }

    /// Create from raw nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since process start
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Microseconds since process start
    #[must_use]
    pub const fn as_micros(&self) -> u64 {
        self.0 / NANOS_PER_MICRO
    }

    /// Milliseconds since process start
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / NANOS_PER_MILLI
    }

    /// Nanoseconds elapsed since `earlier`, zero if `earlier` is later
    #[must_use]
    pub const fn nanos_since(&self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Wall-clock epoch milliseconds, for egress documents
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_millis() -> u64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    wall.as_millis() as u64
}

/// Startup pairing of the wall clock with the monotonic origin
///
/// Captured once; there is no re-calibration, so wall-derived timestamps
/// carry whatever clock drift accumulates over the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockCalibration {
    wall_at_origin_ns: u64,
}

impl ClockCalibration {
    /// Capture the process-wide calibration
    #[must_use]
    pub fn capture() -> Self {
        Self {
            wall_at_origin_ns: CLOCK.wall_at_origin_ns,
        }
    }

    /// Map wall-clock epoch nanoseconds into the monotonic domain
    ///
    /// Instants before process start clamp to zero.
    #[must_use]
    pub const fn to_monotonic(&self, wall_epoch_ns: u64) -> Ts {
        Ts::from_nanos(wall_epoch_ns.saturating_sub(self.wall_at_origin_ns))
    }

    /// Map a monotonic timestamp back to wall-clock epoch nanoseconds
    #[must_use]
    pub const fn to_wall(&self, ts: Ts) -> u64 {
        self.wall_at_origin_ns.saturating_add(ts.as_nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_is_monotonic() {
        let a = Ts::now();
        let b = Ts::now();
        assert!(b >= a);
    }

    #[test]
    fn ts_unit_conversions() {
        let ts = Ts::from_nanos(1_234_567_890);
        assert_eq!(ts.as_nanos(), 1_234_567_890);
        assert_eq!(ts.as_micros(), 1_234_567);
        assert_eq!(ts.as_millis(), 1_234);
    }

    #[test]
    fn nanos_since_saturates() {
        let early = Ts::from_nanos(100);
        let late = Ts::from_nanos(400);
        assert_eq!(late.nanos_since(early), 300);
        assert_eq!(early.nanos_since(late), 0);
    }

    #[test]
    fn calibration_roundtrip() {
        let cal = ClockCalibration::capture();
        let ts = Ts::from_nanos(5_000);
        let wall = cal.to_wall(ts);
        assert_eq!(cal.to_monotonic(wall), ts);
    }

    #[test]
    fn calibration_clamps_pre_start_instants() {
        let cal = ClockCalibration::capture();
        assert_eq!(cal.to_monotonic(0), Ts::from_nanos(0));
    }
}
