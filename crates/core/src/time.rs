//! Fixed-point virtual time.
//!
//! All kernel arithmetic runs on integer ticks at `10^resolution` ticks per
//! virtual second; floating seconds appear only at the API and telemetry
//! boundary. This keeps event ordering exact and drift-free.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A point (or span) of virtual time, in ticks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// The start of virtual time.
    pub const ZERO: SimTime = SimTime(0);

    /// The smallest representable span: one tick.
    pub const TICK: SimTime = SimTime(1);

    /// Construct from a raw tick count.
    pub const fn from_ticks(ticks: u64) -> Self {
        SimTime(ticks)
    }

    /// Raw tick count.
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Checked addition, erroring on tick-counter overflow.
    pub fn checked_add(self, rhs: SimTime) -> CoreResult<SimTime> {
        self.0
            .checked_add(rhs.0)
            .map(SimTime)
            .ok_or(CoreError::TimeOverflow { ticks: self.0 })
    }

    /// Saturating subtraction (clamps at zero).
    pub fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

/// Conversion between virtual seconds and ticks at a fixed resolution.
///
/// `resolution` is the number of decimal places kept on second values; a
/// resolution of 4 gives a minimum time unit of 0.1 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    resolution: u32,
    ticks_per_second: u64,
}

impl TimeBase {
    /// Create a time base. Resolution must be at least 1 and small enough
    /// that a tick-per-second count fits in 64 bits.
    pub fn new(resolution: u32) -> CoreResult<Self> {
        if resolution < 1 || resolution > 12 {
            return Err(CoreError::configuration(format!(
                "resolution must be within 1..=12, got {resolution}"
            )));
        }
        Ok(TimeBase {
            resolution,
            ticks_per_second: 10u64.pow(resolution),
        })
    }

    /// The configured number of decimal places.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Ticks per virtual second.
    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// The minimum time unit (one tick) in seconds.
    pub fn min_time_unit(&self) -> f64 {
        1.0 / self.ticks_per_second as f64
    }

    /// Convert seconds into ticks, rounding half away from zero. Negative
    /// values are rejected.
    pub fn time_from_seconds(&self, seconds: f64) -> CoreResult<SimTime> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CoreError::configuration(format!(
                "time value must be finite and non-negative, got {seconds}"
            )));
        }
        let ticks = (seconds * self.ticks_per_second as f64).round();
        if ticks > u64::MAX as f64 {
            return Err(CoreError::TimeOverflow { ticks: u64::MAX });
        }
        Ok(SimTime::from_ticks(ticks as u64))
    }

    /// Convert ticks into seconds.
    pub fn seconds(&self, time: SimTime) -> f64 {
        time.ticks() as f64 / self.ticks_per_second as f64
    }

    /// Convert a span in seconds into ticks, never rounding a positive span
    /// below one tick.
    pub fn span_from_seconds(&self, seconds: f64) -> CoreResult<SimTime> {
        let span = self.time_from_seconds(seconds)?;
        if span == SimTime::ZERO && seconds > 0.0 {
            return Ok(SimTime::TICK);
        }
        Ok(span)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        TimeBase {
            resolution: 4,
            ticks_per_second: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let base = TimeBase::new(4).unwrap();
        let t = base.time_from_seconds(1.5).unwrap();
        assert_eq!(t.ticks(), 15_000);
        assert_eq!(base.seconds(t), 1.5);
    }

    #[test]
    fn test_rounding() {
        let base = TimeBase::new(4).unwrap();
        // 0.00004 s rounds down to zero ticks, 0.00005 rounds up to one.
        assert_eq!(base.time_from_seconds(0.00004).unwrap().ticks(), 0);
        assert_eq!(base.time_from_seconds(0.00005).unwrap().ticks(), 1);
    }

    #[test]
    fn test_span_floor() {
        let base = TimeBase::new(4).unwrap();
        // A positive span never collapses to zero ticks.
        assert_eq!(base.span_from_seconds(0.00001).unwrap(), SimTime::TICK);
        assert_eq!(base.span_from_seconds(0.0).unwrap(), SimTime::ZERO);
    }

    #[test]
    fn test_invalid_resolution() {
        assert!(TimeBase::new(0).is_err());
        assert!(TimeBase::new(13).is_err());
    }

    #[test]
    fn test_negative_time_rejected() {
        let base = TimeBase::default();
        assert!(base.time_from_seconds(-0.1).is_err());
        assert!(base.time_from_seconds(f64::NAN).is_err());
    }

    #[test]
    fn test_min_time_unit() {
        let base = TimeBase::new(4).unwrap();
        assert_eq!(base.min_time_unit(), 0.0001);
    }
}
