//! Reservable/renewable quantity with an occupancy history.
//!
//! A `Resource` tracks how much of a capacity is currently claimed and
//! remembers every change with its timestamp, so monitors can integrate
//! occupancy over a trailing window. Capacity may be infinite (a gateway's
//! RAM); utilization of an infinite resource is defined as zero.

use crate::error::{CoreError, CoreResult};
use crate::time::SimTime;
use tracing::trace;

/// A reservable quantity.
#[derive(Debug, Clone)]
pub struct Resource {
    label: String,
    capacity: f64,
    occupied: f64,
    history: Vec<(SimTime, f64)>,
}

impl Resource {
    /// Create a resource with the given capacity (may be `f64::INFINITY`).
    pub fn new(label: impl Into<String>, capacity: f64) -> Self {
        Resource {
            label: label.into(),
            capacity,
            occupied: 0.0,
            history: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Amount still available.
    pub fn amount(&self) -> f64 {
        self.capacity - self.occupied
    }

    /// Amount currently claimed.
    pub fn occupied(&self) -> f64 {
        self.occupied
    }

    /// Claim `quantity` atomically; fails without side effects when the
    /// available amount is insufficient.
    pub fn get(&mut self, now: SimTime, quantity: f64) -> CoreResult<()> {
        if self.amount() < quantity {
            return Err(CoreError::resource_exhausted(
                self.label.clone(),
                quantity,
                self.amount(),
            ));
        }
        self.occupied += quantity;
        self.history.push((now, self.occupied));
        trace!(
            resource = %self.label,
            claimed = quantity,
            available = self.amount(),
            "resource claim"
        );
        Ok(())
    }

    /// Return `quantity`, clamping so the resource never holds less than
    /// nothing.
    pub fn put(&mut self, now: SimTime, quantity: f64) {
        self.occupied = (self.occupied - quantity).max(0.0);
        self.history.push((now, self.occupied));
        trace!(
            resource = %self.label,
            returned = quantity,
            available = self.amount(),
            "resource release"
        );
    }

    /// Time-integrated occupied amount over `[now - window, now]`, in
    /// amount-ticks.
    pub fn usage(&self, now: SimTime, window: SimTime) -> f64 {
        if window == SimTime::ZERO {
            return 0.0;
        }
        let start = now.saturating_sub(window);
        // Occupancy level in force when the window opens.
        let mut level = 0.0;
        let mut cursor = start;
        let mut integral = 0.0;
        for &(t, occupied) in &self.history {
            if t <= start {
                level = occupied;
                continue;
            }
            if t > now {
                break;
            }
            integral += level * (t - cursor).ticks() as f64;
            level = occupied;
            cursor = t;
        }
        integral += level * (now.saturating_sub(cursor)).ticks() as f64;
        integral
    }

    /// Average occupied amount over the trailing window.
    pub fn mean_occupied(&self, now: SimTime, window: SimTime) -> f64 {
        if window == SimTime::ZERO {
            return 0.0;
        }
        self.usage(now, window) / window.ticks() as f64
    }

    /// Fraction of capacity occupied over the trailing window; zero for
    /// infinite capacity.
    pub fn utilization(&self, now: SimTime, window: SimTime) -> f64 {
        if !self.capacity.is_finite() || self.capacity <= 0.0 || window == SimTime::ZERO {
            return 0.0;
        }
        self.usage(now, window) / (self.capacity * window.ticks() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ticks: u64) -> SimTime {
        SimTime::from_ticks(ticks)
    }

    #[test]
    fn test_get_put_balance() {
        let mut r = Resource::new("ram", 1000.0);
        r.get(t(0), 400.0).unwrap();
        assert_eq!(r.amount(), 600.0);
        assert!(r.get(t(1), 700.0).is_err());
        assert_eq!(r.amount(), 600.0);
        r.put(t(2), 400.0);
        assert_eq!(r.amount(), 1000.0);
    }

    #[test]
    fn test_put_clamps_at_capacity() {
        let mut r = Resource::new("ram", 100.0);
        r.get(t(0), 50.0).unwrap();
        r.put(t(1), 500.0);
        assert_eq!(r.amount(), 100.0);
        assert_eq!(r.occupied(), 0.0);
    }

    #[test]
    fn test_infinite_capacity() {
        let mut r = Resource::new("gateway ram", f64::INFINITY);
        r.get(t(0), 1e12).unwrap();
        assert_eq!(r.amount(), f64::INFINITY);
        assert_eq!(r.utilization(t(10), t(10)), 0.0);
    }

    #[test]
    fn test_usage_integral() {
        let mut r = Resource::new("core", 10.0);
        r.get(t(0), 4.0).unwrap();
        r.get(t(5), 2.0).unwrap();
        r.put(t(8), 6.0);
        // Occupancy: 4 over [0,5), 6 over [5,8), 0 over [8,10).
        let usage = r.usage(t(10), t(10));
        assert!((usage - (4.0 * 5.0 + 6.0 * 3.0)).abs() < 1e-9);
        let mean = r.mean_occupied(t(10), t(10));
        assert!((mean - 3.8).abs() < 1e-9);
        let util = r.utilization(t(10), t(10));
        assert!((util - 0.38).abs() < 1e-9);
    }

    #[test]
    fn test_usage_window_clips_history() {
        let mut r = Resource::new("core", 10.0);
        r.get(t(0), 4.0).unwrap();
        // Level 4 long before the window; the window sees a constant level.
        let usage = r.usage(t(100), t(10));
        assert!((usage - 40.0).abs() < 1e-9);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn occupied_stays_within_bounds(
                ops in prop::collection::vec((prop::bool::ANY, 0.0f64..50.0), 1..100)
            ) {
                let mut r = Resource::new("r", 100.0);
                for (i, &(is_get, quantity)) in ops.iter().enumerate() {
                    let now = t(i as u64);
                    if is_get {
                        let _ = r.get(now, quantity);
                    } else {
                        r.put(now, quantity);
                    }
                    prop_assert!(r.occupied() >= 0.0);
                    prop_assert!(r.occupied() <= r.capacity() + 1e-9);
                }
            }

            #[test]
            fn claims_equal_capacity_minus_amount(
                quantities in prop::collection::vec(0.0f64..30.0, 1..50)
            ) {
                let mut r = Resource::new("r", 1000.0);
                let mut held = 0.0;
                for (i, &q) in quantities.iter().enumerate() {
                    if r.get(t(i as u64), q).is_ok() {
                        held += q;
                    }
                    prop_assert!((held - (r.capacity() - r.amount())).abs() < 1e-6);
                }
            }
        }
    }
}
