//! # Multi-Tier Bucket
//!
//! GCRA state per tier on a governor clock. Each tier holds `capacity`
//! tokens refilled greedily over its window, so a full window of silence
//! restores the whole burst.
//!
//! A request is admitted only if it fits under every tier at once. All
//! tiers are evaluated under one lock and charged together: a rejected
//! request leaves every tier untouched.

use crate::domain::TierSpec;
use governor::clock::{Clock, DefaultClock, Reference};
use parking_lot::Mutex;
use std::time::Duration;

/// GCRA state of one tier, as offsets from the bucket's origin.
#[derive(Debug, Clone, Copy)]
struct TierState {
    /// Time one token takes to refill.
    emission: Duration,
    /// How far the theoretical arrival time may run ahead of now.
    tolerance: Duration,
    /// Theoretical arrival time of the next request.
    tat: Duration,
}

impl TierState {
    fn new(spec: TierSpec) -> Self {
        let emission = (spec.window / spec.capacity.get()).max(Duration::from_nanos(1));
        Self {
            emission,
            tolerance: emission * (spec.capacity.get() - 1),
            tat: Duration::ZERO,
        }
    }

    /// Arrival time after admitting one request at `now`, or the wait
    /// until this tier would admit.
    fn admit_at(&self, now: Duration) -> Result<Duration, Duration> {
        let tat = self.tat.max(now);
        let ahead = tat - now;
        if ahead > self.tolerance {
            Err(ahead - self.tolerance)
        } else {
            Ok(tat + self.emission)
        }
    }
}

/// Admission state for one tenant or customer.
pub struct MultiTierBucket<C: Clock = DefaultClock> {
    tiers: Mutex<Vec<TierState>>,
    specs: Vec<TierSpec>,
    clock: C,
    origin: C::Instant,
}

impl MultiTierBucket<DefaultClock> {
    /// Bucket on the system clock.
    pub fn new(tiers: &[TierSpec]) -> Self {
        Self::with_clock(tiers, &DefaultClock::default())
    }
}

impl<C: Clock + Clone> MultiTierBucket<C> {
    /// Bucket on an explicit clock.
    pub fn with_clock(tiers: &[TierSpec], clock: &C) -> Self {
        let mut specs = tiers.to_vec();
        specs.sort_by_key(|tier| tier.window);
        Self {
            tiers: Mutex::new(specs.iter().copied().map(TierState::new).collect()),
            specs,
            clock: clock.clone(),
            origin: clock.now(),
        }
    }

    /// Takes one token from every tier, or none when any tier rejects.
    ///
    /// On rejection reports how long until every tier would admit.
    pub fn check(&self) -> Result<(), Duration> {
        let now: Duration = self.clock.now().duration_since(self.origin).into();
        let mut tiers = self.tiers.lock();

        let mut next = Vec::with_capacity(tiers.len());
        let mut wait = Duration::ZERO;
        for tier in tiers.iter() {
            match tier.admit_at(now) {
                Ok(tat) => next.push(tat),
                Err(tier_wait) => wait = wait.max(tier_wait),
            }
        }
        if wait > Duration::ZERO {
            return Err(wait);
        }

        for (tier, tat) in tiers.iter_mut().zip(next) {
            tier.tat = tat;
        }
        Ok(())
    }

    /// True when the request is admitted.
    pub fn try_consume(&self) -> bool {
        self.check().is_ok()
    }

    /// Configured tiers, shortest window first.
    pub fn tiers(&self) -> impl Iterator<Item = &TierSpec> {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_configuration;
    use governor::clock::FakeRelativeClock;

    fn bucket(config: &str) -> (MultiTierBucket<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let tiers = parse_configuration(config).unwrap();
        (MultiTierBucket::with_clock(&tiers, &clock), clock)
    }

    #[test]
    fn test_capacity_per_window() {
        let (bucket, clock) = bucket("2:1");
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        clock.advance(Duration::from_secs(1));
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn test_every_tier_must_admit() {
        // Plenty per second, but only 3 per minute.
        let (bucket, clock) = bucket("10:1,3:60");
        for _ in 0..3 {
            assert!(bucket.try_consume());
            clock.advance(Duration::from_secs(1));
        }
        assert!(!bucket.try_consume());

        clock.advance(Duration::from_secs(60));
        assert!(bucket.try_consume());
    }

    #[test]
    fn test_rejected_requests_charge_no_tier() {
        let (busy, busy_clock) = bucket("3:2,4:10");
        let (quiet, quiet_clock) = bucket("3:2,4:10");
        for bucket in [&busy, &quiet] {
            for _ in 0..3 {
                assert!(bucket.try_consume());
            }
        }
        busy_clock.advance(Duration::from_secs(2));
        quiet_clock.advance(Duration::from_secs(2));
        assert!(busy.try_consume());
        assert!(quiet.try_consume());

        // The long tier is exhausted; these must not drain the short one.
        assert!(!busy.try_consume());
        assert!(!busy.try_consume());

        busy_clock.advance(Duration::from_millis(500));
        quiet_clock.advance(Duration::from_millis(500));
        assert!(quiet.try_consume());
        assert!(busy.try_consume());
    }

    #[test]
    fn test_rejection_reports_wait() {
        let (bucket, clock) = bucket("1:10");
        assert!(bucket.check().is_ok());
        let wait = bucket.check().unwrap_err();
        assert_eq!(wait, Duration::from_secs(10));

        clock.advance(wait);
        assert!(bucket.check().is_ok());
    }

    #[test]
    fn test_wait_covers_the_slowest_tier() {
        let (bucket, _clock) = bucket("1:1,1:30");
        assert!(bucket.check().is_ok());
        assert_eq!(bucket.check().unwrap_err(), Duration::from_secs(30));
    }

    #[test]
    fn test_tiers_sorted_by_window() {
        let (bucket, _clock) = bucket("2000:60,100:1");
        let windows: Vec<_> = bucket.tiers().map(|t| t.window.as_secs()).collect();
        assert_eq!(windows, vec![1, 60]);
    }
}
