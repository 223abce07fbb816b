//! Delta rate limiting for noisy numeric entities.

use std::time::Duration;

use tokio::time::Instant;

/// Rate limit parameters attached to an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Interval after which any value is accepted again.
    pub min_interval: Duration,
    /// Change magnitude that is always accepted.
    pub min_delta: f64,
}

impl RateLimit {
    /// Create rate limit parameters.
    pub fn new(min_interval: Duration, min_delta: f64) -> Self {
        Self {
            min_interval,
            min_delta,
        }
    }

    /// Build a fresh limiter with these parameters.
    pub fn limiter(&self) -> DeltaRateLimiter {
        DeltaRateLimiter::new(self.min_interval, self.min_delta)
    }
}

/// Stateful per-entity publish gate.
///
/// A sample passes when at least `min_interval` has elapsed since the last
/// accepted sample, or when it moved at least `min_delta` away from the last
/// accepted value. Both comparisons are inclusive.
///
/// Every acceptance, by either gate, records the value and restarts the
/// interval. Rejections leave the state untouched, so a run of small changes
/// is released once the interval has elapsed. The first sample always passes.
#[derive(Debug, Clone)]
pub struct DeltaRateLimiter {
    min_interval: Duration,
    min_delta: f64,
    last_value: f64,
    last_accepted_at: Option<Instant>,
}

impl DeltaRateLimiter {
    /// Create a limiter with no history.
    pub fn new(min_interval: Duration, min_delta: f64) -> Self {
        Self {
            min_interval,
            min_delta,
            last_value: 0.0,
            last_accepted_at: None,
        }
    }

    /// Decide on a sample taken now.
    pub fn allow(&mut self, value: f64) -> bool {
        self.allow_at(value, Instant::now())
    }

    /// Decide on a sample taken at `now`.
    pub fn allow_at(&mut self, value: f64, now: Instant) -> bool {
        let accept = match self.last_accepted_at {
            None => true,
            Some(at) => {
                now.saturating_duration_since(at) >= self.min_interval
                    || (value - self.last_value).abs() >= self.min_delta
            }
        };

        if accept {
            self.last_value = value;
            self.last_accepted_at = Some(now);
        }
        accept
    }

    /// Last accepted value, if any sample was accepted yet.
    pub fn last_value(&self) -> Option<f64> {
        self.last_accepted_at.map(|_| self.last_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_interval_and_delta_gates() {
        let start = Instant::now();
        let mut limiter = DeltaRateLimiter::new(secs(10), 100.0);

        // 150 passes by delta at t=2, so the repeat waits for t=12
        let samples = [(0.0, 0), (50.0, 1), (150.0, 2), (150.0, 11), (150.0, 12)];
        let decisions: Vec<bool> = samples
            .iter()
            .map(|&(value, t)| limiter.allow_at(value, start + secs(t)))
            .collect();

        assert_eq!(decisions, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_delta_accept_restarts_interval() {
        let start = Instant::now();
        let mut limiter = DeltaRateLimiter::new(secs(10), 100.0);

        assert!(limiter.allow_at(0.0, start));
        assert!(limiter.allow_at(200.0, start + secs(5)));
        assert!(!limiter.allow_at(210.0, start + secs(10)));
        assert!(limiter.allow_at(210.0, start + secs(15)));
        assert_eq!(limiter.last_value(), Some(210.0));
    }

    #[test]
    fn test_first_sample_always_passes() {
        let mut limiter = DeltaRateLimiter::new(secs(3600), f64::MAX);
        assert_eq!(limiter.last_value(), None);
        assert!(limiter.allow(42.0));
        assert_eq!(limiter.last_value(), Some(42.0));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let start = Instant::now();

        let mut by_delta = DeltaRateLimiter::new(secs(10), 0.5);
        assert!(by_delta.allow_at(1.0, start));
        assert!(by_delta.allow_at(1.5, start + secs(1)));

        let mut by_time = DeltaRateLimiter::new(secs(10), 100.0);
        assert!(by_time.allow_at(1.0, start));
        assert!(by_time.allow_at(1.0, start + secs(10)));
    }

    #[test]
    fn test_rejection_keeps_baseline() {
        let start = Instant::now();
        let mut limiter = DeltaRateLimiter::new(secs(10), 100.0);

        assert!(limiter.allow_at(0.0, start));
        // Small steps never accumulate against a moving baseline
        assert!(!limiter.allow_at(60.0, start + secs(1)));
        assert!(limiter.allow_at(120.0, start + secs(2)));
        assert_eq!(limiter.last_value(), Some(120.0));
    }

    #[test]
    fn test_negative_delta() {
        let start = Instant::now();
        let mut limiter = DeltaRateLimiter::new(secs(10), 0.2);

        assert!(limiter.allow_at(16.0, start));
        assert!(!limiter.allow_at(15.9, start + secs(1)));
        assert!(limiter.allow_at(15.7, start + secs(2)));
    }
}
