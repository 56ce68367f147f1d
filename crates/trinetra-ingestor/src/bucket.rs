//! Burst suppressor token bucket.

use std::time::Instant;

/// Token bucket with capacity 5 refilled at the camera's target rate.
///
/// Sampler survivors still pass through here, so a scene change cannot
/// shove a burst of near-identical frames at the GPU.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_s: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_s: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_s,
            last_refill: now,
        }
    }

    /// Take one token if available. `now` is passed in so callers and tests
    /// control time the same way.
    pub fn try_take(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_s).min(self.capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn burst_limited_to_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(5.0, 15.0, now);
        let taken = (0..10).filter(|_| bucket.try_take(now)).count();
        assert_eq!(taken, 5);
    }

    #[test]
    fn refills_at_target_rate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(5.0, 10.0, start);
        for _ in 0..5 {
            assert!(bucket.try_take(start));
        }
        assert!(!bucket.try_take(start));

        // 100 ms at 10 tokens/s refills exactly one token.
        let later = start + Duration::from_millis(100);
        assert!(bucket.try_take(later));
        assert!(!bucket.try_take(later));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(5.0, 100.0, start);
        let later = start + Duration::from_secs(60);
        let taken = (0..10).filter(|_| bucket.try_take(later)).count();
        assert_eq!(taken, 5);
    }
}
