//! Token bucket arithmetic.

use std::time::{Duration, Instant};

/// A refillable quota.
///
/// The bucket holds up to `capacity` tokens and refills continuously at
/// `capacity / window` tokens per second. Time is passed in explicitly so
/// the arithmetic is deterministic under test.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    window_secs: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// A zero window is treated as one second.
    #[must_use]
    pub fn new(capacity: u32, window: Duration, now: Instant) -> Self {
        let window_secs = window.as_secs_f64();
        Self {
            capacity: f64::from(capacity),
            window_secs: if window_secs > 0.0 { window_secs } else { 1.0 },
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    /// Tokens added per second.
    #[must_use]
    pub fn refill_rate(&self) -> f64 {
        self.capacity / self.window_secs
    }

    /// Tokens currently available.
    #[must_use]
    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Adds the tokens earned since the last refill, capped at capacity.
    ///
    /// A `now` earlier than the last refill adds nothing.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed
            .mul_add(self.refill_rate(), self.tokens)
            .min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Takes `cost` tokens if available.
    ///
    /// Returns `Ok(remaining)` with the whole tokens left, or
    /// `Err(retry_after_secs)` with the wait until `cost` tokens exist.
    pub fn try_take(&mut self, cost: u32, now: Instant) -> Result<u32, u64> {
        self.refill(now);
        let cost = f64::from(cost);
        if self.tokens >= cost {
            self.tokens -= cost;
            return Ok(whole(self.tokens));
        }
        let deficit = cost - self.tokens;
        let wait = if self.capacity > 0.0 {
            (deficit * self.window_secs / self.capacity).ceil()
        } else {
            f64::INFINITY
        };
        Err(seconds(wait))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(tokens: f64) -> u32 {
    tokens.floor().clamp(0.0, f64::from(u32::MAX)) as u32
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn seconds(wait: f64) -> u64 {
    if wait.is_finite() {
        wait.max(0.0).min(u64::MAX as f64) as u64
    } else {
        u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full() {
        let bucket = TokenBucket::new(10, Duration::from_secs(60), Instant::now());
        assert!((bucket.tokens() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn drains_then_reports_wait() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(10, Duration::from_secs(60), now);

        for expected in (0..10).rev() {
            assert_eq!(bucket.try_take(1, now), Ok(expected));
        }
        assert_eq!(bucket.try_take(1, now), Err(6));
    }

    #[test]
    fn refill_is_capped() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(5, Duration::from_secs(10), now);
        let _ = bucket.try_take(5, now);

        bucket.refill(now + Duration::from_secs(3600));

        assert!((bucket.tokens() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_refill() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(10, Duration::from_secs(10), now);
        let _ = bucket.try_take(10, now);

        assert_eq!(bucket.try_take(1, now + Duration::from_secs(3)), Ok(2));
    }

    #[test]
    fn time_going_backwards_adds_nothing() {
        let now = Instant::now() + Duration::from_secs(100);
        let mut bucket = TokenBucket::new(2, Duration::from_secs(60), now);
        let _ = bucket.try_take(2, now);

        assert!(bucket.try_take(1, now - Duration::from_secs(50)).is_err());
    }

    #[test]
    fn zero_capacity_never_allows() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(0, Duration::from_secs(60), now);
        assert_eq!(bucket.try_take(1, now), Err(u64::MAX));
    }
}
