//! Exponential backoff for subscription recovery.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry policy owned by one subscription.
///
/// Holds the attempt counter, computes `base × 2^attempt` delays, and owns
/// the cancel token of the pending retry timer. Arming a new timer always
/// cancels the previous one, so at most one retry is pending.
#[derive(Debug)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_attempts: u32,
    attempts: u32,
    pending: Option<CancellationToken>,
}

impl RetryPolicy {
    /// Creates a policy with no attempts made.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            attempts: 0,
            pending: None,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns whether the retry budget is spent.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Consumes one attempt and returns its delay, or `None` when exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// Cancels any pending timer and returns a token for a new one.
    pub fn arm(&mut self) -> CancellationToken {
        self.cancel();
        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        token
    }

    /// Cancels the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    /// Cancels the pending timer and clears the attempt counter.
    pub fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
    }
}
