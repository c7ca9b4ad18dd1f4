//! Per-actor rate limiting.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::bucket::TokenBucket;
use crate::authz::short_id;

/// Kinds of rate-limited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Posting a channel message.
    Message,
    /// Creating a channel.
    ChannelCreate,
    /// Sending a direct message.
    DirectMessage,
    /// Any other API call.
    ApiCall,
    /// Logging in.
    Login,
}

impl ActionType {
    /// Every action type.
    pub const ALL: [Self; 5] = [
        Self::Message,
        Self::ChannelCreate,
        Self::DirectMessage,
        Self::ApiCall,
        Self::Login,
    ];

    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ChannelCreate => "channel-create",
            Self::DirectMessage => "dm",
            Self::ApiCall => "api",
            Self::Login => "login",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }

    /// The built-in quota for this action.
    #[must_use]
    pub const fn default_policy(&self) -> RateLimitPolicy {
        match self {
            Self::Message => RateLimitPolicy::new(10, Duration::from_secs(60)),
            Self::ChannelCreate => RateLimitPolicy::new(2, Duration::from_secs(3600)),
            Self::DirectMessage => RateLimitPolicy::new(20, Duration::from_secs(60)),
            Self::ApiCall => RateLimitPolicy::new(100, Duration::from_secs(60)),
            Self::Login => RateLimitPolicy::new(5, Duration::from_secs(900)),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota for one action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Burst size.
    pub capacity: u32,
    /// Time to refill from empty to full.
    pub window: Duration,
    /// Tokens consumed per check.
    pub tokens_per_action: u32,
}

impl RateLimitPolicy {
    /// Creates a policy costing one token per action.
    #[must_use]
    pub const fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            tokens_per_action: 1,
        }
    }

    /// Sets the cost of one action.
    #[must_use]
    pub const fn with_cost(mut self, tokens: u32) -> Self {
        self.tokens_per_action = tokens;
        self
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Whole tokens left after this check.
    pub remaining: u32,
    /// Seconds until the action would be allowed; set only when denied.
    pub retry_after_secs: Option<u64>,
}

/// Token-bucket rate limiter keyed by action and actor.
///
/// Buckets are created full on first use. Each bucket is updated under a
/// single lock, so concurrent checks for one key never over-spend.
///
/// # Example
///
/// ```rust
/// use cohort_relay_core::ratelimit::{ActionType, RateLimiter};
///
/// let limiter = RateLimiter::new();
/// let decision = limiter.check(ActionType::Message, "alice");
/// assert!(decision.allowed);
/// assert_eq!(decision.remaining, 9);
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    policies: HashMap<ActionType, RateLimitPolicy>,
    buckets: Mutex<HashMap<(ActionType, String), TokenBucket>>,
}

impl RateLimiter {
    /// Creates a limiter with the default policies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: ActionType::ALL
                .into_iter()
                .map(|action| (action, action.default_policy()))
                .collect(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the policy for `action`.
    #[must_use]
    pub fn with_policy(mut self, action: ActionType, policy: RateLimitPolicy) -> Self {
        self.policies.insert(action, policy);
        self
    }

    /// The policy in force for `action`.
    #[must_use]
    pub fn policy(&self, action: ActionType) -> RateLimitPolicy {
        self.policies
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.default_policy())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(ActionType, String), TokenBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spends one action's worth of tokens for `actor` if available.
    pub fn check(&self, action: ActionType, actor: &str) -> RateLimitDecision {
        self.check_at(action, actor, Instant::now())
    }

    /// Like [`check`](Self::check) at an explicit point in time.
    pub fn check_at(&self, action: ActionType, actor: &str, now: Instant) -> RateLimitDecision {
        let policy = self.policy(action);
        let mut buckets = self.lock();
        let bucket = buckets
            .entry((action, actor.to_string()))
            .or_insert_with(|| TokenBucket::new(policy.capacity, policy.window, now));

        match bucket.try_take(policy.tokens_per_action, now) {
            Ok(remaining) => RateLimitDecision {
                allowed: true,
                remaining,
                retry_after_secs: None,
            },
            Err(retry_after) => {
                debug!(
                    action = %action,
                    actor = short_id(actor),
                    retry_after_secs = retry_after,
                    "rate limit exceeded"
                );
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after_secs: Some(retry_after),
                }
            }
        }
    }

    /// Forgets buckets for `action`: one actor's, or every actor's.
    pub fn reset(&self, action: ActionType, actor: Option<&str>) {
        let mut buckets = self.lock();
        match actor {
            Some(actor) => {
                buckets.remove(&(action, actor.to_string()));
            }
            None => buckets.retain(|(kind, _), _| *kind != action),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_strings_roundtrip() {
        for action in ActionType::ALL {
            assert_eq!(ActionType::parse(action.as_str()), Some(action));
        }
        assert_eq!(ActionType::parse("unknown"), None);
    }

    #[test]
    fn default_policies() {
        assert_eq!(ActionType::Message.default_policy().capacity, 10);
        assert_eq!(
            ActionType::ChannelCreate.default_policy().window,
            Duration::from_secs(3600)
        );
        assert_eq!(ActionType::DirectMessage.default_policy().capacity, 20);
        assert_eq!(ActionType::ApiCall.default_policy().capacity, 100);
        assert_eq!(
            ActionType::Login.default_policy(),
            RateLimitPolicy::new(5, Duration::from_secs(900))
        );
    }

    #[test]
    fn eleventh_message_is_denied() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..10 {
            assert!(limiter.check_at(ActionType::Message, "u1", now).allowed);
        }
        let denied = limiter.check_at(ActionType::Message, "u1", now);

        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after_secs, Some(6));
    }

    #[test]
    fn actors_and_actions_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..2 {
            limiter.check_at(ActionType::ChannelCreate, "u1", now);
        }

        assert!(!limiter.check_at(ActionType::ChannelCreate, "u1", now).allowed);
        assert!(limiter.check_at(ActionType::ChannelCreate, "u2", now).allowed);
        assert!(limiter.check_at(ActionType::Message, "u1", now).allowed);
    }

    #[test]
    fn reset_single_actor() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at(ActionType::Login, "u1", now);
            limiter.check_at(ActionType::Login, "u2", now);
        }

        limiter.reset(ActionType::Login, Some("u1"));

        assert!(limiter.check_at(ActionType::Login, "u1", now).allowed);
        assert!(!limiter.check_at(ActionType::Login, "u2", now).allowed);
    }

    #[test]
    fn reset_all_actors() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at(ActionType::Login, "u1", now);
            limiter.check_at(ActionType::Login, "u2", now);
        }

        limiter.reset(ActionType::Login, None);

        assert!(limiter.check_at(ActionType::Login, "u1", now).allowed);
        assert!(limiter.check_at(ActionType::Login, "u2", now).allowed);
    }

    #[test]
    fn custom_policy_and_cost() {
        let limiter = RateLimiter::new().with_policy(
            ActionType::ApiCall,
            RateLimitPolicy::new(4, Duration::from_secs(4)).with_cost(2),
        );
        let now = Instant::now();

        assert_eq!(limiter.check_at(ActionType::ApiCall, "u1", now).remaining, 2);
        assert_eq!(limiter.check_at(ActionType::ApiCall, "u1", now).remaining, 0);
        let denied = limiter.check_at(ActionType::ApiCall, "u1", now);
        assert_eq!(denied.retry_after_secs, Some(2));
    }
}
