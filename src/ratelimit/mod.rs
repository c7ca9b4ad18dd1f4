//! Token-bucket rate limiting.
//!
//! Every `(action, actor)` pair owns a bucket that starts full and refills
//! at `capacity / window` tokens per second:
//!
//! | Action           | Capacity | Window |
//! |------------------|----------|--------|
//! | `message`        | 10       | 60s    |
//! | `channel-create` | 2        | 1h     |
//! | `dm`             | 20       | 60s    |
//! | `api`            | 100      | 60s    |
//! | `login`          | 5        | 15m    |
//!
//! A denied check reports how many seconds until the action would pass.

mod bucket;
mod limiter;

pub use bucket::TokenBucket;
pub use limiter::{ActionType, RateLimitDecision, RateLimitPolicy, RateLimiter};
