//! Durable relay subscriptions.
//!
//! A relay `REQ` lives only as long as the link it was sent on. This module
//! wraps it in a subscription that has an identity, observable metadata, and
//! a lifecycle that survives link loss:
//!
//! - **Routing**: `EVENT`/`EOSE`/`CLOSED` frames reach the right handlers
//!   in arrival order
//! - **Recovery**: after link loss a subscription retries with exponential
//!   backoff (`delay × 2^attempt`) and gives up with `error` once the
//!   attempt budget is spent
//! - **Fast path**: when the link comes back on its own, reconnecting
//!   subscriptions retry immediately instead of waiting out their timer
//!
//! # Architecture
//!
//! ```text
//! SubscriptionHandle ─┐
//!                     ▼
//! SubscriptionManager ── dispatcher task ◀── RelayMessage broadcast
//!     │                        ▲
//!     │                        └──────────── ConnectionStatus watch
//!     ▼
//! ConnectionManager::ensure_ready() + send(REQ / CLOSE)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cohort_relay_core::subscription::{SubscriptionHandlers, SubscriptionOptions};
//!
//! let handle = subscriptions
//!     .create(filters, SubscriptionHandlers::new(), SubscriptionOptions::new())
//!     .await?;
//! handle.pause();
//! handle.resume().await;
//! handle.close();
//! ```

mod error;
mod manager;
mod retry;
mod types;

pub use error::{Result, SubscriptionError};
pub use manager::{SubscriptionHandle, SubscriptionManager};
pub use retry::RetryPolicy;
pub use types::{
    StateSummary, SubscriptionDescriptor, SubscriptionHandlers, SubscriptionOptions,
    SubscriptionState, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};
