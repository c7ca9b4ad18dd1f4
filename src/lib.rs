//! Cohort Relay Core
//!
//! Client core for Nostr-style relays with cohort-based access control.
//!
//! - [`relay`]: one relay link with the AUTH handshake
//! - [`subscription`]: durable subscriptions that recover from link loss
//! - [`authz`]: cached whitelist and cohort verification with a fail-safe
//!   fallback
//! - [`ratelimit`]: per-actor token buckets
//! - [`channel`]: channel read/post rules and the pre-write gate
//!
//! [`RelayCore`] wires them together from a [`CoreConfig`].

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod authz;
pub mod channel;
pub mod config;
pub mod ratelimit;
pub mod relay;
pub mod subscription;

pub use api::{CoreError, RelayCore};
pub use config::{ConfigError, CoreConfig};
