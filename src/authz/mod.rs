//! Actor authorization.
//!
//! Answers "who is this actor" for access decisions: whitelisted or not,
//! admin or not, and which cohorts they belong to. Answers come from a
//! remote [`Authority`] and are cached per actor.
//!
//! # Fail-Safe Behavior
//!
//! ```text
//! verify(id)
//!   ├─ malformed id ────────────▶ fallback { whitelisted: false, admin: false }
//!   ├─ cached and fresh ────────▶ entry (source: cache)
//!   ├─ authority answers ───────▶ entry (source: relay), cached for the TTL
//!   └─ authority unreachable ───▶ fallback from the admin allowlist
//! ```
//!
//! Fallback mode never grants access the allowlist cannot prove: only
//! allowlisted admins are whitelisted.

mod authority;
mod cache;
mod error;
mod types;

pub use authority::{Authority, HttpAuthority, WhitelistStatus};
pub use cache::{AuthorizationCache, DEFAULT_CACHE_TTL, DEFAULT_FALLBACK_TTL};
pub use error::{AuthorityError, Result};
pub use types::{is_valid_actor_id, AdminAllowlist, AuthSource, AuthorizationEntry, ADMIN_COHORT};

pub(crate) use types::short_id;
