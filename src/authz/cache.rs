//! Cached, fail-safe actor verification.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::authority::Authority;
use super::types::{is_valid_actor_id, short_id, AdminAllowlist, AuthSource, AuthorizationEntry};

/// Default lifetime of an authority answer.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default lifetime of a fallback entry.
pub const DEFAULT_FALLBACK_TTL: Duration = Duration::from_secs(30);

struct Cached {
    entry: AuthorizationEntry,
    expires_at: Instant,
}

/// Cache of actor standing in front of an [`Authority`].
///
/// `verify` never fails. Malformed ids are denied without a network call,
/// and an unreachable authority degrades to the [`AdminAllowlist`].
///
/// # Example
///
/// ```rust,ignore
/// let cache = AuthorizationCache::new(Some(authority), AdminAllowlist::parse(&admins));
/// let entry = cache.verify(&pubkey_hex).await;
/// if entry.is_whitelisted { /* ... */ }
/// ```
pub struct AuthorizationCache {
    authority: Option<Arc<dyn Authority>>,
    admins: AdminAllowlist,
    ttl: Duration,
    fallback_ttl: Duration,
    entries: RwLock<HashMap<String, Cached>>,
}

impl AuthorizationCache {
    /// Creates a cache. Without an authority every answer is a fallback.
    #[must_use]
    pub fn new(authority: Option<Arc<dyn Authority>>, admins: AdminAllowlist) -> Self {
        Self {
            authority,
            admins,
            ttl: DEFAULT_CACHE_TTL,
            fallback_ttl: DEFAULT_FALLBACK_TTL,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the lifetime of authority answers.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the lifetime of fallback entries.
    #[must_use]
    pub const fn with_fallback_ttl(mut self, ttl: Duration) -> Self {
        self.fallback_ttl = ttl;
        self
    }

    /// The admin allowlist used in fallback mode.
    #[must_use]
    pub const fn admins(&self) -> &AdminAllowlist {
        &self.admins
    }

    /// Returns the standing of `actor_id`.
    ///
    /// 1. malformed id: denied fallback entry, nothing cached
    /// 2. live cache entry: returned with source `cache`
    /// 3. authority answer: cached, returned with source `relay`
    /// 4. authority failure: fallback entry, cached briefly
    pub async fn verify(&self, actor_id: &str) -> AuthorizationEntry {
        if !is_valid_actor_id(actor_id) {
            debug!(actor = short_id(actor_id), "malformed actor id, denying");
            return AuthorizationEntry::fallback(actor_id, &AdminAllowlist::default());
        }
        let key = actor_id.to_ascii_lowercase();

        if let Some(cached) = self.entries.read().await.get(&key) {
            if cached.expires_at > Instant::now() {
                return cached.entry.clone().with_source(AuthSource::Cache);
            }
        }

        let (entry, ttl) = self.fetch(&key).await;
        self.entries.write().await.insert(
            key,
            Cached {
                entry: entry.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        entry
    }

    async fn fetch(&self, actor_id: &str) -> (AuthorizationEntry, Duration) {
        let Some(authority) = &self.authority else {
            return (
                AuthorizationEntry::fallback(actor_id, &self.admins),
                self.fallback_ttl,
            );
        };

        match authority.whitelist_status(actor_id).await {
            Ok(status) => {
                debug!(
                    actor = short_id(actor_id),
                    whitelisted = status.is_whitelisted,
                    admin = status.is_admin,
                    "verified actor"
                );
                let entry = AuthorizationEntry {
                    actor_id: actor_id.to_string(),
                    is_whitelisted: status.is_whitelisted,
                    is_admin: status.is_admin,
                    cohorts: status
                        .cohorts
                        .unwrap_or_default()
                        .into_iter()
                        .collect(),
                    verified_at: status
                        .verified_at
                        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
                    source: AuthSource::Relay,
                };
                (entry, self.ttl)
            }
            Err(e) => {
                warn!(actor = short_id(actor_id), error = %e, "authority unavailable, using fallback");
                (
                    AuthorizationEntry::fallback(actor_id, &self.admins),
                    self.fallback_ttl,
                )
            }
        }
    }

    /// Drops the cached entry for `actor_id`.
    pub async fn evict(&self, actor_id: &str) {
        self.entries
            .write()
            .await
            .remove(&actor_id.to_ascii_lowercase());
    }

    /// Drops every cached entry.
    pub async fn evict_all(&self) {
        self.entries.write().await.clear();
    }

    /// Returns whether `actor_id` has administrative rights.
    pub async fn is_admin(&self, actor_id: &str) -> bool {
        self.verify(actor_id).await.is_admin
    }

    /// Returns whether `actor_id` is in `cohort`.
    pub async fn has_cohort(&self, actor_id: &str, cohort: &str) -> bool {
        self.verify(actor_id).await.has_cohort(cohort)
    }

    /// Returns the cohorts of `actor_id`.
    pub async fn cohorts(&self, actor_id: &str) -> BTreeSet<String> {
        self.verify(actor_id).await.cohorts
    }
}

impl std::fmt::Debug for AuthorizationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCache")
            .field("has_authority", &self.authority.is_some())
            .field("admins", &self.admins.len())
            .field("ttl", &self.ttl)
            .field("fallback_ttl", &self.fallback_ttl)
            .finish_non_exhaustive()
    }
}
