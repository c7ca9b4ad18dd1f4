//! Pre-write checks combining authorization and rate limits.

use std::sync::Arc;

use tracing::info;

use super::authorizer::can_post;
use super::error::{AccessError, Result};
use super::types::ChannelAccess;
use crate::authz::{is_valid_actor_id, short_id, AuthorizationCache, AuthorizationEntry};
use crate::ratelimit::{ActionType, RateLimitDecision, RateLimiter};

/// Decides whether an actor may write before anything is sent.
///
/// Standing is checked first; a quota token is only spent on writes that
/// would otherwise be allowed.
#[derive(Debug, Clone)]
pub struct WriteGate {
    cache: Arc<AuthorizationCache>,
    limiter: Arc<RateLimiter>,
}

impl WriteGate {
    /// Creates a gate over shared cache and limiter instances.
    #[must_use]
    pub const fn new(cache: Arc<AuthorizationCache>, limiter: Arc<RateLimiter>) -> Self {
        Self { cache, limiter }
    }

    /// Checks a message post to `channel`.
    ///
    /// # Errors
    ///
    /// - [`AccessError::Validation`] if `actor_id` is not a hex public key
    /// - [`AccessError::Denied`] if the actor is not whitelisted or may not
    ///   post in the channel
    /// - [`AccessError::RateLimited`] if the actor is over its message quota
    pub async fn authorize_post(
        &self,
        actor_id: &str,
        channel: &ChannelAccess,
    ) -> Result<RateLimitDecision> {
        let entry = self.standing(actor_id).await?;
        if !can_post(&entry, channel) {
            info!(actor = short_id(actor_id), channel = %channel.id, "post denied");
            return Err(AccessError::Denied {
                reason: format!("not allowed to post in channel {}", channel.id),
            });
        }
        self.spend(ActionType::Message, actor_id)
    }

    /// Checks creation of a new channel.
    ///
    /// # Errors
    ///
    /// - [`AccessError::Validation`] if `actor_id` is not a hex public key
    /// - [`AccessError::Denied`] if the actor is not whitelisted
    /// - [`AccessError::RateLimited`] if the actor is over its quota
    pub async fn authorize_channel_create(&self, actor_id: &str) -> Result<RateLimitDecision> {
        self.standing(actor_id).await?;
        self.spend(ActionType::ChannelCreate, actor_id)
    }

    async fn standing(&self, actor_id: &str) -> Result<AuthorizationEntry> {
        if !is_valid_actor_id(actor_id) {
            return Err(AccessError::Validation(
                "actor id must be 64 hex characters".to_string(),
            ));
        }
        let entry = self.cache.verify(actor_id).await;
        if !(entry.is_whitelisted || entry.is_admin) {
            info!(actor = short_id(actor_id), source = %entry.source, "actor not whitelisted");
            return Err(AccessError::Denied {
                reason: "actor is not whitelisted".to_string(),
            });
        }
        Ok(entry)
    }

    fn spend(&self, action: ActionType, actor_id: &str) -> Result<RateLimitDecision> {
        let decision = self.limiter.check(action, &actor_id.to_ascii_lowercase());
        match decision.retry_after_secs {
            Some(retry_after_secs) if !decision.allowed => Err(AccessError::RateLimited {
                action,
                retry_after_secs,
            }),
            _ => Ok(decision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::AdminAllowlist;
    use crate::channel::{AccessType, Visibility};

    const ADMIN: &str = "ff66ff66ff66ff66ff66ff66ff66ff66ff66ff66ff66ff66ff66ff66ff66ff66";
    const STRANGER: &str = "1177117711771177117711771177117711771177117711771177117711771177";

    fn gate() -> WriteGate {
        let cache = AuthorizationCache::new(None, AdminAllowlist::parse(ADMIN));
        WriteGate::new(Arc::new(cache), Arc::new(RateLimiter::new()))
    }

    fn gated_channel() -> ChannelAccess {
        ChannelAccess::new("chan", STRANGER)
            .with_visibility(Visibility::Cohort)
            .with_access_type(AccessType::Gated)
            .with_cohorts(["staff"])
    }

    #[tokio::test]
    async fn malformed_actor_is_a_validation_error() {
        let result = gate().authorize_post("bad-id", &gated_channel()).await;
        assert!(matches!(result, Err(AccessError::Validation(_))));
    }

    #[tokio::test]
    async fn non_whitelisted_actor_is_denied() {
        let result = gate().authorize_channel_create(STRANGER).await;
        assert!(matches!(result, Err(AccessError::Denied { .. })));
    }

    #[tokio::test]
    async fn admin_channel_creation_is_rate_limited() {
        let gate = gate();

        assert!(gate.authorize_channel_create(ADMIN).await.is_ok());
        assert!(gate.authorize_channel_create(ADMIN).await.is_ok());
        let third = gate.authorize_channel_create(ADMIN).await;

        assert!(matches!(
            third,
            Err(AccessError::RateLimited {
                action: ActionType::ChannelCreate,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn admin_may_post_anywhere() {
        let decision = gate()
            .authorize_post(ADMIN, &gated_channel())
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
    }
}
