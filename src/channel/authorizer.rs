//! Channel read and post decisions.
//!
//! Pure functions over an actor's verified standing and a channel's access
//! descriptor. No I/O; callers obtain the standing from
//! [`AuthorizationCache`](crate::authz::AuthorizationCache).

use std::collections::BTreeSet;

use super::types::{AccessType, ChannelAccess, Visibility};
use crate::authz::AuthorizationEntry;

fn shares_cohort(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    !a.is_disjoint(b)
}

fn is_creator(actor: &AuthorizationEntry, channel: &ChannelAccess) -> bool {
    actor.actor_id.eq_ignore_ascii_case(&channel.creator_id)
}

/// Returns whether `actor` may read `channel`.
///
/// Admins and the creator always can. Public channels and channels without
/// cohorts are readable by everyone; otherwise the actor needs a cohort in
/// common with the channel.
#[must_use]
pub fn can_access(actor: &AuthorizationEntry, channel: &ChannelAccess) -> bool {
    if actor.is_admin || is_creator(actor, channel) {
        return true;
    }
    if channel.visibility == Visibility::Public || channel.cohorts.is_empty() {
        return true;
    }
    shares_cohort(&actor.cohorts, &channel.cohorts)
}

/// Returns whether `actor` may post to `channel`.
///
/// Admins and the creator always can. Everyone else must be able to read
/// the channel, and a gated channel with cohorts also needs a shared
/// cohort.
#[must_use]
pub fn can_post(actor: &AuthorizationEntry, channel: &ChannelAccess) -> bool {
    if actor.is_admin || is_creator(actor, channel) {
        return true;
    }
    if !can_access(actor, channel) {
        return false;
    }
    match channel.access_type {
        AccessType::Open => true,
        AccessType::Gated => {
            channel.cohorts.is_empty() || shares_cohort(&actor.cohorts, &channel.cohorts)
        }
    }
}

/// Method-style access to [`can_access`] and [`can_post`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelAuthorizer;

#[allow(clippy::unused_self)]
impl ChannelAuthorizer {
    /// See [`can_access`].
    #[must_use]
    pub fn can_access(&self, actor: &AuthorizationEntry, channel: &ChannelAccess) -> bool {
        can_access(actor, channel)
    }

    /// See [`can_post`].
    #[must_use]
    pub fn can_post(&self, actor: &AuthorizationEntry, channel: &ChannelAccess) -> bool {
        can_post(actor, channel)
    }
}
