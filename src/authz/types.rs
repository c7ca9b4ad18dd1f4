//! Authorization data types.

use std::collections::BTreeSet;
use std::fmt;

use subtle::ConstantTimeEq;

/// Cohort granted to fallback entries of allowlisted admins.
pub const ADMIN_COHORT: &str = "admin";

/// Returns whether `actor_id` is a 64-character hex public key.
#[must_use]
pub fn is_valid_actor_id(actor_id: &str) -> bool {
    actor_id.len() == 64 && actor_id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Shortened actor id for log fields.
pub(crate) fn short_id(actor_id: &str) -> &str {
    actor_id.get(..8).unwrap_or(actor_id)
}

/// Where an authorization entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthSource {
    /// Fresh answer from the authority.
    Relay,
    /// Served from the cache.
    Cache,
    /// Built from local configuration because the authority was unusable.
    Fallback,
}

impl AuthSource {
    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Relay => "relay",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verified standing of one actor.
///
/// Entries are never mutated after they are cached; a refresh replaces the
/// whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationEntry {
    /// Actor public key (hex).
    pub actor_id: String,
    /// Whether the actor may use the system at all.
    pub is_whitelisted: bool,
    /// Whether the actor has administrative rights.
    pub is_admin: bool,
    /// Cohorts the actor belongs to.
    pub cohorts: BTreeSet<String>,
    /// When the standing was verified (Unix milliseconds).
    pub verified_at: i64,
    /// Where this entry came from.
    pub source: AuthSource,
}

impl AuthorizationEntry {
    /// Builds a fallback entry from the local admin allowlist.
    ///
    /// Fallback never grants more than the allowlist proves: admins are
    /// whitelisted and in the `admin` cohort, everyone else gets nothing.
    #[must_use]
    pub fn fallback(actor_id: &str, admins: &AdminAllowlist) -> Self {
        let is_admin = is_valid_actor_id(actor_id) && admins.contains(actor_id);
        let cohorts = if is_admin {
            BTreeSet::from([ADMIN_COHORT.to_string()])
        } else {
            BTreeSet::new()
        };
        Self {
            actor_id: actor_id.to_string(),
            is_whitelisted: is_admin,
            is_admin,
            cohorts,
            verified_at: chrono::Utc::now().timestamp_millis(),
            source: AuthSource::Fallback,
        }
    }

    /// Returns whether the actor is in `cohort`.
    #[must_use]
    pub fn has_cohort(&self, cohort: &str) -> bool {
        self.cohorts.contains(cohort)
    }

    /// Returns a copy marked as coming from `source`.
    #[must_use]
    pub fn with_source(mut self, source: AuthSource) -> Self {
        self.source = source;
        self
    }
}

/// Public keys with administrative rights when the authority is down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAllowlist {
    keys: Vec<String>,
}

impl AdminAllowlist {
    /// Parses a comma-separated list of hex public keys.
    ///
    /// Entries are trimmed and lowercased; malformed entries are skipped.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        list.split(',').collect()
    }

    /// Returns whether `actor_id` is on the list.
    ///
    /// Compares every entry in constant time.
    #[must_use]
    pub fn contains(&self, actor_id: &str) -> bool {
        let candidate = actor_id.to_ascii_lowercase();
        self.keys.iter().fold(false, |found, key| {
            found | bool::from(key.as_bytes().ct_eq(candidate.as_bytes()))
        })
    }

    /// Number of keys on the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AdminAllowlist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut keys: Vec<String> = iter
            .into_iter()
            .map(|key| key.as_ref().trim().to_ascii_lowercase())
            .filter(|key| is_valid_actor_id(key))
            .collect();
        keys.sort();
        keys.dedup();
        Self { keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: &str = "aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11";
    const MEMBER: &str = "bb22bb22bb22bb22bb22bb22bb22bb22bb22bb22bb22bb22bb22bb22bb22bb22";

    #[test]
    fn actor_id_validation() {
        assert!(is_valid_actor_id(ADMIN));
        assert!(is_valid_actor_id(&ADMIN.to_uppercase()));
        assert!(!is_valid_actor_id("bad-id"));
        assert!(!is_valid_actor_id(&ADMIN[..63]));
        assert!(!is_valid_actor_id(&format!("{}zz", &ADMIN[..62])));
    }

    #[test]
    fn allowlist_parsing_trims_and_lowercases() {
        let list = AdminAllowlist::parse(&format!(" {} ,, not-a-key,{MEMBER}", ADMIN.to_uppercase()));

        assert_eq!(list.len(), 2);
        assert!(list.contains(ADMIN));
        assert!(list.contains(MEMBER));
        assert!(!list.contains("not-a-key"));
    }

    #[test]
    fn empty_allowlist() {
        let list = AdminAllowlist::parse("");
        assert!(list.is_empty());
        assert!(!list.contains(ADMIN));
    }

    #[test]
    fn fallback_for_admin() {
        let list = AdminAllowlist::parse(ADMIN);
        let entry = AuthorizationEntry::fallback(ADMIN, &list);

        assert!(entry.is_admin);
        assert!(entry.is_whitelisted);
        assert!(entry.has_cohort(ADMIN_COHORT));
        assert_eq!(entry.source, AuthSource::Fallback);
    }

    #[test]
    fn fallback_for_non_admin_grants_nothing() {
        let list = AdminAllowlist::parse(ADMIN);
        let entry = AuthorizationEntry::fallback(MEMBER, &list);

        assert!(!entry.is_admin);
        assert!(!entry.is_whitelisted);
        assert!(entry.cohorts.is_empty());
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id(ADMIN), "aa11aa11");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn source_strings() {
        assert_eq!(AuthSource::Relay.as_str(), "relay");
        assert_eq!(AuthSource::Cache.to_string(), "cache");
        assert_eq!(AuthSource::Fallback.as_str(), "fallback");
    }
}
