//! Runtime configuration.
//!
//! [`CoreConfig`] can be built in code with `with_*` setters or read from
//! the environment:
//!
//! | Variable                     | Default                 |
//! |------------------------------|-------------------------|
//! | `RELAY_URL`                  | `wss://relay.damus.io`  |
//! | `ADMIN_PUBKEYS`              | empty                   |
//! | `AUTHORITY_URL`              | unset (fallback only)   |
//! | `AUTHORITY_TIMEOUT_SECS`     | 5                       |
//! | `AUTH_CACHE_TTL_SECS`        | 300                     |
//! | `RELAY_CONNECT_TIMEOUT_SECS` | 10                      |

use std::time::Duration;

use thiserror::Error;

use crate::authz::{AdminAllowlist, DEFAULT_CACHE_TTL};
use crate::relay::DEFAULT_CONNECT_TIMEOUT;

/// Relay used when none is configured.
pub const DEFAULT_RELAY_URL: &str = "wss://relay.damus.io";

/// Default timeout for whitelist lookups.
pub const DEFAULT_AUTHORITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for configuration loading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to an unusable value.
    #[error("Invalid {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Configuration for [`RelayCore`](crate::RelayCore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Default relay address.
    pub relay_url: String,
    /// Admins recognized when the authority is unreachable.
    pub admins: AdminAllowlist,
    /// Base URL of the whitelist authority. `None` runs in fallback mode.
    pub authority_url: Option<String>,
    /// Timeout for one whitelist lookup.
    pub authority_timeout: Duration,
    /// Lifetime of cached authority answers.
    pub auth_cache_ttl: Duration,
    /// Timeout for opening the relay transport.
    pub connect_timeout: Duration,
    /// Reject plaintext `ws://` relays.
    pub require_tls: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            admins: AdminAllowlist::default(),
            authority_url: None,
            authority_timeout: DEFAULT_AUTHORITY_TIMEOUT,
            auth_cache_ttl: DEFAULT_CACHE_TTL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            require_tls: false,
        }
    }
}

impl CoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            get(key).map_or(Ok(default), |raw| {
                raw.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ConfigError::Invalid {
                        key: key.to_string(),
                        reason: format!("{raw:?} is not a number of seconds: {e}"),
                    })
            })
        };

        let defaults = Self::default();
        Ok(Self {
            relay_url: get("RELAY_URL").unwrap_or(defaults.relay_url),
            admins: get("ADMIN_PUBKEYS")
                .map(|list| AdminAllowlist::parse(&list))
                .unwrap_or_default(),
            authority_url: get("AUTHORITY_URL"),
            authority_timeout: secs("AUTHORITY_TIMEOUT_SECS", defaults.authority_timeout)?,
            auth_cache_ttl: secs("AUTH_CACHE_TTL_SECS", defaults.auth_cache_ttl)?,
            connect_timeout: secs("RELAY_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            require_tls: defaults.require_tls,
        })
    }

    /// Sets the default relay address.
    #[must_use]
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    /// Sets the admin allowlist.
    #[must_use]
    pub fn with_admins(mut self, admins: AdminAllowlist) -> Self {
        self.admins = admins;
        self
    }

    /// Sets the authority base URL.
    #[must_use]
    pub fn with_authority_url(mut self, url: impl Into<String>) -> Self {
        self.authority_url = Some(url.into());
        self
    }

    /// Sets the authority timeout.
    #[must_use]
    pub const fn with_authority_timeout(mut self, timeout: Duration) -> Self {
        self.authority_timeout = timeout;
        self
    }

    /// Sets the cache TTL for authority answers.
    #[must_use]
    pub const fn with_auth_cache_ttl(mut self, ttl: Duration) -> Self {
        self.auth_cache_ttl = ttl;
        self
    }

    /// Sets the relay connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Requires `wss://` relays.
    #[must_use]
    pub const fn with_require_tls(mut self, require: bool) -> Self {
        self.require_tls = require;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const ADMIN: &str = "aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11aa11";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = CoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.relay_url, "wss://relay.damus.io");
        assert_eq!(config.auth_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn reads_all_variables() {
        let config = CoreConfig::from_lookup(lookup(&[
            ("RELAY_URL", "wss://relay.example.com"),
            ("ADMIN_PUBKEYS", ADMIN),
            ("AUTHORITY_URL", "https://auth.example.com"),
            ("AUTHORITY_TIMEOUT_SECS", "2"),
            ("AUTH_CACHE_TTL_SECS", "60"),
            ("RELAY_CONNECT_TIMEOUT_SECS", " 3 "),
        ]))
        .unwrap();

        assert_eq!(config.relay_url, "wss://relay.example.com");
        assert!(config.admins.contains(ADMIN));
        assert_eq!(
            config.authority_url.as_deref(),
            Some("https://auth.example.com")
        );
        assert_eq!(config.authority_timeout, Duration::from_secs(2));
        assert_eq!(config.auth_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn empty_values_are_unset() {
        let config =
            CoreConfig::from_lookup(lookup(&[("RELAY_URL", ""), ("AUTHORITY_URL", "  ")])).unwrap();
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert!(config.authority_url.is_none());
    }

    #[test]
    fn bad_number_is_invalid() {
        let err = CoreConfig::from_lookup(lookup(&[("AUTH_CACHE_TTL_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "AUTH_CACHE_TTL_SECS"));
        assert!(err.to_string().starts_with("Invalid AUTH_CACHE_TTL_SECS"));
    }

    #[test]
    fn builder_setters() {
        let config = CoreConfig::new()
            .with_relay_url("wss://other.example.com")
            .with_admins(AdminAllowlist::parse(ADMIN))
            .with_authority_url("https://auth.example.com")
            .with_authority_timeout(Duration::from_secs(1))
            .with_auth_cache_ttl(Duration::from_secs(10))
            .with_connect_timeout(Duration::from_secs(4))
            .with_require_tls(true);

        assert_eq!(config.relay_url, "wss://other.example.com");
        assert_eq!(config.admins.len(), 1);
        assert!(config.require_tls);
        assert_eq!(config.connect_timeout, Duration::from_secs(4));
    }
}
