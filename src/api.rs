//! Entry point owning one instance of every component.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::authz::{Authority, AuthorityError, AuthorizationCache, HttpAuthority};
use crate::channel::WriteGate;
use crate::config::{ConfigError, CoreConfig};
use crate::ratelimit::RateLimiter;
use crate::relay::{
    AuthSigner, ConnectionManager, ConnectionOptions, Connector, RelayError, WebSocketConnector,
};
use crate::subscription::SubscriptionManager;

/// Error type for building or driving a [`RelayCore`].
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The authority client could not be built.
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// The relay link failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Relay client core.
///
/// Wires the connection, subscription, authorization and rate-limit
/// components together. Create one per process and hand out references;
/// nothing in the crate is a global.
///
/// # Example
///
/// ```rust,ignore
/// use cohort_relay_core::{CoreConfig, RelayCore};
///
/// let core = RelayCore::new(CoreConfig::from_env()?)?;
/// core.connect(Some(Arc::new(keys))).await?;
/// let entry = core.authorization().verify(&pubkey_hex).await;
/// ```
pub struct RelayCore {
    config: CoreConfig,
    connection: Arc<ConnectionManager>,
    subscriptions: SubscriptionManager,
    authorization: Arc<AuthorizationCache>,
    rate_limiter: Arc<RateLimiter>,
    write_gate: WriteGate,
}

impl RelayCore {
    /// Builds the core with the WebSocket transport and, if configured, the
    /// HTTP authority.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Authority`] if the HTTP client cannot be built.
    pub fn new(config: CoreConfig) -> Result<Self, CoreError> {
        let authority = match &config.authority_url {
            Some(url) => Some(Arc::new(HttpAuthority::new(url, config.authority_timeout)?)
                as Arc<dyn Authority>),
            None => None,
        };
        Ok(Self::with_parts(config, Arc::new(WebSocketConnector), authority))
    }

    /// Builds the core from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for unusable variables, or any error
    /// of [`RelayCore::new`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::new(CoreConfig::from_env()?)
    }

    /// Builds the core with an explicit transport and authority.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_parts(
        config: CoreConfig,
        connector: Arc<dyn Connector>,
        authority: Option<Arc<dyn Authority>>,
    ) -> Self {
        if authority.is_none() {
            info!("no authority configured, authorization runs in fallback mode");
        }
        let connection = Arc::new(ConnectionManager::with_connector(
            connector,
            ConnectionOptions {
                connect_timeout: config.connect_timeout,
                require_tls: config.require_tls,
                ..ConnectionOptions::default()
            },
        ));
        let subscriptions = SubscriptionManager::new(Arc::clone(&connection));
        let authorization = Arc::new(
            AuthorizationCache::new(authority, config.admins.clone())
                .with_ttl(config.auth_cache_ttl),
        );
        let rate_limiter = Arc::new(RateLimiter::new());
        let write_gate = WriteGate::new(Arc::clone(&authorization), Arc::clone(&rate_limiter));

        Self {
            config,
            connection,
            subscriptions,
            authorization,
            rate_limiter,
            write_gate,
        }
    }

    /// Connects to the configured relay.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Relay`] if the relay address is invalid or
    /// unreachable.
    pub async fn connect(&self, signer: Option<Arc<dyn AuthSigner>>) -> Result<(), CoreError> {
        self.connection.connect(&self.config.relay_url, signer).await?;
        Ok(())
    }

    /// Closes all subscriptions and the relay link.
    pub fn shutdown(&self) {
        let closed = self.subscriptions.close_all();
        self.connection.disconnect();
        info!(closed, "relay core shut down");
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The relay connection.
    #[must_use]
    pub const fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// The subscription manager.
    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// The authorization cache.
    #[must_use]
    pub const fn authorization(&self) -> &Arc<AuthorizationCache> {
        &self.authorization
    }

    /// The rate limiter.
    #[must_use]
    pub const fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// The pre-write gate.
    #[must_use]
    pub const fn write_gate(&self) -> &WriteGate {
        &self.write_gate
    }
}

impl std::fmt::Debug for RelayCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCore")
            .field("config", &self.config)
            .field("state", &self.connection.status().state)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::MockConnector;
    use crate::relay::ConnectionState;

    #[tokio::test]
    async fn builds_in_fallback_mode() {
        let core = RelayCore::new(CoreConfig::default()).unwrap();

        assert_eq!(core.config().relay_url, "wss://relay.damus.io");
        assert_eq!(core.connection().status().state, ConnectionState::Disconnected);
        assert!(core.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn connects_to_configured_relay() {
        let connector = MockConnector::new();
        let core = RelayCore::with_parts(
            CoreConfig::new().with_relay_url("wss://relay.example.com"),
            Arc::new(connector.clone()),
            None,
        );

        core.connect(None).await.unwrap();
        let relay = connector.next_relay().await.unwrap();

        assert!(relay.url().starts_with("wss://relay.example.com"));
        assert_eq!(core.connection().status().state, ConnectionState::Connected);

        core.shutdown();
        assert_eq!(
            core.connection().status().state,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn invalid_relay_url_is_reported() {
        let core = RelayCore::with_parts(
            CoreConfig::new().with_relay_url("not a url"),
            Arc::new(MockConnector::new()),
            None,
        );

        assert!(matches!(
            core.connect(None).await,
            Err(CoreError::Relay(RelayError::InvalidUrl(_)))
        ));
    }
}
