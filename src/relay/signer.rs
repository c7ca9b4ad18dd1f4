//! Signing capability used to answer relay AUTH challenges.

use async_trait::async_trait;
use nostr::{Event, EventBuilder, Keys, RelayUrl};

use super::error::{RelayError, RelayResult};

/// Produces signed AUTH events (kind 22242) for relay challenges.
///
/// The connection manager never sees key material; it only asks the
/// injected signer for a response event.
#[async_trait]
pub trait AuthSigner: Send + Sync {
    /// Signs a response to `challenge` issued by `relay`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Signer`] if the event cannot be signed.
    async fn sign_challenge(&self, challenge: &str, relay: &RelayUrl) -> RelayResult<Event>;
}

#[async_trait]
impl AuthSigner for Keys {
    async fn sign_challenge(&self, challenge: &str, relay: &RelayUrl) -> RelayResult<Event> {
        EventBuilder::auth(challenge, relay.clone())
            .sign_with_keys(self)
            .map_err(|e| RelayError::Signer(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::Kind;

    #[tokio::test]
    async fn keys_sign_authentication_event() {
        let keys = Keys::generate();
        let relay = RelayUrl::parse("wss://relay.example.com").unwrap();

        let event = keys.sign_challenge("challenge-1", &relay).await.unwrap();

        assert_eq!(event.kind, Kind::Authentication);
        assert_eq!(event.pubkey, keys.public_key());
        assert!(event.verify().is_ok());
        let has_challenge = event
            .tags
            .iter()
            .any(|tag| tag.as_slice() == ["challenge", "challenge-1"]);
        assert!(has_challenge);
    }
}
