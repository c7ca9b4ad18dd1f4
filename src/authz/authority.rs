//! The remote whitelist authority.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{AuthorityError, Result};

/// Answer of the authority for one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhitelistStatus {
    /// Whether the actor may use the system.
    pub is_whitelisted: bool,
    /// Whether the actor has administrative rights.
    pub is_admin: bool,
    /// Cohorts; `null` and absent both mean none.
    pub cohorts: Option<Vec<String>>,
    /// When the authority verified the actor (Unix milliseconds).
    pub verified_at: Option<i64>,
}

/// Source of truth for actor standing.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Looks up the standing of `actor_id`.
    async fn whitelist_status(&self, actor_id: &str) -> Result<WhitelistStatus>;
}

/// Authority reached over HTTP.
///
/// Issues `GET {base_url}/whitelist-status?pubkey=<id>`; a timeout counts as
/// a network failure.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuthority {
    /// Creates an authority client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Network`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorityError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/whitelist-status", base_url.trim_end_matches('/')),
        })
    }

    /// The full whitelist-status URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn whitelist_status(&self, actor_id: &str) -> Result<WhitelistStatus> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("pubkey", actor_id)])
            .send()
            .await
            .map_err(|e| AuthorityError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorityError::Status(status.as_u16()));
        }

        response
            .json::<WhitelistStatus>()
            .await
            .map_err(|e| AuthorityError::Decode(e.to_string()))
    }
}
