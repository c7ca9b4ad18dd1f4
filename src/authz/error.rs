//! Error types for the authorization authority.

use thiserror::Error;

/// Error type for calls to the whitelist authority.
///
/// None of these reach callers of
/// [`AuthorizationCache::verify`](super::AuthorizationCache::verify): every
/// failure degrades to a fallback entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// The request could not be sent or timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// The authority answered with a non-success status.
    #[error("Authority returned HTTP {0}")]
    Status(u16),

    /// The response body was not a whitelist status.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Result type alias for authority calls.
pub type Result<T> = std::result::Result<T, AuthorityError>;
