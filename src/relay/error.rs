//! Error types for relay operations.
//!
//! This module defines error types that can occur while connecting to a
//! relay, authenticating against it, and sending frames over the link.

use thiserror::Error;

/// Errors that can occur during relay operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Transport connection to the relay failed or was lost.
    #[error("Failed to connect to relay {url}: {reason}")]
    Connection {
        /// The relay URL that failed.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Invalid relay URL.
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    /// Timeout waiting for operation.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// An operation required a ready link but none was available.
    #[error("Not connected to a relay (state: {0})")]
    NotConnected(String),

    /// The relay rejected the AUTH challenge response.
    #[error("Relay authentication failed: {0}")]
    Authentication(String),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The injected signer could not produce a challenge response.
    #[error("Signer error: {0}")]
    Signer(String),
}

impl RelayError {
    /// Returns true for transport faults that a reconnect may fix.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout(_))
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_display() {
        let error = RelayError::Connection {
            url: "wss://relay.example.com".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to connect to relay wss://relay.example.com: connection refused"
        );
    }

    #[test]
    fn invalid_url_error_display() {
        let error = RelayError::InvalidUrl("not-a-url".to_string());
        assert_eq!(error.to_string(), "Invalid relay URL: not-a-url");
    }

    #[test]
    fn not_connected_error_display() {
        let error = RelayError::NotConnected("disconnected".to_string());
        assert_eq!(
            error.to_string(),
            "Not connected to a relay (state: disconnected)"
        );
    }

    #[test]
    fn authentication_error_display() {
        let error = RelayError::Authentication("restricted".to_string());
        assert_eq!(error.to_string(), "Relay authentication failed: restricted");
    }

    #[test]
    fn timeout_error_display() {
        let error = RelayError::Timeout("connect".to_string());
        assert_eq!(error.to_string(), "Operation timed out: connect");
    }

    #[test]
    fn transient_classification() {
        assert!(RelayError::Timeout("connect".to_string()).is_transient());
        assert!(RelayError::Connection {
            url: "wss://a".to_string(),
            reason: "reset".to_string(),
        }
        .is_transient());
        assert!(!RelayError::Authentication("no".to_string()).is_transient());
        assert!(!RelayError::NotConnected("idle".to_string()).is_transient());
        assert!(!RelayError::InvalidUrl("x".to_string()).is_transient());
    }
}
