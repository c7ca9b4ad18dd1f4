//! Types for relay connection state.
//!
//! This module defines the connection state machine and the immutable
//! status snapshots published on every transition.

use std::fmt;

/// Connection state of the relay link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No link. Initial state and the result of an explicit disconnect.
    Disconnected,

    /// Transport connection in progress.
    Connecting,

    /// Transport is up; no AUTH challenge has been received.
    Connected,

    /// The relay sent an AUTH challenge.
    AuthRequired,

    /// A signed challenge response was sent; waiting for the relay's OK.
    Authenticating,

    /// The relay accepted our challenge response.
    Authenticated,

    /// The relay rejected our challenge response.
    AuthFailed,

    /// Transport fault.
    Error,
}

impl ConnectionState {
    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AuthRequired => "auth-required",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::AuthFailed => "auth-failed",
            Self::Error => "error",
        }
    }

    /// Returns whether frames may be sent in this state.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated)
    }

    /// Returns whether an AUTH handshake is in progress.
    #[must_use]
    pub const fn is_authenticating(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::Authenticating)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of the relay link.
///
/// A new snapshot is created for every state transition; observers never
/// see a partially updated status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// The relay URL of the current or last link.
    pub relay_url: Option<String>,
    /// Reason of the last failure, if any.
    pub last_error: Option<String>,
    /// Whether the relay accepted an AUTH response on this session.
    pub authenticated: bool,
    /// When this snapshot was created (Unix milliseconds).
    pub timestamp: i64,
    /// Transport session counter; increments on every successful connect.
    pub session: u64,
}

impl ConnectionStatus {
    /// The status before any connection attempt.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            relay_url: None,
            last_error: None,
            authenticated: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
            session: 0,
        }
    }

    /// Derives the next snapshot with a new state.
    ///
    /// The error is cleared and the timestamp refreshed. `authenticated` is
    /// kept only while the link stays authenticated.
    #[must_use]
    pub fn transition(&self, state: ConnectionState) -> Self {
        Self {
            state,
            relay_url: self.relay_url.clone(),
            last_error: None,
            authenticated: state == ConnectionState::Authenticated,
            timestamp: chrono::Utc::now().timestamp_millis(),
            session: self.session,
        }
    }

    /// Sets the error reason on a snapshot.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// Sets the relay URL on a snapshot.
    #[must_use]
    pub fn with_relay(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }

    /// Sets the session counter on a snapshot.
    #[must_use]
    pub const fn with_session(mut self, session: u64) -> Self {
        self.session = session;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_states() {
        assert!(ConnectionState::Connected.is_ready());
        assert!(ConnectionState::Authenticated.is_ready());
        assert!(!ConnectionState::Disconnected.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());
        assert!(!ConnectionState::AuthRequired.is_ready());
        assert!(!ConnectionState::Authenticating.is_ready());
        assert!(!ConnectionState::AuthFailed.is_ready());
        assert!(!ConnectionState::Error.is_ready());
    }

    #[test]
    fn state_display_matches_wire_names() {
        assert_eq!(ConnectionState::AuthRequired.to_string(), "auth-required");
        assert_eq!(ConnectionState::AuthFailed.to_string(), "auth-failed");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }

    #[test]
    fn initial_status_is_disconnected() {
        let status = ConnectionStatus::initial();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.relay_url.is_none());
        assert!(!status.authenticated);
        assert_eq!(status.session, 0);
    }

    #[test]
    fn transition_clears_error_and_keeps_relay() {
        let status = ConnectionStatus::initial()
            .with_relay("wss://relay.example.com")
            .with_session(3)
            .transition(ConnectionState::Error)
            .with_error("reset");
        assert_eq!(status.last_error.as_deref(), Some("reset"));

        let next = status.transition(ConnectionState::Connecting);
        assert!(next.last_error.is_none());
        assert_eq!(next.relay_url.as_deref(), Some("wss://relay.example.com"));
        assert_eq!(next.session, 3);
    }

    #[test]
    fn authenticated_flag_follows_state() {
        let status = ConnectionStatus::initial().transition(ConnectionState::Authenticated);
        assert!(status.authenticated);
        assert!(!status.transition(ConnectionState::Error).authenticated);
    }
}
