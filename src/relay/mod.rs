//! Relay connectivity.
//!
//! This module maintains exactly one logical link to a relay: transport
//! connect, the optional AUTH challenge/response handshake, and reporting
//! of link loss.
//!
//! # Architecture
//!
//! ```text
//! SubscriptionManager / publishers
//!     │
//!     ▼
//! ConnectionManager ──status──▶ watch::Receiver<ConnectionStatus>
//!     │            └──frames──▶ broadcast::Receiver<RelayMessage>
//!     ▼
//! Connector (WebSocket, or in-memory for tests)
//!     │
//!     ▼
//! Relay
//! ```
//!
//! # Recovery
//!
//! The manager never retries on its own. A transport fault moves the link
//! to `error`; the subscription manager decides when to call
//! [`ConnectionManager::ensure_ready`], which reconnects to the last relay.

mod error;
mod manager;
mod message;
mod signer;
mod transport;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{RelayError, RelayResult};
pub use manager::{
    ConnectionManager, ConnectionOptions, DEFAULT_AUTH_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
};
pub use message::{
    ClientMessage, InboundMessage, MachineReadablePrefix, RelayMessage, SubscriptionId,
};
pub use signer::AuthSigner;
pub use transport::{Connector, Link, WebSocketConnector};
pub use types::{ConnectionState, ConnectionStatus};
