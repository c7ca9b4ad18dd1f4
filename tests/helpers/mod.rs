//! Reusable test helpers for relay integration tests.
//!
//! These helpers drive the real `ConnectionManager` and
//! `SubscriptionManager` against the in-memory `MockRelay` peer from the
//! `test-utils` feature. No sockets are opened.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cohort_relay_core::relay::testing::{MockConnector, MockRelay};
use cohort_relay_core::relay::{
    ConnectionManager, ConnectionOptions, ConnectionState, ConnectionStatus,
};
use cohort_relay_core::subscription::{SubscriptionDescriptor, SubscriptionHandle};
use nostr::{Event, EventBuilder, Keys, Kind};

/// Relay address used by every test.
pub const RELAY_URL: &str = "wss://relay.test";

/// How long a test waits for an asynchronous transition.
pub const WAIT: Duration = Duration::from_secs(5);

/// Creates a connection manager on top of a fresh mock connector.
pub fn mock_connection() -> (Arc<ConnectionManager>, MockConnector) {
    let connector = MockConnector::new();
    let manager = ConnectionManager::with_connector(
        Arc::new(connector.clone()),
        ConnectionOptions::default(),
    );
    (Arc::new(manager), connector)
}

/// Creates a connection manager that is already connected, plus the relay
/// side of its link.
pub async fn connected() -> (Arc<ConnectionManager>, MockConnector, MockRelay) {
    let (manager, connector) = mock_connection();
    manager
        .connect(RELAY_URL, None)
        .await
        .expect("mock relay should accept");
    let relay = connector.next_relay().await.expect("relay side of the link");
    (manager, connector, relay)
}

/// Signs a text note with fresh keys.
pub fn signed_note(content: &str) -> Event {
    let keys = Keys::generate();
    EventBuilder::new(Kind::TextNote, content)
        .sign_with_keys(&keys)
        .expect("should sign")
}

/// Waits until the connection status satisfies `pred`.
pub async fn wait_for_status(
    manager: &ConnectionManager,
    pred: impl Fn(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    let mut rx = manager.watch_status();
    let status = tokio::time::timeout(WAIT, rx.wait_for(|status| pred(status)))
        .await
        .expect("timed out waiting for connection status")
        .expect("status channel closed")
        .clone();
    status
}

/// Waits until the connection reaches `state`.
pub async fn wait_for_connection(
    manager: &ConnectionManager,
    state: ConnectionState,
) -> ConnectionStatus {
    wait_for_status(manager, |status| status.state == state).await
}

/// Waits until a subscription descriptor satisfies `pred`.
pub async fn wait_for_descriptor(
    handle: &SubscriptionHandle,
    pred: impl Fn(&SubscriptionDescriptor) -> bool,
) -> SubscriptionDescriptor {
    let mut rx = handle.watch();
    let descriptor = tokio::time::timeout(WAIT, rx.wait_for(|descriptor| pred(descriptor)))
        .await
        .expect("timed out waiting for subscription")
        .expect("descriptor channel closed")
        .clone();
    descriptor
}

/// Records callback invocations in order.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}
