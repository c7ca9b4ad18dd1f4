//! In-memory relay peer for tests.
//!
//! [`MockConnector`] implements [`Connector`] without any sockets. Every
//! accepted connection produces a [`MockRelay`] that the test drives by
//! hand: it reads the client's frames and writes relay frames back.
//!
//! # Warning
//!
//! Only compiled for tests or with the `test-utils` feature.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nostr::{Event, EventId, RelayUrl};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use super::error::{RelayError, RelayResult};
use super::transport::{Connector, Link};

/// A connector that hands out in-memory links.
#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

struct MockInner {
    accepting: AtomicBool,
    attempts: AtomicUsize,
    peers_tx: mpsc::UnboundedSender<MockRelay>,
    peers_rx: Mutex<mpsc::UnboundedReceiver<MockRelay>>,
}

impl MockConnector {
    /// Creates a connector that accepts connections.
    #[must_use]
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockInner {
                accepting: AtomicBool::new(true),
                attempts: AtomicUsize::new(0),
                peers_tx,
                peers_rx: Mutex::new(peers_rx),
            }),
        }
    }

    /// Makes future connection attempts succeed or fail.
    pub fn set_accepting(&self, accepting: bool) {
        self.inner.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Waits for the relay side of the next accepted connection.
    pub async fn next_relay(&self) -> Option<MockRelay> {
        self.inner.peers_rx.lock().await.recv().await
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &RelayUrl) -> RelayResult<Link> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(RelayError::Connection {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let relay = MockRelay {
            url: url.to_string(),
            to_client: Some(to_client),
            from_client,
        };
        self.inner
            .peers_tx
            .send(relay)
            .map_err(|_| RelayError::Connection {
                url: url.to_string(),
                reason: "mock connector dropped".to_string(),
            })?;

        Ok(Link { outbound, inbound })
    }
}

/// The relay end of an in-memory link.
pub struct MockRelay {
    url: String,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockRelay {
    /// The URL the client connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends a raw frame to the client. Returns false if the link is gone.
    pub fn send_raw(&self, text: impl Into<String>) -> bool {
        self.to_client
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Sends a JSON frame to the client.
    pub fn send(&self, frame: &Value) -> bool {
        self.send_raw(frame.to_string())
    }

    /// Sends `["EVENT", sub_id, event]`.
    pub fn send_event(&self, subscription_id: &str, event: &Event) -> bool {
        self.send(&json!(["EVENT", subscription_id, event]))
    }

    /// Sends `["EOSE", sub_id]`.
    pub fn send_eose(&self, subscription_id: &str) -> bool {
        self.send(&json!(["EOSE", subscription_id]))
    }

    /// Sends `["AUTH", challenge]`.
    pub fn send_auth(&self, challenge: &str) -> bool {
        self.send(&json!(["AUTH", challenge]))
    }

    /// Sends `["OK", event_id, accepted, message]`.
    pub fn send_ok(&self, event_id: &EventId, accepted: bool, message: &str) -> bool {
        self.send(&json!(["OK", event_id.to_hex(), accepted, message]))
    }

    /// Sends `["CLOSED", sub_id, message]`.
    pub fn send_closed(&self, subscription_id: &str, message: &str) -> bool {
        self.send(&json!(["CLOSED", subscription_id, message]))
    }

    /// Receives the next frame the client sent, parsed as a JSON array.
    ///
    /// Returns `None` once the client dropped the link.
    pub async fn recv(&mut self) -> Option<Vec<Value>> {
        let text = self.from_client.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Receives frames until one of the given type arrives.
    pub async fn recv_kind(&mut self, kind: &str) -> Option<Vec<Value>> {
        loop {
            let frame = self.recv().await?;
            if frame.first().and_then(Value::as_str) == Some(kind) {
                return Some(frame);
            }
        }
    }

    /// Returns a frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<Vec<Value>> {
        let text = self.from_client.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Simulates a transport fault: the client sees its inbound stream end.
    pub fn drop_link(&mut self) {
        self.to_client = None;
    }
}
