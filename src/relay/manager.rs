//! Connection manager for a single relay link.
//!
//! This module owns the socket lifecycle and the AUTH handshake state
//! machine. It never retries on its own: transport faults are reported as
//! [`ConnectionState::Error`] and recovery is driven by the caller (the
//! subscription manager) through [`ConnectionManager::ensure_ready`].
//!
//! # State Machine
//!
//! ```text
//! disconnected ──connect──▶ connecting ──▶ connected ──AUTH──▶ auth-required
//!                              │                                    │
//!                              ▼                                    ▼
//!                            error ◀── transport fault ──  authenticating
//!                                                           │         │
//!                                                           ▼         ▼
//!                                                  authenticated  auth-failed
//! ```
//!
//! A relay that never answers our AUTH response moves the link to
//! `auth-failed` after [`ConnectionOptions::auth_timeout`].

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nostr::{Event, EventId, RelayUrl};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{RelayError, RelayResult};
use super::message::{self, ClientMessage, InboundMessage, RelayMessage};
use super::signer::AuthSigner;
use super::transport::{Connector, Link, WebSocketConnector};
use super::types::{ConnectionState, ConnectionStatus};

/// Default timeout for establishing the transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for an AUTH handshake to settle.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the inbound message broadcast.
const MESSAGE_BUFFER: usize = 1024;

/// Tunables for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Upper bound on transport connection.
    pub connect_timeout: Duration,
    /// Upper bound on an AUTH handshake, including the relay's answer to
    /// our response.
    pub auth_timeout: Duration,
    /// Reject plaintext `ws://` relay URLs.
    pub require_tls: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            require_tls: false,
        }
    }
}

/// The relay and identity a link is opened for.
#[derive(Clone)]
struct Target {
    url: RelayUrl,
    signer: Option<Arc<dyn AuthSigner>>,
}

struct ActiveLink {
    session: u64,
    url: RelayUrl,
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
}

#[derive(Default)]
struct LinkSlot {
    current: Option<ActiveLink>,
    target: Option<Target>,
    last_session: u64,
    /// Bumped by every connect and disconnect; a connect that finds it
    /// changed lost a race and discards its link.
    epoch: u64,
    pending_auth: Option<EventId>,
}

impl LinkSlot {
    fn is_current(&self, session: u64) -> bool {
        self.current.as_ref().is_some_and(|link| link.session == session)
    }

    fn teardown(&mut self) {
        if let Some(link) = self.current.take() {
            link.reader.abort();
        }
        self.pending_auth = None;
    }
}

struct Shared {
    status_tx: watch::Sender<ConnectionStatus>,
    messages_tx: broadcast::Sender<InboundMessage>,
    slot: Mutex<LinkSlot>,
    /// How long the relay may take to answer our AUTH response.
    auth_timeout: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes the next snapshot. Callers hold the slot lock so
    /// transitions are serialized.
    fn set_status(&self, _slot: &LinkSlot, next: ConnectionStatus) {
        debug!(state = %next.state, session = next.session, "relay status");
        self.status_tx.send_replace(next);
    }

    fn transition(&self, slot: &LinkSlot, state: ConnectionState, error: Option<String>) {
        let next = self.status_tx.borrow().transition(state);
        let next = match error {
            Some(error) => next.with_error(error),
            None => next,
        };
        self.set_status(slot, next);
    }

    fn link_lost(&self, session: u64) {
        let mut slot = self.lock();
        if !slot.is_current(session) {
            return;
        }
        slot.teardown();
        warn!(session, "relay link lost");
        self.transition(
            &slot,
            ConnectionState::Error,
            Some("relay link lost".to_string()),
        );
    }

    async fn handle_challenge(self: &Arc<Self>, session: u64, target: &Target, challenge: &str) {
        let Some(signer) = target.signer.clone() else {
            let slot = self.lock();
            if slot.is_current(session) {
                warn!(relay = %target.url, "relay requested AUTH but no signer is configured");
                self.transition(
                    &slot,
                    ConnectionState::AuthFailed,
                    Some("relay requested AUTH but no signer is configured".to_string()),
                );
            }
            return;
        };

        {
            let slot = self.lock();
            if !slot.is_current(session) {
                return;
            }
            self.transition(&slot, ConnectionState::AuthRequired, None);
            self.transition(&slot, ConnectionState::Authenticating, None);
        }

        let signed = signer.sign_challenge(challenge, &target.url).await;

        let mut slot = self.lock();
        if !slot.is_current(session) {
            return;
        }
        let event = match signed {
            Ok(event) => event,
            Err(e) => {
                self.transition(&slot, ConnectionState::AuthFailed, Some(e.to_string()));
                return;
            }
        };
        let frame = match message::encode(&ClientMessage::Auth(Cow::Borrowed(&event))) {
            Ok(frame) => frame,
            Err(e) => {
                self.transition(&slot, ConnectionState::AuthFailed, Some(e.to_string()));
                return;
            }
        };
        slot.pending_auth = Some(event.id);
        if let Some(link) = slot.current.as_ref() {
            // A failed send means the link is gone; the reader reports it.
            let _ = link.outbound.send(frame);
        }
        drop(slot);
        debug!(relay = %target.url, event_id = %event.id, "sent AUTH response");

        let shared = Arc::clone(self);
        let event_id = event.id;
        tokio::spawn(async move {
            tokio::time::sleep(shared.auth_timeout).await;
            shared.auth_expired(session, &event_id);
        });
    }

    /// Fails a handshake the relay never answered.
    fn auth_expired(&self, session: u64, event_id: &EventId) {
        let mut slot = self.lock();
        if !slot.is_current(session) || slot.pending_auth.as_ref() != Some(event_id) {
            return;
        }
        slot.pending_auth = None;
        warn!(session, "relay did not answer AUTH response");
        self.transition(
            &slot,
            ConnectionState::AuthFailed,
            Some(format!(
                "no AUTH answer within {}s",
                self.auth_timeout.as_secs_f64()
            )),
        );
    }

    fn handle_ok(&self, session: u64, event_id: &EventId, accepted: bool, reason: &str) {
        let mut slot = self.lock();
        if !slot.is_current(session) || slot.pending_auth.as_ref() != Some(event_id) {
            return;
        }
        slot.pending_auth = None;
        if accepted {
            info!(session, "relay authentication accepted");
            self.transition(&slot, ConnectionState::Authenticated, None);
        } else {
            warn!(session, reason, "relay authentication rejected");
            self.transition(&slot, ConnectionState::AuthFailed, Some(reason.to_string()));
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<String>,
        session: u64,
        target: Target,
    ) {
        while let Some(text) = inbound.recv().await {
            let message = match message::decode(&text) {
                Ok(message) => message,
                Err(e) => {
                    warn!(relay = %target.url, error = %e, "dropping malformed relay frame");
                    continue;
                }
            };

            match &message {
                RelayMessage::Auth { challenge } => {
                    self.handle_challenge(session, &target, challenge).await;
                }
                RelayMessage::Ok {
                    event_id,
                    status,
                    message: reason,
                } => self.handle_ok(session, event_id, *status, reason),
                RelayMessage::Notice(notice) => {
                    info!(relay = %target.url, notice = %notice, "relay notice");
                }
                RelayMessage::Event { event, .. } => {
                    if event.verify().is_err() {
                        warn!(relay = %target.url, event_id = %event.id, "dropping event with invalid signature");
                        continue;
                    }
                }
                RelayMessage::EndOfStoredEvents(_)
                | RelayMessage::Closed { .. }
                | RelayMessage::Count { .. }
                | RelayMessage::NegMsg { .. }
                | RelayMessage::NegErr { .. } => {}
            }

            // No receivers is fine; nobody is subscribed yet.
            let _ = self.messages_tx.send(message);
        }

        self.link_lost(session);
    }
}

/// Manager for one logical relay link.
///
/// The manager holds the current [`ConnectionStatus`] and publishes a new
/// snapshot on every transition. Inbound frames are fanned out to all
/// [`messages`](Self::messages) receivers.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use cohort_relay_core::relay::ConnectionManager;
/// use nostr::Keys;
///
/// let manager = ConnectionManager::new();
/// manager.connect("wss://relay.example.com", Some(Arc::new(Keys::generate()))).await?;
///
/// let mut status = manager.watch_status();
/// println!("state: {}", status.borrow().state);
/// ```
pub struct ConnectionManager {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    /// Serializes connects so concurrent recoveries share one attempt.
    connect_lock: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    /// Creates a manager using the WebSocket transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(Arc::new(WebSocketConnector), ConnectionOptions::default())
    }

    /// Creates a manager with a custom transport.
    #[must_use]
    pub fn with_connector(connector: Arc<dyn Connector>, options: ConnectionOptions) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::initial());
        let (messages_tx, _) = broadcast::channel(MESSAGE_BUFFER);
        Self {
            shared: Arc::new(Shared {
                status_tx,
                messages_tx,
                slot: Mutex::new(LinkSlot::default()),
                auth_timeout: options.auth_timeout,
            }),
            connector,
            options,
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the latest status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Returns an observer of the status stream.
    ///
    /// The receiver immediately holds the latest snapshot (read it with
    /// `borrow()`); `changed()` resolves on the next transition.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Returns a receiver of every inbound relay frame.
    #[must_use]
    pub fn messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.shared.messages_tx.subscribe()
    }

    /// Connects to a relay, replacing any existing link.
    ///
    /// Returns once the transport is up (`connected`). If the relay then
    /// issues an AUTH challenge, the handshake runs in the background using
    /// `signer`; watch the status stream for `authenticated` or
    /// `auth-failed`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::InvalidUrl`] if `address` is malformed
    /// - [`RelayError::Connection`] if the relay is unreachable
    /// - [`RelayError::Timeout`] if the transport does not come up in time
    pub async fn connect(
        &self,
        address: &str,
        signer: Option<Arc<dyn AuthSigner>>,
    ) -> RelayResult<()> {
        let url = self.parse_url(address)?;
        let _guard = self.connect_lock.lock().await;
        self.open(Target { url, signer }).await.map(|_| ())
    }

    /// Publishes an event on the current link.
    ///
    /// Relay acceptance is reported separately as an `OK` frame on
    /// [`messages`](Self::messages).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] unless the link is `connected`
    /// or `authenticated`.
    pub fn publish(&self, event: &Event) -> RelayResult<EventId> {
        self.send(&ClientMessage::Event(Cow::Borrowed(event)))?;
        Ok(event.id)
    }

    /// Sends a frame on the current link and returns its session.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] unless the link is ready.
    pub fn send(&self, frame: &ClientMessage<'_>) -> RelayResult<u64> {
        let frame = message::encode(frame)?;
        let slot = self.shared.lock();
        let state = self.shared.status_tx.borrow().state;
        if !state.is_ready() {
            return Err(RelayError::NotConnected(state.to_string()));
        }
        let link = slot
            .current
            .as_ref()
            .ok_or_else(|| RelayError::NotConnected(state.to_string()))?;
        link.outbound
            .send(frame)
            .map_err(|_| RelayError::Connection {
                url: link.url.to_string(),
                reason: "link closed".to_string(),
            })?;
        Ok(link.session)
    }

    /// Tears down the link. Always ends in `disconnected`; idempotent.
    pub fn disconnect(&self) {
        let mut slot = self.shared.lock();
        slot.epoch += 1;
        slot.teardown();
        if self.shared.status_tx.borrow().state != ConnectionState::Disconnected {
            info!("disconnected from relay");
            self.shared
                .transition(&slot, ConnectionState::Disconnected, None);
        }
    }

    /// Returns a ready session, recovering the link if possible.
    ///
    /// - `connected`/`authenticated`: returns the current session
    /// - handshake in progress: waits for it to settle
    /// - `error`: reconnects to the last relay with the last signer
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotConnected`] if never connected or explicitly
    ///   disconnected
    /// - [`RelayError::Authentication`] if the relay rejected our AUTH
    /// - transport errors from the reconnect attempt
    pub async fn ensure_ready(&self) -> RelayResult<u64> {
        let _guard = self.connect_lock.lock().await;
        let status = self.status();
        if status.state.is_ready() {
            return Ok(status.session);
        }
        if status.state.is_authenticating() {
            return self.wait_for_auth().await;
        }
        match status.state {
            ConnectionState::AuthFailed => Err(RelayError::Authentication(
                status
                    .last_error
                    .unwrap_or_else(|| "rejected by relay".to_string()),
            )),
            ConnectionState::Error => {
                let target = self
                    .shared
                    .lock()
                    .target
                    .clone()
                    .ok_or_else(|| RelayError::NotConnected(status.state.to_string()))?;
                debug!(relay = %target.url, "recovering relay link");
                self.open(target).await
            }
            _ => Err(RelayError::NotConnected(status.state.to_string())),
        }
    }

    async fn wait_for_auth(&self) -> RelayResult<u64> {
        let mut rx = self.shared.status_tx.subscribe();
        let wait = async {
            loop {
                let status = rx.borrow_and_update().clone();
                match status.state {
                    ConnectionState::Connected | ConnectionState::Authenticated => {
                        return Ok(status.session)
                    }
                    ConnectionState::AuthFailed => {
                        return Err(RelayError::Authentication(
                            status.last_error.unwrap_or_default(),
                        ))
                    }
                    state if state.is_authenticating() => {}
                    other => return Err(RelayError::NotConnected(other.to_string())),
                }
                if rx.changed().await.is_err() {
                    return Err(RelayError::NotConnected("closed".to_string()));
                }
            }
        };
        tokio::time::timeout(self.options.auth_timeout, wait)
            .await
            .map_err(|_| RelayError::Timeout("relay authentication".to_string()))?
    }

    /// Opens a link to `target`. Caller holds `connect_lock`.
    async fn open(&self, target: Target) -> RelayResult<u64> {
        let epoch = {
            let mut slot = self.shared.lock();
            slot.teardown();
            slot.epoch += 1;
            slot.target = Some(target.clone());
            let next = self
                .shared
                .status_tx
                .borrow()
                .transition(ConnectionState::Connecting)
                .with_relay(target.url.to_string());
            self.shared.set_status(&slot, next);
            slot.epoch
        };
        info!(relay = %target.url, "connecting to relay");

        let connected =
            tokio::time::timeout(self.options.connect_timeout, self.connector.connect(&target.url))
                .await
                .unwrap_or_else(|_| {
                    Err(RelayError::Timeout(format!("connecting to {}", target.url)))
                });

        let Link { outbound, inbound } = match connected {
            Ok(link) => link,
            Err(e) => {
                let slot = self.shared.lock();
                if slot.epoch == epoch {
                    warn!(relay = %target.url, error = %e, "relay connection failed");
                    self.shared
                        .transition(&slot, ConnectionState::Error, Some(e.to_string()));
                }
                return Err(e);
            }
        };

        let mut slot = self.shared.lock();
        if slot.epoch != epoch {
            return Err(RelayError::NotConnected(
                "disconnected while connecting".to_string(),
            ));
        }
        slot.last_session += 1;
        let session = slot.last_session;
        let reader = tokio::spawn(Arc::clone(&self.shared).read_loop(
            inbound,
            session,
            target.clone(),
        ));
        slot.current = Some(ActiveLink {
            session,
            url: target.url.clone(),
            outbound,
            reader,
        });
        let next = self
            .shared
            .status_tx
            .borrow()
            .transition(ConnectionState::Connected)
            .with_session(session);
        self.shared.set_status(&slot, next);
        drop(slot);

        info!(relay = %target.url, session, "connected to relay");
        Ok(session)
    }

    /// Validates a relay URL.
    fn parse_url(&self, address: &str) -> RelayResult<RelayUrl> {
        if self.options.require_tls && address.starts_with("ws://") {
            return Err(RelayError::InvalidUrl(format!(
                "Plaintext ws:// not allowed for security: {address}"
            )));
        }
        RelayUrl::parse(address).map_err(|e| RelayError::InvalidUrl(format!("{address}: {e}")))
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.lock().teardown();
    }
}
