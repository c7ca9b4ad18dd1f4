//! Subscription manager for durable, self-healing relay queries.
//!
//! This module turns the one-shot `REQ` primitive into subscriptions with
//! identity, metrics and lifecycle control. A single dispatcher task
//! listens to the connection's frame broadcast and status stream:
//!
//! - frames are routed to subscriptions by id, in arrival order
//! - `error` status moves active subscriptions into backoff
//! - a restored `connected`/`authenticated` status retries reconnecting
//!   subscriptions immediately and re-issues queries from older sessions
//!
//! Per-subscription state lives behind a mutex that is never held across an
//! `await`; callbacks run after the lock is released.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nostr::{Event, Filter};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{Result, SubscriptionError};
use super::retry::RetryPolicy;
use super::types::{
    StateSummary, SubscriptionDescriptor, SubscriptionHandlers, SubscriptionOptions,
    SubscriptionState,
};
use crate::relay::{
    ClientMessage, ConnectionManager, ConnectionState, ConnectionStatus, InboundMessage,
    MachineReadablePrefix, RelayError, RelayMessage, RelayResult, SubscriptionId,
};

/// Longest subscription id relays are required to accept.
const MAX_SUBSCRIPTION_ID_LEN: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn generate_id() -> String {
    format!("sub-{}", hex::encode(rand::random::<[u8; 8]>()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartOutcome {
    Started,
    Queued,
    Failed,
    Skipped,
}

/// Callback to run once the entry lock is released.
enum Notify {
    None,
    Error(String),
    Close,
}

struct EntryState {
    descriptor: SubscriptionDescriptor,
    retry: RetryPolicy,
    /// Session the live REQ was issued on.
    session: Option<u64>,
    /// Start as soon as the link becomes ready.
    queued: bool,
    retry_in_flight: bool,
    /// Bumped on every state change; async work compares it after awaiting.
    generation: u64,
    timeout: Option<CancellationToken>,
}

struct Entry {
    id: String,
    filters: Vec<Filter>,
    options: SubscriptionOptions,
    handlers: SubscriptionHandlers,
    state: Mutex<EntryState>,
    meta_tx: watch::Sender<SubscriptionDescriptor>,
}

impl Entry {
    fn new(
        id: String,
        filters: Vec<Filter>,
        options: SubscriptionOptions,
        handlers: SubscriptionHandlers,
    ) -> Self {
        let descriptor = SubscriptionDescriptor::new(id.clone(), filters.clone());
        let (meta_tx, _) = watch::channel(descriptor.clone());
        let retry = RetryPolicy::new(options.reconnect_delay, options.max_reconnect_attempts);
        Self {
            id,
            filters,
            options,
            handlers,
            state: Mutex::new(EntryState {
                descriptor,
                retry,
                session: None,
                queued: false,
                retry_in_flight: false,
                generation: 0,
                timeout: None,
            }),
            meta_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryState> {
        lock(&self.state)
    }

    fn current_state(&self) -> SubscriptionState {
        self.meta_tx.borrow().state
    }

    /// Publishes the descriptor to observers.
    fn publish(&self, st: &EntryState) {
        self.meta_tx.send_replace(st.descriptor.clone());
    }

    /// Applies a state transition if the state machine allows it.
    fn set_state(&self, st: &mut EntryState, next: SubscriptionState) -> bool {
        let current = st.descriptor.state;
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            warn!(subscription = %self.id, from = %current, to = %next, "rejected subscription transition");
            return false;
        }
        debug!(subscription = %self.id, from = %current, to = %next, "subscription transition");
        st.descriptor.state = next;
        st.generation += 1;
        true
    }

    /// Marks a successful (re)start on `session`.
    fn mark_started(&self, st: &mut EntryState, session: u64) {
        self.set_state(st, SubscriptionState::Active);
        st.session = Some(session);
        st.queued = false;
        st.retry.reset();
        st.descriptor.reconnect_attempts = 0;
        st.descriptor.last_error = None;
        info!(subscription = %self.id, session, "subscription active");
    }

    fn notify(&self, notify: Notify) {
        match notify {
            Notify::None => {}
            Notify::Error(message) => {
                if let Some(on_error) = &self.handlers.on_error {
                    on_error(&message);
                }
            }
            Notify::Close => {
                if let Some(on_close) = &self.handlers.on_close {
                    on_close();
                }
            }
        }
    }

    fn req(&self) -> ClientMessage<'_> {
        ClientMessage::Req {
            subscription_id: Cow::Owned(SubscriptionId::new(self.id.as_str())),
            filters: self.filters.iter().map(Cow::Borrowed).collect(),
        }
    }
}

struct Inner {
    connection: Arc<ConnectionManager>,
    subscriptions: Mutex<HashMap<String, Arc<Entry>>>,
    summary_tx: watch::Sender<StateSummary>,
}

impl Inner {
    fn entries(&self) -> Vec<Arc<Entry>> {
        lock(&self.subscriptions).values().cloned().collect()
    }

    fn entry(&self, id: &str) -> Option<Arc<Entry>> {
        lock(&self.subscriptions).get(id).cloned()
    }

    fn refresh_summary(&self) {
        let mut next = StateSummary::default();
        for entry in self.entries() {
            next.record(entry.current_state());
        }
        self.summary_tx.send_if_modified(|summary| {
            if *summary == next {
                false
            } else {
                *summary = next;
                true
            }
        });
    }

    /// Best-effort CLOSE for a query that is live on the relay.
    fn send_close(&self, id: &str) {
        if let Err(e) = self.connection.send(&ClientMessage::close(SubscriptionId::new(id))) {
            debug!(subscription = %id, error = %e, "CLOSE not sent");
        }
    }

    /// Gets a ready link and sends the entry's REQ on it.
    async fn issue(&self, entry: &Entry) -> RelayResult<u64> {
        self.connection.ensure_ready().await?;
        self.connection.send(&entry.req())
    }

    /// Starts an `idle` or `paused` subscription.
    ///
    /// If the link was never opened the subscription stays where it was,
    /// queued to start when the link becomes ready. A transport failure
    /// with `auto_reconnect` enters backoff like a lost link.
    async fn start(self: &Arc<Self>, entry: &Arc<Entry>) {
        // The link may have become ready between the failed attempt and
        // queueing, in which case the dispatcher already skipped us.
        while self.try_start(entry).await == StartOutcome::Queued
            && self.connection.status().state.is_ready()
        {}
    }

    async fn try_start(self: &Arc<Self>, entry: &Arc<Entry>) -> StartOutcome {
        let generation = {
            let st = entry.lock();
            if !matches!(
                st.descriptor.state,
                SubscriptionState::Idle | SubscriptionState::Paused
            ) {
                return StartOutcome::Skipped;
            }
            st.generation
        };

        let result = self.issue(entry).await;

        let (outcome, notify) = {
            let mut st = entry.lock();
            if st.generation != generation {
                // Stopped, closed or restarted meanwhile.
                if result.is_ok() && st.descriptor.state != SubscriptionState::Active {
                    drop(st);
                    self.send_close(&entry.id);
                }
                return StartOutcome::Skipped;
            }
            match result {
                Ok(session) => {
                    entry.mark_started(&mut st, session);
                    entry.publish(&st);
                    (StartOutcome::Started, Notify::None)
                }
                Err(e) if e.is_transient() && entry.options.auto_reconnect => {
                    debug!(subscription = %entry.id, error = %e, "start failed, backing off");
                    st.queued = false;
                    st.descriptor.last_error = Some(e.to_string());
                    entry.set_state(&mut st, SubscriptionState::Reconnecting);
                    (StartOutcome::Failed, self.schedule_retry(entry, &mut st))
                }
                Err(e) => {
                    st.queued = true;
                    st.descriptor.last_error = Some(e.to_string());
                    entry.publish(&st);
                    if matches!(e, RelayError::NotConnected(_)) {
                        debug!(subscription = %entry.id, "queued until the relay link is ready");
                        (StartOutcome::Queued, Notify::None)
                    } else {
                        (StartOutcome::Failed, Notify::Error(e.to_string()))
                    }
                }
            }
        };

        self.refresh_summary();
        entry.notify(notify);
        outcome
    }

    /// Consumes one retry attempt and arms its timer, or gives up.
    fn schedule_retry(self: &Arc<Self>, entry: &Arc<Entry>, st: &mut EntryState) -> Notify {
        let Some(delay) = st.retry.next_delay() else {
            st.retry.cancel();
            let reason = st
                .descriptor
                .last_error
                .clone()
                .unwrap_or_else(|| "relay link lost".to_string());
            let message = format!(
                "gave up after {} reconnect attempts: {reason}",
                entry.options.max_reconnect_attempts
            );
            warn!(subscription = %entry.id, "{message}");
            entry.set_state(st, SubscriptionState::Error);
            st.descriptor.last_error = Some(message.clone());
            entry.publish(st);
            return Notify::Error(message);
        };

        entry.set_state(st, SubscriptionState::Reconnecting);
        st.descriptor.reconnect_attempts = st.retry.attempts();
        let token = st.retry.arm();
        entry.publish(st);
        debug!(
            subscription = %entry.id,
            attempt = st.retry.attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduled reconnect"
        );

        let inner = Arc::clone(self);
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => inner.run_retry(&entry, &token).await,
            }
        });
        Notify::None
    }

    /// Re-issues a reconnecting subscription.
    async fn run_retry(self: &Arc<Self>, entry: &Arc<Entry>, token: &CancellationToken) {
        let generation = {
            let mut st = entry.lock();
            if token.is_cancelled()
                || st.retry_in_flight
                || st.descriptor.state != SubscriptionState::Reconnecting
            {
                return;
            }
            st.retry_in_flight = true;
            st.generation
        };

        let result = self.issue(entry).await;

        let notify = {
            let mut st = entry.lock();
            st.retry_in_flight = false;
            if st.generation != generation {
                if result.is_ok() && st.descriptor.state != SubscriptionState::Active {
                    drop(st);
                    self.send_close(&entry.id);
                }
                return;
            }
            match result {
                Ok(session) => {
                    entry.mark_started(&mut st, session);
                    entry.publish(&st);
                    Notify::None
                }
                Err(e) => {
                    debug!(subscription = %entry.id, error = %e, "reconnect attempt failed");
                    st.descriptor.last_error = Some(e.to_string());
                    self.schedule_retry(entry, &mut st)
                }
            }
        };

        self.refresh_summary();
        entry.notify(notify);
    }

    /// Skips the backoff wait of a reconnecting subscription.
    fn retry_now(self: &Arc<Self>, entry: &Arc<Entry>) {
        let token = {
            let mut st = entry.lock();
            if st.retry_in_flight || st.descriptor.state != SubscriptionState::Reconnecting {
                return;
            }
            st.retry.arm()
        };
        debug!(subscription = %entry.id, "link restored, retrying immediately");
        let inner = Arc::clone(self);
        let entry = Arc::clone(entry);
        tokio::spawn(async move { inner.run_retry(&entry, &token).await });
    }

    fn handle_link_loss(self: &Arc<Self>, entry: &Arc<Entry>) {
        let notify = {
            let mut st = entry.lock();
            if st.descriptor.state != SubscriptionState::Active {
                return;
            }
            st.session = None;
            st.descriptor.last_error = Some("relay link lost".to_string());
            if entry.options.auto_reconnect {
                self.schedule_retry(entry, &mut st)
            } else {
                entry.set_state(&mut st, SubscriptionState::Error);
                entry.publish(&st);
                Notify::Error("relay link lost".to_string())
            }
        };
        self.refresh_summary();
        entry.notify(notify);
    }

    /// Re-sends the REQ of an active subscription issued on an older session.
    fn reissue(&self, entry: &Entry, session: u64) {
        let mut st = entry.lock();
        if st.descriptor.state != SubscriptionState::Active || st.session == Some(session) {
            return;
        }
        match self.connection.send(&entry.req()) {
            Ok(sent_on) => {
                debug!(subscription = %entry.id, session = sent_on, "re-issued on new session");
                st.session = Some(sent_on);
            }
            Err(e) => debug!(subscription = %entry.id, error = %e, "re-issue deferred"),
        }
    }

    fn on_status(self: &Arc<Self>, status: &ConnectionStatus) {
        match status.state {
            ConnectionState::Connected | ConnectionState::Authenticated => {
                for entry in self.entries() {
                    match entry.current_state() {
                        SubscriptionState::Reconnecting => self.retry_now(&entry),
                        SubscriptionState::Active => self.reissue(&entry, status.session),
                        SubscriptionState::Idle | SubscriptionState::Paused
                            if entry.lock().queued =>
                        {
                            let inner = Arc::clone(self);
                            tokio::spawn(async move { inner.start(&entry).await });
                        }
                        _ => {}
                    }
                }
            }
            ConnectionState::Error => {
                for entry in self.entries() {
                    self.handle_link_loss(&entry);
                }
            }
            _ => {}
        }
    }

    fn on_message(self: &Arc<Self>, message: InboundMessage) {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                if let Some(entry) = self.entry(subscription_id.as_str()) {
                    Self::deliver_event(&entry, &event);
                }
            }
            RelayMessage::EndOfStoredEvents(subscription_id) => {
                if let Some(entry) = self.entry(subscription_id.as_str()) {
                    self.deliver_eose(&entry);
                }
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                if let Some(entry) = self.entry(subscription_id.as_str()) {
                    self.relay_closed(&entry, &message);
                }
            }
            RelayMessage::Ok { .. }
            | RelayMessage::Notice(_)
            | RelayMessage::Auth { .. }
            | RelayMessage::Count { .. }
            | RelayMessage::NegMsg { .. }
            | RelayMessage::NegErr { .. } => {}
        }
    }

    fn deliver_event(entry: &Entry, event: &Event) {
        {
            let mut st = entry.lock();
            if st.descriptor.state != SubscriptionState::Active {
                return;
            }
            st.descriptor.event_count += 1;
            st.descriptor.last_event_at = Some(now_millis());
            entry.publish(&st);
        }
        if let Some(on_event) = &entry.handlers.on_event {
            on_event(event);
        }
    }

    fn deliver_eose(&self, entry: &Entry) {
        {
            let mut st = entry.lock();
            if st.descriptor.state != SubscriptionState::Active {
                return;
            }
            st.descriptor.eose_received = true;
            entry.publish(&st);
        }
        if let Some(on_eose) = &entry.handlers.on_eose {
            on_eose();
        }
        if entry.options.close_on_eose {
            self.close_entry(entry);
        }
    }

    fn relay_closed(self: &Arc<Self>, entry: &Arc<Entry>, message: &str) {
        let notify = {
            let mut st = entry.lock();
            if st.descriptor.state != SubscriptionState::Active {
                return;
            }
            st.session = None;
            st.descriptor.last_error = Some(format!("closed by relay: {message}"));
            let auth_required =
                MachineReadablePrefix::parse(message) == Some(MachineReadablePrefix::AuthRequired);
            if auth_required && entry.options.auto_reconnect {
                info!(subscription = %entry.id, "relay requires authentication, waiting");
                self.schedule_retry(entry, &mut st)
            } else {
                warn!(subscription = %entry.id, reason = message, "relay closed subscription");
                entry.set_state(&mut st, SubscriptionState::Error);
                entry.publish(&st);
                Notify::Error(format!("closed by relay: {message}"))
            }
        };
        self.refresh_summary();
        entry.notify(notify);
    }

    fn close_entry(&self, entry: &Entry) -> bool {
        let was_live = {
            let mut st = entry.lock();
            if st.descriptor.state.is_terminal() {
                return false;
            }
            st.retry.cancel();
            if let Some(timeout) = st.timeout.take() {
                timeout.cancel();
            }
            let was_live =
                st.descriptor.state == SubscriptionState::Active && st.session.take().is_some();
            st.queued = false;
            entry.set_state(&mut st, SubscriptionState::Closed);
            entry.publish(&st);
            was_live
        };
        if was_live {
            self.send_close(&entry.id);
        }
        info!(subscription = %entry.id, "subscription closed");
        self.refresh_summary();
        entry.notify(Notify::Close);
        true
    }

    fn stop_entry(&self, entry: &Entry) -> bool {
        let was_live = {
            let mut st = entry.lock();
            if st.descriptor.state.is_terminal() {
                return false;
            }
            st.retry.cancel();
            let was_live =
                st.descriptor.state == SubscriptionState::Active && st.session.take().is_some();
            st.queued = false;
            entry.set_state(&mut st, SubscriptionState::Idle);
            entry.publish(&st);
            was_live
        };
        if was_live {
            self.send_close(&entry.id);
        }
        self.refresh_summary();
        true
    }

    fn pause_entry(&self, entry: &Entry) -> bool {
        {
            let mut st = entry.lock();
            if st.descriptor.state != SubscriptionState::Active {
                return false;
            }
            st.session = None;
            entry.set_state(&mut st, SubscriptionState::Paused);
            entry.publish(&st);
        }
        self.send_close(&entry.id);
        self.refresh_summary();
        true
    }

    async fn resume_entry(self: &Arc<Self>, entry: &Arc<Entry>) -> bool {
        if entry.current_state() != SubscriptionState::Paused {
            return false;
        }
        self.start(entry).await;
        true
    }

    async fn restart_entry(self: &Arc<Self>, entry: &Arc<Entry>) -> bool {
        let was_live = {
            let mut st = entry.lock();
            if st.descriptor.state.is_terminal() {
                return false;
            }
            st.retry.reset();
            let was_live =
                st.descriptor.state == SubscriptionState::Active && st.session.take().is_some();
            st.descriptor.reconnect_attempts = 0;
            st.descriptor.eose_received = false;
            st.descriptor.last_error = None;
            entry.set_state(&mut st, SubscriptionState::Idle);
            entry.publish(&st);
            was_live
        };
        if was_live {
            self.send_close(&entry.id);
        }
        self.start(entry).await;
        true
    }

    fn arm_timeout(self: &Arc<Self>, entry: &Arc<Entry>, after: Duration) {
        let token = CancellationToken::new();
        entry.lock().timeout = Some(token.clone());
        let inner = Arc::clone(self);
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    if inner.close_entry(&entry) {
                        info!(subscription = %entry.id, "subscription timed out");
                    }
                }
            }
        });
    }

    async fn dispatch(
        self: Arc<Self>,
        mut messages: broadcast::Receiver<InboundMessage>,
        mut status: watch::Receiver<ConnectionStatus>,
    ) {
        loop {
            tokio::select! {
                received = messages.recv() => match received {
                    Ok(message) => self.on_message(message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscription dispatcher lagged behind relay frames");
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = status.borrow_and_update().clone();
                    self.on_status(&snapshot);
                }
            }
        }
    }
}

/// Manager for live relay queries.
///
/// Construct one per connection; dropping the manager stops dispatching.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use cohort_relay_core::subscription::{SubscriptionHandlers, SubscriptionManager, SubscriptionOptions};
/// use nostr::{Filter, Kind};
///
/// let subscriptions = SubscriptionManager::new(Arc::clone(&connection));
/// let handle = subscriptions
///     .create(
///         vec![Filter::new().kind(Kind::TextNote)],
///         SubscriptionHandlers::new().on_event(|event| println!("{}", event.content)),
///         SubscriptionOptions::new().close_on_eose(true),
///     )
///     .await?;
/// ```
pub struct SubscriptionManager {
    inner: Arc<Inner>,
    dispatcher: JoinHandle<()>,
}

impl SubscriptionManager {
    /// Creates a manager on top of `connection` and starts dispatching.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        let messages = connection.messages();
        let status = connection.watch_status();
        let (summary_tx, _) = watch::channel(StateSummary::default());
        let inner = Arc::new(Inner {
            connection,
            subscriptions: Mutex::new(HashMap::new()),
            summary_tx,
        });
        let dispatcher = tokio::spawn(Arc::clone(&inner).dispatch(messages, status));
        Self { inner, dispatcher }
    }

    /// Registers a subscription and issues its query.
    ///
    /// If the link is not ready the subscription stays `idle` and starts
    /// once it is. A subscription with the same id is closed first.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidFilters`] if `filters` is empty
    /// - [`SubscriptionError::InvalidId`] if the id is empty or too long
    pub async fn create(
        &self,
        filters: Vec<Filter>,
        handlers: SubscriptionHandlers,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionHandle> {
        if filters.is_empty() {
            return Err(SubscriptionError::InvalidFilters(
                "at least one filter is required".to_string(),
            ));
        }
        let id = options.id.clone().unwrap_or_else(generate_id);
        if id.is_empty() || id.len() > MAX_SUBSCRIPTION_ID_LEN {
            return Err(SubscriptionError::InvalidId(format!(
                "must be 1 to {MAX_SUBSCRIPTION_ID_LEN} characters"
            )));
        }

        let previous = lock(&self.inner.subscriptions).remove(&id);
        if let Some(previous) = previous {
            debug!(subscription = %id, "replacing subscription with the same id");
            self.inner.close_entry(&previous);
        }

        let timeout = options.timeout;
        let entry = Arc::new(Entry::new(id.clone(), filters, options, handlers));
        lock(&self.inner.subscriptions).insert(id, Arc::clone(&entry));
        if let Some(after) = timeout {
            self.inner.arm_timeout(&entry, after);
        }
        self.inner.refresh_summary();

        self.inner.start(&entry).await;

        Ok(SubscriptionHandle {
            entry,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Returns a handle to a registered subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`] if no such id is registered.
    pub fn get(&self, id: &str) -> Result<SubscriptionHandle> {
        let entry = self
            .inner
            .entry(id)
            .ok_or_else(|| SubscriptionError::NotFound(id.to_string()))?;
        Ok(SubscriptionHandle {
            entry,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Closes every subscription. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        self.inner
            .entries()
            .iter()
            .filter(|entry| self.inner.close_entry(entry))
            .count()
    }

    /// Pauses every active subscription. Returns how many were paused.
    pub fn pause_all(&self) -> usize {
        self.inner
            .entries()
            .iter()
            .filter(|entry| self.inner.pause_entry(entry))
            .count()
    }

    /// Resumes every paused subscription. Returns how many were resumed.
    pub async fn resume_all(&self) -> usize {
        let mut resumed = 0;
        for entry in self.inner.entries() {
            if self.inner.resume_entry(&entry).await {
                resumed += 1;
            }
        }
        resumed
    }

    /// Removes closed and errored subscriptions. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let removed = {
            let mut subscriptions = lock(&self.inner.subscriptions);
            let before = subscriptions.len();
            subscriptions.retain(|_, entry| !entry.current_state().is_terminal());
            before - subscriptions.len()
        };
        self.inner.refresh_summary();
        removed
    }

    /// Counts registered subscriptions by state.
    #[must_use]
    pub fn summary(&self) -> StateSummary {
        let mut summary = StateSummary::default();
        for entry in self.inner.entries() {
            summary.record(entry.current_state());
        }
        summary
    }

    /// Returns an observer of the count-by-state summary.
    #[must_use]
    pub fn watch_summary(&self) -> watch::Receiver<StateSummary> {
        self.inner.summary_tx.subscribe()
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.subscriptions).len()
    }

    /// Returns whether no subscriptions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.dispatcher.abort();
        for entry in self.inner.entries() {
            let mut st = entry.lock();
            st.retry.cancel();
            if let Some(timeout) = st.timeout.take() {
                timeout.cancel();
            }
        }
    }
}

/// Handle to one subscription.
///
/// Handles are cheap to clone; dropping one does not close the
/// subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    entry: Arc<Entry>,
    inner: Arc<Inner>,
}

impl SubscriptionHandle {
    /// The subscription id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    /// Returns the latest descriptor snapshot.
    #[must_use]
    pub fn descriptor(&self) -> SubscriptionDescriptor {
        self.entry.meta_tx.borrow().clone()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.entry.current_state()
    }

    /// Returns an observer of the descriptor.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SubscriptionDescriptor> {
        self.entry.meta_tx.subscribe()
    }

    /// Stops receiving events while keeping the subscription.
    ///
    /// Returns false unless the subscription was `active`.
    pub fn pause(&self) -> bool {
        self.inner.pause_entry(&self.entry)
    }

    /// Re-issues a paused subscription.
    ///
    /// Returns false unless the subscription was `paused`.
    pub async fn resume(&self) -> bool {
        self.inner.resume_entry(&self.entry).await
    }

    /// Re-issues the query from scratch, clearing retry state.
    ///
    /// Returns false if the subscription is terminal.
    pub async fn restart(&self) -> bool {
        self.inner.restart_entry(&self.entry).await
    }

    /// Returns the subscription to `idle` without closing it.
    ///
    /// Returns false if the subscription is terminal.
    pub fn stop(&self) -> bool {
        self.inner.stop_entry(&self.entry)
    }

    /// Closes the subscription permanently and fires `on_close`.
    ///
    /// Returns false if it was already terminal.
    pub fn close(&self) -> bool {
        self.inner.close_entry(&self.entry)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.entry.id)
            .field("state", &self.entry.current_state())
            .field("groupable", &self.entry.options.groupable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::MockConnector;
    use crate::relay::ConnectionOptions;

    fn connection() -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::with_connector(
            Arc::new(MockConnector::new()),
            ConnectionOptions::default(),
        ))
    }

    #[test]
    fn generated_ids_are_unique_and_short() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.len() <= MAX_SUBSCRIPTION_ID_LEN);
        assert!(a.starts_with("sub-"));
    }

    #[tokio::test]
    async fn create_rejects_empty_filters() {
        let manager = SubscriptionManager::new(connection());
        let result = manager
            .create(vec![], SubscriptionHandlers::new(), SubscriptionOptions::new())
            .await;

        assert!(matches!(result, Err(SubscriptionError::InvalidFilters(_))));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_oversized_id() {
        let manager = SubscriptionManager::new(connection());
        let result = manager
            .create(
                vec![Filter::new()],
                SubscriptionHandlers::new(),
                SubscriptionOptions::new().with_id("x".repeat(65)),
            )
            .await;

        assert!(matches!(result, Err(SubscriptionError::InvalidId(_))));
    }

    #[tokio::test]
    async fn create_without_link_stays_idle() {
        let manager = SubscriptionManager::new(connection());
        let handle = manager
            .create(
                vec![Filter::new()],
                SubscriptionHandlers::new(),
                SubscriptionOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(handle.state(), SubscriptionState::Idle);
        assert_eq!(manager.summary().idle, 1);
        assert!(handle.descriptor().last_error.is_some());
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let manager = SubscriptionManager::new(connection());
        assert!(matches!(
            manager.get("missing"),
            Err(SubscriptionError::NotFound(_))
        ));
    }
}
