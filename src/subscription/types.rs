//! Core types for subscription management.
//!
//! This module defines the per-subscription state machine, the options a
//! caller passes to `create`, the observable descriptor, and the callback
//! set invoked by the dispatcher.

use std::fmt;
use std::time::Duration;

use nostr::{Event, Filter};

/// Default maximum number of reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Lifecycle state of a subscription.
///
/// ```text
/// idle ──▶ active ⇄ paused
///            │  ▲
///            ▼  │
///         reconnecting ──▶ error
///
/// any non-terminal ──▶ closed
/// active/paused/reconnecting ──stop──▶ idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Registered but no REQ is live.
    Idle,
    /// REQ is live and events are delivered.
    Active,
    /// REQ was closed by the caller; resumable.
    Paused,
    /// Link was lost or could not be opened; a retry is scheduled.
    Reconnecting,
    /// Released permanently.
    Closed,
    /// Retries exhausted or the relay refused the subscription.
    Error,
}

impl SubscriptionState {
    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }

    /// Returns whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    /// Returns whether `next` is a legal transition from this state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Idle => matches!(next, Self::Active | Self::Reconnecting | Self::Closed),
            Self::Active => matches!(
                next,
                Self::Paused | Self::Reconnecting | Self::Idle | Self::Closed | Self::Error
            ),
            Self::Paused => {
                matches!(next, Self::Active | Self::Idle | Self::Reconnecting | Self::Closed)
            }
            Self::Reconnecting => {
                matches!(next, Self::Active | Self::Idle | Self::Closed | Self::Error)
            }
            Self::Closed | Self::Error => false,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for creating a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// Subscription id; generated when `None`.
    pub id: Option<String>,
    /// Close automatically once stored events are delivered.
    pub close_on_eose: bool,
    /// Re-issue the query after link loss.
    pub auto_reconnect: bool,
    /// Retries before the subscription gives up with `error`.
    pub max_reconnect_attempts: u32,
    /// Base backoff delay; doubles with every attempt.
    pub reconnect_delay: Duration,
    /// Auto-close after this long. `None` is unbounded.
    pub timeout: Option<Duration>,
    /// Caller hint that this query may share a REQ with others.
    pub groupable: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            id: None,
            close_on_eose: false,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            timeout: None,
            groupable: false,
        }
    }
}

impl SubscriptionOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Closes after EOSE.
    #[must_use]
    pub const fn close_on_eose(mut self, close: bool) -> Self {
        self.close_on_eose = close;
        self
    }

    /// Enables or disables automatic reconnection.
    #[must_use]
    pub const fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the base backoff delay.
    #[must_use]
    pub const fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the auto-close timeout in milliseconds; 0 means unbounded.
    #[must_use]
    pub const fn timeout_ms(mut self, millis: u64) -> Self {
        self.timeout = if millis == 0 {
            None
        } else {
            Some(Duration::from_millis(millis))
        };
        self
    }

    /// Marks the query as groupable.
    #[must_use]
    pub const fn groupable(mut self, groupable: bool) -> Self {
        self.groupable = groupable;
        self
    }
}

/// Observable metadata for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDescriptor {
    /// Subscription id (also the wire id).
    pub id: String,
    /// The query filters.
    pub filters: Vec<Filter>,
    /// Current state.
    pub state: SubscriptionState,
    /// When the subscription was created (Unix milliseconds).
    pub created_at: i64,
    /// When the last event arrived (Unix milliseconds).
    pub last_event_at: Option<i64>,
    /// Events delivered so far.
    pub event_count: u64,
    /// Whether the relay signalled end of stored events.
    pub eose_received: bool,
    /// Reconnect attempts since the last successful start.
    pub reconnect_attempts: u32,
    /// Last failure, if any.
    pub last_error: Option<String>,
}

impl SubscriptionDescriptor {
    pub(crate) fn new(id: String, filters: Vec<Filter>) -> Self {
        Self {
            id,
            filters,
            state: SubscriptionState::Idle,
            created_at: chrono::Utc::now().timestamp_millis(),
            last_event_at: None,
            event_count: 0,
            eose_received: false,
            reconnect_attempts: 0,
            last_error: None,
        }
    }
}

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type SignalCallback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Callbacks invoked by the subscription dispatcher.
///
/// Callbacks run on the dispatcher task and should return quickly; a slow
/// callback delays delivery for every subscription.
#[derive(Default)]
pub struct SubscriptionHandlers {
    pub(crate) on_event: Option<EventCallback>,
    pub(crate) on_eose: Option<SignalCallback>,
    pub(crate) on_close: Option<SignalCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl SubscriptionHandlers {
    /// Creates an empty handler set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every event, in arrival order.
    #[must_use]
    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(f));
        self
    }

    /// Called when stored events are exhausted.
    #[must_use]
    pub fn on_eose(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_eose = Some(Box::new(f));
        self
    }

    /// Called once when the subscription is closed.
    #[must_use]
    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Called with a description of every reported failure.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for SubscriptionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandlers")
            .field("on_event", &self.on_event.is_some())
            .field("on_eose", &self.on_eose.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Count of subscriptions per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSummary {
    /// Subscriptions in `idle`.
    pub idle: usize,
    /// Subscriptions in `active`.
    pub active: usize,
    /// Subscriptions in `paused`.
    pub paused: usize,
    /// Subscriptions in `reconnecting`.
    pub reconnecting: usize,
    /// Subscriptions in `closed`.
    pub closed: usize,
    /// Subscriptions in `error`.
    pub error: usize,
}

impl StateSummary {
    /// Counts one subscription in `state`.
    pub fn record(&mut self, state: SubscriptionState) {
        match state {
            SubscriptionState::Idle => self.idle += 1,
            SubscriptionState::Active => self.active += 1,
            SubscriptionState::Paused => self.paused += 1,
            SubscriptionState::Reconnecting => self.reconnecting += 1,
            SubscriptionState::Closed => self.closed += 1,
            SubscriptionState::Error => self.error += 1,
        }
    }

    /// Total number of registered subscriptions.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.idle + self.active + self.paused + self.reconnecting + self.closed + self.error
    }
}
