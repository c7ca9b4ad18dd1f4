//! Error types for subscription management.

use thiserror::Error;

/// Error type for subscription operations.
///
/// Only request validation surfaces as an error. Failures of a running
/// subscription are reported through its descriptor and `on_error`
/// handler instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The filter list was empty or unusable.
    #[error("Invalid filters: {0}")]
    InvalidFilters(String),

    /// The requested subscription id cannot be used on the wire.
    #[error("Invalid subscription id: {0}")]
    InvalidId(String),

    /// No subscription with this id is registered.
    #[error("Subscription not found: {0}")]
    NotFound(String),
}

/// Result type alias for subscription operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
