//! Error types for channel write checks.

use thiserror::Error;

use crate::ratelimit::ActionType;

/// Why a write was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The request was malformed; nothing was checked.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The actor lacks the standing for this write.
    #[error("Access denied: {reason}")]
    Denied {
        /// What check failed.
        reason: String,
    },

    /// The actor is allowed but over quota.
    #[error("Rate limit exceeded for {action}, retry in {retry_after_secs}s")]
    RateLimited {
        /// The throttled action.
        action: ActionType,
        /// Seconds until the action would pass.
        retry_after_secs: u64,
    },
}

/// Result type alias for channel write checks.
pub type Result<T> = std::result::Result<T, AccessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = AccessError::Validation("bad actor id".to_string());
        assert_eq!(err.to_string(), "Validation error: bad actor id");
    }

    #[test]
    fn denied_error_display() {
        let err = AccessError::Denied {
            reason: "not whitelisted".to_string(),
        };
        assert_eq!(err.to_string(), "Access denied: not whitelisted");
    }

    #[test]
    fn rate_limited_error_display() {
        let err = AccessError::RateLimited {
            action: ActionType::Message,
            retry_after_secs: 6,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded for message, retry in 6s"
        );
    }
}
