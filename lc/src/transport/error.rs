//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// How the sender should react to a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Slow down; the recipient is skipped for this pass
    RateLimited,
    /// Recipient blocked, kicked or deleted; remove the subscriber
    RecipientGone,
    /// The transport will never accept this payload
    PayloadRejectedPermanent,
    /// The payload may be accepted on a later attempt
    PayloadRejectedRecoverable,
    /// Timeouts, network failures and anything unrecognised
    Unknown,
}

/// Errors returned by a [`Transport`](super::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Recipient gone: {0}")]
    RecipientGone(String),

    #[error("Payload rejected: {message}")]
    PayloadRejected { message: String, permanent: bool },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Classify for the sender's error policy
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::RateLimited { .. } => ErrorClass::RateLimited,
            TransportError::RecipientGone(_) => ErrorClass::RecipientGone,
            TransportError::PayloadRejected { permanent: true, .. } => ErrorClass::PayloadRejectedPermanent,
            TransportError::PayloadRejected { permanent: false, .. } => ErrorClass::PayloadRejectedRecoverable,
            TransportError::ApiError { .. }
            | TransportError::Network(_)
            | TransportError::Timeout(_)
            | TransportError::InvalidResponse(_)
            | TransportError::Config(_) => ErrorClass::Unknown,
        }
    }

    /// Check if a later attempt could succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self.class(),
            ErrorClass::RecipientGone | ErrorClass::PayloadRejectedPermanent
        )
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let rate = TransportError::RateLimited {
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(rate.class(), ErrorClass::RateLimited);
        assert!(rate.is_recoverable());
        assert_eq!(rate.retry_after(), Some(Duration::from_secs(3)));

        let gone = TransportError::RecipientGone("bot was blocked by the user".to_string());
        assert_eq!(gone.class(), ErrorClass::RecipientGone);
        assert!(!gone.is_recoverable());
        assert_eq!(gone.retry_after(), None);

        let permanent = TransportError::PayloadRejected {
            message: "message is too long".to_string(),
            permanent: true,
        };
        assert_eq!(permanent.class(), ErrorClass::PayloadRejectedPermanent);
        assert!(!permanent.is_recoverable());

        let recoverable = TransportError::PayloadRejected {
            message: "message to delete not found".to_string(),
            permanent: false,
        };
        assert_eq!(recoverable.class(), ErrorClass::PayloadRejectedRecoverable);
        assert!(recoverable.is_recoverable());
    }

    #[test]
    fn test_timeout_is_recoverable_unknown() {
        let err = TransportError::Timeout(Duration::from_secs(10));
        assert_eq!(err.class(), ErrorClass::Unknown);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_server_error_is_recoverable() {
        let err = TransportError::ApiError {
            status: 502,
            message: "Bad gateway".to_string(),
        };
        assert!(err.is_recoverable());
    }
}
