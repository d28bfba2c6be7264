//! Error contract of the remote API client.
//!
//! Callers rely on two classifications: [`ClientError::is_not_found`] so read
//! paths can report an absent object instead of failing, and
//! [`ClientError::is_transient`] so a poll loop knows whether retrying inside
//! its timeout window makes sense.

use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors returned by a [`PlatformClient`](crate::PlatformClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("{kind} '{identifier}' not found")]
    NotFound {
        kind: &'static str,
        identifier: String,
    },

    #[error("authentication failed: {reason}")]
    Unauthorized { reason: String },

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("transport error: {message}")]
    Transport { message: String },
}

impl ClientError {
    /// Create a not found error.
    pub fn not_found(kind: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            kind,
            identifier: identifier.to_string(),
        }
    }

    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an unauthorized error.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Whether the remote object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. }) || matches!(self, Self::Api { status: 404, .. })
    }

    /// Whether repeating the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::Unauthorized { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(ClientError::not_found("resource", 4).is_not_found());
        assert!(ClientError::api(404, "gone").is_not_found());
        assert!(!ClientError::api(400, "bad").is_not_found());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::transport("connection reset").is_transient());
        assert!(ClientError::api(503, "unavailable").is_transient());
        assert!(!ClientError::api(422, "invalid").is_transient());
        assert!(!ClientError::unauthorized("token expired").is_transient());
    }

    #[test]
    fn test_display() {
        let err = ClientError::not_found("connector", "pg-source");
        assert_eq!(err.to_string(), "connector 'pg-source' not found");
    }
}
