//! Error types for the reconciler crate.

use std::time::Duration;

use mx_client::ClientError;
use mx_core::Diagnostic;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Desired state rejected before any remote call.
    #[error("{summary}: {detail}")]
    Validation {
        summary: String,
        detail: String,
        attribute: Option<String>,
    },

    /// An immutable attribute changed; the object must be recreated.
    #[error("changing '{attribute}' on {kind} requires replacement")]
    RequiresReplacement {
        kind: &'static str,
        attribute: String,
    },

    /// The stored identity cannot address the remote object.
    #[error("invalid {kind} identity '{identity}': expected a numeric id")]
    InvalidIdentity { kind: &'static str, identity: String },

    /// Desired state does not have the expected shape.
    #[error("malformed attribute: {0}")]
    Attribute(#[from] mx_core::Error),

    /// The platform API rejected or failed a call.
    #[error("{operation} {kind} '{identity}' failed")]
    Remote {
        kind: &'static str,
        identity: String,
        operation: &'static str,
        #[source]
        source: ClientError,
    },

    /// Still pending when the poll window closed.
    #[error("timed out after {elapsed:?} waiting for {kind} '{identity}' (last state: {last_state})")]
    Timeout {
        kind: &'static str,
        identity: String,
        last_state: String,
        elapsed: Duration,
    },

    /// Provisioning ended in a failure state.
    #[error("{kind} '{identity}' reached terminal state '{state}'")]
    TerminalState {
        kind: &'static str,
        identity: String,
        state: String,
    },

    #[error("wait for {kind} '{identity}' was cancelled")]
    Cancelled { kind: &'static str, identity: String },

    #[error("{kind} does not support in-place updates")]
    UpdateUnsupported { kind: &'static str },

    /// The create call succeeded but the object never converged.
    #[error("{kind} '{identity}' was created but did not converge")]
    PartiallyCreated {
        kind: &'static str,
        identity: String,
        #[source]
        source: Box<Error>,
    },

    #[error("unknown kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a validation error.
    pub fn validation(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Validation {
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Create a validation error pointing at an attribute.
    pub fn invalid_attribute(
        attribute: impl Into<String>,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Validation {
            summary: summary.into(),
            detail: detail.into(),
            attribute: Some(attribute.into()),
        }
    }

    /// Create a requires replacement error.
    pub fn requires_replacement(kind: &'static str, attribute: impl Into<String>) -> Self {
        Self::RequiresReplacement {
            kind,
            attribute: attribute.into(),
        }
    }

    /// Create an invalid identity error.
    pub fn invalid_identity(kind: &'static str, identity: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            kind,
            identity: identity.into(),
        }
    }

    /// Wrap a client failure with the object it concerned.
    pub fn remote(
        kind: &'static str,
        identity: impl ToString,
        operation: &'static str,
        source: ClientError,
    ) -> Self {
        Self::Remote {
            kind,
            identity: identity.to_string(),
            operation,
            source,
        }
    }

    /// Record that `identity` exists remotely even though the create failed.
    pub fn partially_created(kind: &'static str, identity: impl ToString, source: Self) -> Self {
        Self::PartiallyCreated {
            kind,
            identity: identity.to_string(),
            source: Box::new(source),
        }
    }

    /// Create an unknown kind error.
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether repeating the operation later may succeed.
    ///
    /// Validation failures and terminal provisioning states are fatal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_transient(),
            Self::Timeout { .. } | Self::Cancelled { .. } => true,
            Self::PartiallyCreated { source, .. } => source.is_retryable(),
            Self::Validation { .. }
            | Self::RequiresReplacement { .. }
            | Self::InvalidIdentity { .. }
            | Self::Attribute(_)
            | Self::TerminalState { .. }
            | Self::UpdateUnsupported { .. }
            | Self::UnknownKind { .. }
            | Self::InvalidConfig { .. } => false,
        }
    }

    /// Identity of an object that exists remotely despite this error.
    #[must_use]
    pub fn created_identity(&self) -> Option<&str> {
        match self {
            Self::PartiallyCreated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Render as an error diagnostic for the orchestrator.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Validation {
                summary,
                detail,
                attribute,
            } => {
                let diagnostic = Diagnostic::error(summary.clone(), detail.clone());
                match attribute {
                    Some(path) => diagnostic.with_attribute(path.clone()),
                    None => diagnostic,
                }
            }
            Self::Attribute(inner) => {
                Diagnostic::error(self.to_string(), String::new()).with_attribute(inner.path())
            }
            Self::RequiresReplacement { attribute, .. } => {
                Diagnostic::from_error(self).with_attribute(attribute.clone())
            }
            _ => Diagnostic::from_error(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_diagnostic_keeps_summary_and_detail() {
        let err = Error::validation("Protocol not supported", "Please use \"HTTP\" or \"GRPC\"");
        let diagnostic = err.to_diagnostic();
        assert!(diagnostic.is_error());
        assert_eq!(diagnostic.summary, "Protocol not supported");
        assert_eq!(diagnostic.detail, "Please use \"HTTP\" or \"GRPC\"");
    }

    #[test]
    fn test_remote_diagnostic_carries_cause() {
        let err = Error::remote(
            "connector",
            "pg-source",
            "create",
            ClientError::api(422, "bad config"),
        );
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.summary, "create connector 'pg-source' failed");
        assert!(diagnostic.detail.contains("bad config"));
    }

    #[test]
    fn test_retryable_classification() {
        let transient = Error::remote("resource", 7, "get", ClientError::transport("reset"));
        assert!(transient.is_retryable());

        let terminal = Error::TerminalState {
            kind: "resource",
            identity: "7".into(),
            state: "failed".into(),
        };
        assert!(!terminal.is_retryable());
        assert!(!Error::validation("x", "y").is_retryable());
    }

    #[test]
    fn test_partially_created_exposes_identity() {
        let timeout = Error::Timeout {
            kind: "resource",
            identity: "12".into(),
            last_state: "starting".into(),
            elapsed: Duration::from_secs(600),
        };
        let err = Error::partially_created("resource", 12, timeout);
        assert_eq!(err.created_identity(), Some("12"));
        assert!(err.is_retryable());
        assert!(err.to_diagnostic().detail.contains("last state: starting"));
    }
}
