//! Core error types for attribute access.
//!
//! Every accessor on [`AttributeMap`](crate::AttributeMap) is a checked
//! conversion: a value of the wrong shape becomes one of these errors rather
//! than a panic further down the line.

use thiserror::Error;

/// Core error type for attribute operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("attribute '{path}' is required")]
    MissingAttribute { path: String },

    #[error("attribute '{path}' must be {expected}, found {found}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("block '{path}' holds {count} elements, at most one is allowed")]
    InvalidBlock { path: String, count: usize },

    #[error("attribute '{path}' could not be encoded: {reason}")]
    Encoding { path: String, reason: String },
}

impl Error {
    /// Create a missing attribute error.
    pub fn missing(path: impl Into<String>) -> Self {
        Self::MissingAttribute { path: path.into() }
    }

    /// Create a wrong type error.
    pub fn wrong_type(path: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::WrongType {
            path: path.into(),
            expected,
            found,
        }
    }

    /// Create an invalid block error.
    pub fn invalid_block(path: impl Into<String>, count: usize) -> Self {
        Self::InvalidBlock {
            path: path.into(),
            count,
        }
    }

    /// Create an encoding error.
    pub fn encoding(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encoding {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The attribute path the error refers to.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::MissingAttribute { path }
            | Self::WrongType { path, .. }
            | Self::InvalidBlock { path, .. }
            | Self::Encoding { path, .. } => path,
        }
    }

    /// Re-root the error under a single-element block, e.g. `address`
    /// inside `ssh_tunnel` becomes `ssh_tunnel.0.address`.
    #[must_use]
    pub fn nested(self, block: &str) -> Self {
        let reroot = |path: String| {
            if path.is_empty() {
                block.to_string()
            } else {
                format!("{block}.0.{path}")
            }
        };
        match self {
            Self::MissingAttribute { path } => Self::MissingAttribute { path: reroot(path) },
            Self::WrongType {
                path,
                expected,
                found,
            } => Self::WrongType {
                path: reroot(path),
                expected,
                found,
            },
            Self::InvalidBlock { path, count } => Self::InvalidBlock {
                path: reroot(path),
                count,
            },
            Self::Encoding { path, reason } => Self::Encoding {
                path: reroot(path),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::wrong_type("name", "a string", "a bool");
        assert_eq!(err.to_string(), "attribute 'name' must be a string, found a bool");
    }

    #[test]
    fn test_nested_path() {
        let err = Error::missing("address").nested("ssh_tunnel");
        assert_eq!(err.path(), "ssh_tunnel.0.address");
    }

    #[test]
    fn test_nested_empty_path() {
        let err = Error::invalid_block("", 2).nested("credentials");
        assert_eq!(err.path(), "credentials");
    }
}
