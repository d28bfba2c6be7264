//! Core types for the reconciler.

use std::fmt;

use mx_client::ObjectId;
use mx_core::{AttributeMap, Diagnostics};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attributes read back from the platform after an operation.
pub type ObservedState = AttributeMap;

/// Identity of a remote object as persisted by the orchestrator.
///
/// Data resources, connectors and pipelines are addressed by a numeric id
/// rendered as a string; endpoints are addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from its stored form.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The stored form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the numeric id of a `kind` object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] when the identity is not numeric.
    pub fn object_id(&self, kind: &'static str) -> Result<ObjectId> {
        self.0
            .trim()
            .parse()
            .map_err(|_| Error::invalid_identity(kind, &self.0))
    }
}

impl From<ObjectId> for Identity {
    fn from(id: ObjectId) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a successful converger operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Converged {
    pub identity: Identity,
    pub state: ObservedState,
    /// Informational diagnostics; never error severity.
    pub diagnostics: Diagnostics,
}

impl Converged {
    /// Create an outcome without diagnostics.
    pub fn new(identity: impl Into<Identity>, state: ObservedState) -> Self {
        Self {
            identity: identity.into(),
            state,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Attach diagnostics.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }
}
