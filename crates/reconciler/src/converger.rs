//! The converger seam.
//!
//! One [`Converger`] per remote object kind turns a desired-state record into
//! platform API calls. Convergers hold no state between calls and receive the
//! API client by injection.

use async_trait::async_trait;
use mx_core::{AttributeMap, Diagnostics};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::schema::{self, Field};
use crate::types::{Converged, Identity};

/// Create/read/update/delete of one remote object kind.
#[async_trait]
pub trait Converger: Send + Sync {
    /// Registered type name, e.g. `meroxa_resource`.
    fn type_name(&self) -> &'static str;

    /// Label used in messages, e.g. `resource`.
    fn kind(&self) -> &'static str;

    /// Attribute table of the kind.
    fn fields(&self) -> &'static [Field];

    /// Create the object and wait until it is usable.
    async fn create(&self, desired: &AttributeMap, cancel: &CancellationToken) -> Result<Converged>;

    /// Read the object back. `None` when it no longer exists.
    async fn read(&self, identity: &Identity) -> Result<Option<Converged>>;

    /// Apply the attributes named in `changed`.
    async fn update(
        &self,
        identity: &Identity,
        desired: &AttributeMap,
        changed: &[String],
        cancel: &CancellationToken,
    ) -> Result<Converged> {
        let _ = (identity, desired, cancel);
        schema::ensure_mutable(self.kind(), self.fields(), changed)?;
        Err(Error::UpdateUnsupported { kind: self.kind() })
    }

    /// Delete the object. Deleting an absent object succeeds.
    async fn delete(&self, identity: &Identity) -> Result<Diagnostics>;
}
