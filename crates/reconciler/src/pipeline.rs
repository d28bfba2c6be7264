//! Pipeline converger. Pipelines provision synchronously.

use std::sync::Arc;

use async_trait::async_trait;
use mx_client::{CreatePipelineInput, Pipeline, PlatformClient, UpdatePipelineInput};
use mx_core::{AttributeMap, Diagnostics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::converger::Converger;
use crate::error::{Error, Result};
use crate::schema::{self, Field, PIPELINE};
use crate::transcode;
use crate::types::{Converged, Identity, ObservedState};

pub const TYPE_NAME: &str = "meroxa_pipeline";
pub const KIND: &str = "pipeline";

/// Observed-state attributes of a pipeline.
///
/// # Errors
///
/// Returns an attribute error when the response does not match the table.
pub fn observe(pipeline: &Pipeline) -> Result<ObservedState> {
    transcode::flatten_from(KIND, PIPELINE, pipeline).map_err(Error::from)
}

/// Converges `meroxa_pipeline` objects.
pub struct PipelineConverger {
    client: Arc<dyn PlatformClient>,
}

impl PipelineConverger {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }

    /// Partial update carrying only the changed attributes.
    fn update_input(desired: &AttributeMap, changed: &[String]) -> Result<UpdatePipelineInput> {
        let roots = schema::changed_roots(changed);
        let mut input = UpdatePipelineInput::default();
        if roots.contains("name") {
            input.name = Some(desired.require_str("name")?.to_string());
        }
        if roots.contains("metadata") {
            input.metadata = Some(desired.get_string_map("metadata")?.unwrap_or_default());
        }
        Ok(input)
    }
}

#[async_trait]
impl Converger for PipelineConverger {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field] {
        PIPELINE
    }

    async fn create(&self, desired: &AttributeMap, _cancel: &CancellationToken) -> Result<Converged> {
        let name = desired.require_str("name")?;
        let input: CreatePipelineInput = transcode::expand_into(KIND, PIPELINE, desired)?;
        let pipeline = self
            .client
            .create_pipeline(&input)
            .await
            .map_err(|e| Error::remote(KIND, name, "create", e))?;
        info!(id = pipeline.id, name, "Pipeline created");
        Ok(Converged::new(pipeline.id, observe(&pipeline)?))
    }

    async fn read(&self, identity: &Identity) -> Result<Option<Converged>> {
        let id = identity.object_id(KIND)?;
        match self.client.get_pipeline(id).await {
            Ok(pipeline) => Ok(Some(Converged::new(id, observe(&pipeline)?))),
            Err(e) if e.is_not_found() => {
                debug!(id, "Pipeline absent");
                Ok(None)
            }
            Err(e) => Err(Error::remote(KIND, id, "read", e)),
        }
    }

    async fn update(
        &self,
        identity: &Identity,
        desired: &AttributeMap,
        changed: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Converged> {
        schema::ensure_mutable(KIND, PIPELINE, changed)?;
        let id = identity.object_id(KIND)?;
        let input = Self::update_input(desired, changed)?;

        let pipeline = if input.name.is_none() && input.metadata.is_none() {
            debug!(id, "Nothing to update");
            self.client.get_pipeline(id).await
        } else {
            self.client.update_pipeline(id, &input).await
        }
        .map_err(|e| Error::remote(KIND, id, "update", e))?;

        info!(id, name = %pipeline.name, "Pipeline updated");
        Ok(Converged::new(id, observe(&pipeline)?))
    }

    async fn delete(&self, identity: &Identity) -> Result<Diagnostics> {
        let id = identity.object_id(KIND)?;
        match self.client.delete_pipeline(id).await {
            Ok(()) => info!(id, "Pipeline deleted"),
            Err(e) if e.is_not_found() => warn!(id, "Pipeline already absent"),
            Err(e) => return Err(Error::remote(KIND, id, "delete", e)),
        }
        Ok(Diagnostics::new())
    }
}
