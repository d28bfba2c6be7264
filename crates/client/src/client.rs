//! The remote platform API seam.

use async_trait::async_trait;

use crate::error::ClientResult;
use crate::model::{
    Connector, ConnectorAction, CreateConnectorInput, CreateEndpointInput, CreatePipelineInput,
    CreateResourceInput, Endpoint, ObjectId, Pipeline, Resource, Transform,
    UpdateConnectorInput, UpdatePipelineInput, UpdateResourceInput,
};

/// Typed operations of the platform control-plane API.
///
/// Implementations own transport, authentication and marshaling. A missing
/// object must be reported as [`ClientError::NotFound`](crate::ClientError::NotFound)
/// (or a 404 [`ClientError::Api`](crate::ClientError::Api)).
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Whether the client already retries transient failures itself.
    ///
    /// Poll loops only retry transient errors when this is `false`.
    fn retries_transient(&self) -> bool {
        false
    }

    // Data resources
    async fn create_resource(&self, input: &CreateResourceInput) -> ClientResult<Resource>;
    async fn get_resource(&self, id: ObjectId) -> ClientResult<Resource>;
    async fn get_resource_by_name(&self, name: &str) -> ClientResult<Resource>;
    async fn update_resource(
        &self,
        name: &str,
        input: &UpdateResourceInput,
    ) -> ClientResult<Resource>;
    async fn delete_resource(&self, id: ObjectId) -> ClientResult<()>;
    async fn list_resource_types(&self) -> ClientResult<Vec<String>>;

    // Connectors
    async fn create_connector(&self, input: &CreateConnectorInput) -> ClientResult<Connector>;
    async fn get_connector(&self, id: ObjectId) -> ClientResult<Connector>;
    async fn get_connector_by_name(&self, name: &str) -> ClientResult<Connector>;
    async fn update_connector_status(
        &self,
        name: &str,
        action: ConnectorAction,
    ) -> ClientResult<Connector>;
    async fn update_connector(
        &self,
        name: &str,
        input: &UpdateConnectorInput,
    ) -> ClientResult<Connector>;
    async fn delete_connector(&self, id: ObjectId) -> ClientResult<()>;

    // Pipelines
    async fn create_pipeline(&self, input: &CreatePipelineInput) -> ClientResult<Pipeline>;
    async fn get_pipeline(&self, id: ObjectId) -> ClientResult<Pipeline>;
    async fn get_pipeline_by_name(&self, name: &str) -> ClientResult<Pipeline>;
    async fn update_pipeline(
        &self,
        id: ObjectId,
        input: &UpdatePipelineInput,
    ) -> ClientResult<Pipeline>;
    async fn delete_pipeline(&self, id: ObjectId) -> ClientResult<()>;

    // Endpoints
    async fn create_endpoint(&self, input: &CreateEndpointInput) -> ClientResult<()>;
    async fn get_endpoint(&self, name: &str) -> ClientResult<Endpoint>;
    async fn delete_endpoint(&self, name: &str) -> ClientResult<()>;

    // Catalogs
    async fn list_transforms(&self) -> ClientResult<Vec<Transform>>;
}
