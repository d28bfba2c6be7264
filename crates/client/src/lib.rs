//! Remote platform API seam.
//!
//! The reconciler never talks HTTP itself. It drives a [`PlatformClient`],
//! whose implementations own transport, authentication and marshaling.
//! [`InMemoryClient`] is the implementation used by tests and dry runs.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod error;
pub mod memory;
pub mod model;

pub use client::PlatformClient;
pub use error::{ClientError, ClientResult};
pub use memory::{ApiCall, InMemoryClient};
pub use model::{
    Connector, ConnectorAction, ConnectorState, CreateConnectorInput, CreateEndpointInput,
    CreatePipelineInput, CreateResourceInput, Credentials, Endpoint, EndpointProtocol, JsonMap,
    ObjectId, Pipeline, PipelineState, Resource, ResourceState, ResourceStatus, SshTunnel,
    SshTunnelInput, Transform, TransformProperty, UpdateConnectorInput, UpdatePipelineInput,
    UpdateResourceInput, CONNECTOR_TYPE_KEY,
};
