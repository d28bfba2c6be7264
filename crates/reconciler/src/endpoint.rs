//! Endpoint converger.
//!
//! Endpoints are addressed by name and cannot be changed after creation;
//! every attribute change replaces the endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use mx_client::{CreateEndpointInput, Endpoint, EndpointProtocol, PlatformClient};
use mx_core::{AttributeMap, Diagnostics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::converger::Converger;
use crate::error::{Error, Result};
use crate::schema::{Field, ENDPOINT};
use crate::transcode;
use crate::types::{Converged, Identity, ObservedState};

pub const TYPE_NAME: &str = "meroxa_endpoint";
pub const KIND: &str = "endpoint";

/// Parse the exact protocol label.
///
/// # Errors
///
/// Returns [`Error::Validation`] on `protocol` for anything but `HTTP` or
/// `GRPC`.
pub fn parse_protocol(label: &str) -> Result<EndpointProtocol> {
    EndpointProtocol::parse(label).ok_or_else(|| {
        Error::invalid_attribute(
            "protocol",
            "Protocol not supported",
            "Please use \"HTTP\" or \"GRPC\"",
        )
    })
}

/// Observed-state attributes of an endpoint.
///
/// # Errors
///
/// Returns an attribute error when the response does not match the table.
pub fn observe(endpoint: &Endpoint) -> Result<ObservedState> {
    transcode::flatten_from(KIND, ENDPOINT, endpoint).map_err(Error::from)
}

/// Converges `meroxa_endpoint` objects.
pub struct EndpointConverger {
    client: Arc<dyn PlatformClient>,
}

impl EndpointConverger {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Converger for EndpointConverger {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field] {
        ENDPOINT
    }

    async fn create(&self, desired: &AttributeMap, _cancel: &CancellationToken) -> Result<Converged> {
        let name = desired.require_str("name")?;
        let protocol = parse_protocol(desired.require_str("protocol")?)?;
        let stream = desired.require_str("stream")?;

        let input = CreateEndpointInput {
            name: name.to_string(),
            protocol,
            stream: stream.to_string(),
        };
        self.client
            .create_endpoint(&input)
            .await
            .map_err(|e| Error::remote(KIND, name, "create", e))?;
        info!(name, %protocol, stream, "Endpoint created");

        let endpoint = self
            .client
            .get_endpoint(name)
            .await
            .map_err(|e| Error::partially_created(KIND, name, Error::remote(KIND, name, "read", e)))?;
        Ok(Converged::new(name, observe(&endpoint)?))
    }

    async fn read(&self, identity: &Identity) -> Result<Option<Converged>> {
        let name = identity.as_str();
        match self.client.get_endpoint(name).await {
            Ok(endpoint) => Ok(Some(Converged::new(name, observe(&endpoint)?))),
            Err(e) if e.is_not_found() => {
                debug!(name, "Endpoint absent");
                Ok(None)
            }
            Err(e) => Err(Error::remote(KIND, name, "read", e)),
        }
    }

    async fn delete(&self, identity: &Identity) -> Result<Diagnostics> {
        let name = identity.as_str();
        match self.client.delete_endpoint(name).await {
            Ok(()) => info!(name, "Endpoint deleted"),
            Err(e) if e.is_not_found() => warn!(name, "Endpoint already absent"),
            Err(e) => return Err(Error::remote(KIND, name, "delete", e)),
        }
        Ok(Diagnostics::new())
    }
}
