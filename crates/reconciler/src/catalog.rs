//! Read-only data sources.
//!
//! Data sources have no drift semantics: a lookup that finds nothing is an
//! error, not an absent object.

use std::sync::Arc;

use async_trait::async_trait;
use mx_client::PlatformClient;
use mx_core::{AttributeMap, ResultExt, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::{Field, TRANSFORM};
use crate::types::Converged;
use crate::{connector, endpoint, pipeline, resource, schema, transcode};

/// A read-only query against the platform.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Registered type name, e.g. `meroxa_transforms`.
    fn type_name(&self) -> &'static str;

    /// Attribute table of the result, used to redact it in logs.
    fn fields(&self) -> &'static [Field] {
        &[]
    }

    async fn read(&self, query: &AttributeMap) -> Result<Converged>;
}

/// `meroxa_resource_types`: names of the supported resource types.
pub struct ResourceTypes {
    client: Arc<dyn PlatformClient>,
}

impl ResourceTypes {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for ResourceTypes {
    fn type_name(&self) -> &'static str {
        "meroxa_resource_types"
    }

    async fn read(&self, _query: &AttributeMap) -> Result<Converged> {
        let types = self
            .client
            .list_resource_types()
            .await
            .map_err(|e| Error::remote("resource types", "*", "list", e))?;
        debug!(count = types.len(), "Resource types listed");
        let state = AttributeMap::new().with("resource_types", Value::string_list(types));
        Ok(Converged::new("resource_types", state))
    }
}

/// `meroxa_transforms`: the built-in transform catalog.
pub struct Transforms {
    client: Arc<dyn PlatformClient>,
}

impl Transforms {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for Transforms {
    fn type_name(&self) -> &'static str {
        "meroxa_transforms"
    }

    async fn read(&self, _query: &AttributeMap) -> Result<Converged> {
        let transforms = self
            .client
            .list_transforms()
            .await
            .map_err(|e| Error::remote("transforms", "*", "list", e))?;

        // A catalog entry that does not match the table is skipped, not fatal.
        let items: Vec<Value> = transforms
            .iter()
            .filter_map(|t| transcode::flatten_from("transform", TRANSFORM, t).into_option_logged())
            .map(Value::Map)
            .collect();
        debug!(count = items.len(), "Transforms listed");

        let state = AttributeMap::new().with("transforms", Value::List(items));
        Ok(Converged::new("transforms", state))
    }
}

/// Which object kind a [`Lookup`] finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// By `id` or `name`, exactly one.
    Resource,
    Connector,
    Pipeline,
    Endpoint,
}

impl LookupKind {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Resource => resource::TYPE_NAME,
            Self::Connector => connector::TYPE_NAME,
            Self::Pipeline => pipeline::TYPE_NAME,
            Self::Endpoint => endpoint::TYPE_NAME,
        }
    }

    const fn fields(&self) -> &'static [Field] {
        match self {
            Self::Resource => schema::DATA_RESOURCE,
            Self::Connector => schema::CONNECTOR,
            Self::Pipeline => schema::PIPELINE,
            Self::Endpoint => schema::ENDPOINT,
        }
    }
}

/// Single-object lookup by name (or id, for data resources).
pub struct Lookup {
    client: Arc<dyn PlatformClient>,
    kind: LookupKind,
}

impl Lookup {
    pub fn new(client: Arc<dyn PlatformClient>, kind: LookupKind) -> Self {
        Self { client, kind }
    }

    async fn resource(&self, query: &AttributeMap) -> Result<Converged> {
        let found = match (query.get_set_str("id")?, query.get_set_str("name")?) {
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "Conflicting attributes",
                    "only one of id or name may be set",
                ))
            }
            (None, None) => {
                return Err(Error::validation(
                    "Missing attribute",
                    "one of id or name is required",
                ))
            }
            (Some(raw), None) => {
                let id = raw.trim().parse::<i64>().map_err(|_| {
                    Error::invalid_attribute(
                        "id",
                        "Invalid resource id",
                        format!("'{raw}' is not a numeric resource id"),
                    )
                })?;
                self.client
                    .get_resource(id)
                    .await
                    .map_err(|e| Error::remote(resource::KIND, id, "read", e))?
            }
            (None, Some(name)) => self
                .client
                .get_resource_by_name(name)
                .await
                .map_err(|e| Error::remote(resource::KIND, name, "read", e))?,
        };
        Ok(Converged::new(found.id, resource::observe(&found)?))
    }
}

#[async_trait]
impl DataSource for Lookup {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn fields(&self) -> &'static [Field] {
        self.kind.fields()
    }

    async fn read(&self, query: &AttributeMap) -> Result<Converged> {
        let name = || query.require_str("name").map_err(Error::from);
        match self.kind {
            LookupKind::Resource => self.resource(query).await,
            LookupKind::Connector => {
                let name = name()?;
                let found = self
                    .client
                    .get_connector_by_name(name)
                    .await
                    .map_err(|e| Error::remote(connector::KIND, name, "read", e))?;
                Ok(Converged::new(found.id, connector::observe(&found)?))
            }
            LookupKind::Pipeline => {
                let name = name()?;
                let found = self
                    .client
                    .get_pipeline_by_name(name)
                    .await
                    .map_err(|e| Error::remote(pipeline::KIND, name, "read", e))?;
                Ok(Converged::new(found.id, pipeline::observe(&found)?))
            }
            LookupKind::Endpoint => {
                let name = name()?;
                let found = self
                    .client
                    .get_endpoint(name)
                    .await
                    .map_err(|e| Error::remote(endpoint::KIND, name, "read", e))?;
                Ok(Converged::new(name, endpoint::observe(&found)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use mx_client::InMemoryClient;

    use super::*;

    #[tokio::test]
    async fn test_transforms_flatten_properties() {
        let client = Arc::new(InMemoryClient::new());
        let converged = Transforms::new(client).read(&AttributeMap::new()).await.unwrap();

        let Some(Value::List(items)) = converged.state.get("transforms") else {
            panic!("transforms missing");
        };
        assert_eq!(items.len(), 1);
        let Value::Map(first) = &items[0] else {
            panic!("transform is not a map");
        };
        assert_eq!(first.get_str("name").unwrap(), Some("Flatten"));
        assert_eq!(first.get_str("id").unwrap(), Some("27"));
    }

    #[tokio::test]
    async fn test_resource_lookup_needs_exactly_one_key() {
        let client = Arc::new(InMemoryClient::new());
        let lookup = Lookup::new(client, LookupKind::Resource);

        assert!(matches!(
            lookup.read(&AttributeMap::new()).await,
            Err(Error::Validation { .. })
        ));
        let both = AttributeMap::new().with("id", "1").with("name", "pg");
        assert!(matches!(lookup.read(&both).await, Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_missing_pipeline_is_an_error() {
        let client = Arc::new(InMemoryClient::new());
        let lookup = Lookup::new(client, LookupKind::Pipeline);
        let err = lookup
            .read(&AttributeMap::new().with("name", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { operation: "read", .. }));
    }
}
