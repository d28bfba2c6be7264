//! Provider dispatcher.
//!
//! The [`Provider`] is what the declarative orchestrator talks to. It routes
//! each call by type name to a registered [`Converger`] or [`DataSource`]
//! and folds the outcome into a [`Response`]: observed state plus ordered
//! diagnostics. Errors never escape as `Err`; they become error diagnostics.

use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;
use mx_client::PlatformClient;
use mx_core::{AttributeMap, Diagnostics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{DataSource, Lookup, LookupKind, ResourceTypes, Transforms};
use crate::config::ProviderConfig;
use crate::connector::ConnectorConverger;
use crate::converger::Converger;
use crate::endpoint::EndpointConverger;
use crate::error::{Error, Result};
use crate::pipeline::PipelineConverger;
use crate::resource::ResourceConverger;
use crate::schema::{self, Field};
use crate::types::{Converged, Identity, ObservedState};

/// Outcome of one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Identity to persist. `None` when the object is absent or was never
    /// created.
    pub identity: Option<Identity>,
    pub state: Option<ObservedState>,
    pub diagnostics: Diagnostics,
}

impl Response {
    /// The object does not exist.
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    /// A failed call. When the remote object was created before the failure,
    /// its identity and `{id}` state are kept so the orchestrator still
    /// tracks it.
    #[must_use]
    pub fn failed(err: &Error) -> Self {
        let identity = err.created_identity().map(Identity::new);
        let state = identity
            .as_ref()
            .map(|id| AttributeMap::new().with("id", id.as_str()));
        Self {
            identity,
            state,
            diagnostics: err.to_diagnostic().into(),
        }
    }

    /// No error diagnostics were raised.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

impl From<Converged> for Response {
    fn from(converged: Converged) -> Self {
        Self {
            identity: Some(converged.identity),
            state: Some(converged.state),
            diagnostics: converged.diagnostics,
        }
    }
}

/// Routes orchestrator calls to convergers and data sources by type name.
pub struct Provider {
    config: ProviderConfig,
    convergers: BTreeMap<&'static str, Arc<dyn Converger>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl Provider {
    /// Validate `config` and register every kind against `client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the configuration is unusable.
    pub fn new(client: Arc<dyn PlatformClient>, config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let mut provider = Self {
            convergers: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            config,
        };

        provider.register(Arc::new(
            ResourceConverger::new(Arc::clone(&client))
                .with_poll_settings(provider.config.resource_poll.clone()),
        ));
        provider.register(Arc::new(
            ConnectorConverger::new(Arc::clone(&client))
                .with_poll_settings(provider.config.connector_poll.clone()),
        ));
        provider.register(Arc::new(PipelineConverger::new(Arc::clone(&client))));
        provider.register(Arc::new(EndpointConverger::new(Arc::clone(&client))));

        provider.register_data_source(Arc::new(ResourceTypes::new(Arc::clone(&client))));
        provider.register_data_source(Arc::new(Transforms::new(Arc::clone(&client))));
        for kind in [
            LookupKind::Resource,
            LookupKind::Connector,
            LookupKind::Pipeline,
            LookupKind::Endpoint,
        ] {
            provider.register_data_source(Arc::new(Lookup::new(Arc::clone(&client), kind)));
        }

        info!(
            api_url = provider.config.api_url.as_deref().unwrap_or("default"),
            resources = %provider.convergers.keys().join(", "),
            data_sources = %provider.data_sources.keys().join(", "),
            debug = provider.config.debug,
            "Provider configured"
        );
        Ok(provider)
    }

    /// Register a converger under its type name, replacing any previous one.
    pub fn register(&mut self, converger: Arc<dyn Converger>) {
        self.convergers.insert(converger.type_name(), converger);
    }

    /// Register a data source under its type name.
    pub fn register_data_source(&mut self, source: Arc<dyn DataSource>) {
        self.data_sources.insert(source.type_name(), source);
    }

    /// Registered resource type names, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.convergers.keys().copied()
    }

    /// Registered data source type names, sorted.
    pub fn data_source_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.data_sources.keys().copied()
    }

    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn converger(&self, kind: &str) -> Result<&Arc<dyn Converger>> {
        self.convergers
            .get(kind)
            .ok_or_else(|| Error::unknown_kind(kind))
    }

    pub async fn create(
        &self,
        kind: &str,
        desired: &AttributeMap,
        cancel: &CancellationToken,
    ) -> Response {
        let outcome = match self.converger(kind) {
            Ok(converger) => converger
                .create(desired, cancel)
                .await
                .map(|c| (c, converger.fields())),
            Err(e) => Err(e),
        };
        self.respond(kind, "create", outcome)
    }

    pub async fn read(&self, kind: &str, identity: &Identity) -> Response {
        let outcome = match self.converger(kind) {
            Ok(converger) => converger.read(identity).await.map(|found| {
                found.map(|c| (c, converger.fields()))
            }),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(Some(found)) => self.respond(kind, "read", Ok(found)),
            Ok(None) => {
                debug!(kind, %identity, "Object absent");
                Response::absent()
            }
            Err(e) => self.respond(kind, "read", Err(e)),
        }
    }

    pub async fn update(
        &self,
        kind: &str,
        identity: &Identity,
        desired: &AttributeMap,
        changed: &[String],
        cancel: &CancellationToken,
    ) -> Response {
        let outcome = match self.converger(kind) {
            Ok(converger) => converger
                .update(identity, desired, changed, cancel)
                .await
                .map(|c| (c, converger.fields())),
            Err(e) => Err(e),
        };
        self.respond(kind, "update", outcome)
    }

    pub async fn delete(&self, kind: &str, identity: &Identity) -> Response {
        let outcome = match self.converger(kind) {
            Ok(converger) => converger.delete(identity).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(diagnostics) => {
                info!(kind, %identity, "Delete complete");
                Response {
                    diagnostics,
                    ..Response::absent()
                }
            }
            Err(e) => self.respond(kind, "delete", Err(e)),
        }
    }

    pub async fn read_data(&self, kind: &str, query: &AttributeMap) -> Response {
        let outcome = match self.data_sources.get(kind) {
            Some(source) => source.read(query).await.map(|c| (c, source.fields())),
            None => Err(Error::unknown_kind(kind)),
        };
        self.respond(kind, "read_data", outcome)
    }

    fn respond(
        &self,
        kind: &str,
        operation: &'static str,
        outcome: Result<(Converged, &'static [Field])>,
    ) -> Response {
        match outcome {
            Ok((converged, fields)) => {
                info!(
                    kind,
                    operation,
                    identity = %converged.identity,
                    warnings = converged.diagnostics.len(),
                    "Operation complete"
                );
                if self.config.debug {
                    let state = schema::redacted(fields, &converged.state);
                    info!(kind, operation, ?state, "Observed state");
                }
                Response::from(converged)
            }
            Err(e) => {
                warn!(
                    kind,
                    operation,
                    error = %e,
                    retryable = e.is_retryable(),
                    created = e.created_identity().unwrap_or(""),
                    "Operation failed"
                );
                Response::failed(&e)
            }
        }
    }
}
