//! Declarative convergence of platform objects.
//!
//! An external orchestrator declares what data resources, connectors,
//! pipelines and endpoints should exist. This crate turns each declaration
//! into platform API calls and reports back what was observed:
//!
//! - **Convergers**: one per object kind, create/read/update/delete
//! - **State poller**: bounded, cancellable wait for asynchronous
//!   provisioning to settle
//! - **Transcoder**: table-driven mapping between attribute maps and API
//!   structures
//! - **Data sources**: read-only lookups and catalogs
//! - **Provider**: routes calls by type name and folds errors into
//!   diagnostics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mx_client::InMemoryClient;
//! use mx_core::AttributeMap;
//! use mx_reconciler::{Provider, ProviderConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> mx_reconciler::Result<()> {
//! let client = Arc::new(InMemoryClient::new());
//! let provider = Provider::new(client, ProviderConfig::from_env()?)?;
//!
//! let desired = AttributeMap::new()
//!     .with("name", "orders")
//!     .with("type", "postgres")
//!     .with("url", "postgres://db.internal/orders");
//! let response = provider
//!     .create("meroxa_resource", &desired, &CancellationToken::new())
//!     .await;
//! assert!(response.is_ok());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod catalog;
pub mod config;
pub mod connector;
pub mod converger;
pub mod endpoint;
pub mod error;
pub mod pipeline;
pub mod poller;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod transcode;
pub mod types;

// Re-export main types
pub use catalog::{DataSource, Lookup, LookupKind, ResourceTypes, Transforms};
pub use config::{PollSettings, ProviderConfig};
pub use connector::{ConnectorConverger, Direction};
pub use converger::Converger;
pub use endpoint::EndpointConverger;
pub use error::{Error, Result};
pub use pipeline::PipelineConverger;
pub use poller::{PollError, Polled, StatePoller, TransientError};
pub use provider::{Provider, Response};
pub use resource::ResourceConverger;
pub use schema::{Field, FieldType};
pub use types::{Converged, Identity, ObservedState};
