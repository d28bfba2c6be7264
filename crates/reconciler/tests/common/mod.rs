//! Shared fixtures for reconciler integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use std::sync::{Arc, Once};

use mx_client::{CreateResourceInput, InMemoryClient, ObjectId, PlatformClient};
use mx_core::AttributeMap;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route tracing output through the test harness; `RUST_LOG` filters it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh in-memory platform with default progressions.
pub fn platform() -> Arc<InMemoryClient> {
    init_tracing();
    Arc::new(InMemoryClient::new())
}

/// Desired state of a Postgres data resource without credentials.
pub fn postgres(name: &str) -> AttributeMap {
    AttributeMap::new()
        .with("name", name)
        .with("type", "postgres")
        .with("url", format!("postgres://db.internal/{name}"))
}

/// Register a data resource directly on the platform.
pub async fn seed_resource(client: &InMemoryClient, name: &str) -> ObjectId {
    let input = CreateResourceInput {
        kind: "postgres".to_string(),
        name: name.to_string(),
        url: format!("postgres://db.internal/{name}"),
        metadata: None,
        credentials: None,
        ssh_tunnel: None,
    };
    client.create_resource(&input).await.unwrap().id
}
