//! Synchronous kinds: pipelines and endpoints.

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

mod common;

use std::collections::BTreeMap;

use mx_client::{ApiCall, ClientError, UpdatePipelineInput};
use mx_core::AttributeMap;
use mx_reconciler::{Converger, EndpointConverger, Error, Identity, PipelineConverger};
use tokio_util::sync::CancellationToken;

fn endpoint(protocol: &str) -> AttributeMap {
    AttributeMap::new()
        .with("name", "orders-http")
        .with("protocol", protocol)
        .with("stream", "resource-1-2.public.orders")
}

#[tokio::test]
async fn pipeline_create_update_delete() {
    let client = common::platform();
    let converger = PipelineConverger::new(client.clone());
    let metadata = BTreeMap::from([("team".to_string(), "data".to_string())]);

    let created = converger
        .create(
            &AttributeMap::new().with("name", "orders").with("metadata", metadata),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(created.state.get_str("name").unwrap(), Some("orders"));
    assert_eq!(created.state.get_str("state").unwrap(), Some("healthy"));

    let renamed = converger
        .update(
            &created.identity,
            &AttributeMap::new().with("name", "orders-v2"),
            &["name".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(renamed.state.get_str("name").unwrap(), Some("orders-v2"));
    assert_eq!(renamed.identity, created.identity);

    let sent = client
        .calls()
        .await
        .into_iter()
        .find_map(|call| match call {
            ApiCall::UpdatePipeline { input, .. } => Some(input),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        sent,
        UpdatePipelineInput {
            name: Some("orders-v2".to_string()),
            metadata: None,
        }
    );

    converger.delete(&created.identity).await.unwrap();
    assert!(converger.read(&created.identity).await.unwrap().is_none());
    converger.delete(&created.identity).await.unwrap();
}

#[tokio::test]
async fn pipeline_identity_must_be_numeric() {
    let client = common::platform();
    let converger = PipelineConverger::new(client.clone());

    let err = converger.read(&Identity::from("orders")).await.unwrap_err();

    assert!(matches!(err, Error::InvalidIdentity { .. }));
    assert!(client.calls().await.is_empty());
}

#[tokio::test]
async fn pipeline_remote_failure_is_fatal() {
    let client = common::platform();
    let converger = PipelineConverger::new(client.clone());
    client
        .fail_next("create_pipeline", ClientError::unauthorized("token expired"))
        .await;

    let err = converger
        .create(&AttributeMap::new().with("name", "orders"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote { operation: "create", .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn websocket_endpoint_is_rejected_without_calls() {
    let client = common::platform();
    let converger = EndpointConverger::new(client.clone());

    let err = converger
        .create(&endpoint("WEBSOCKET"), &CancellationToken::new())
        .await
        .unwrap_err();

    let diagnostic = err.to_diagnostic();
    assert_eq!(diagnostic.summary, "Protocol not supported");
    assert_eq!(diagnostic.detail, "Please use \"HTTP\" or \"GRPC\"");
    assert!(client.calls().await.is_empty());
}

#[tokio::test]
async fn endpoint_is_read_back_by_name() {
    let client = common::platform();
    let converger = EndpointConverger::new(client.clone());

    let created = converger
        .create(&endpoint("GRPC"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(created.identity, Identity::from("orders-http"));
    assert_eq!(created.state.get_str("protocol").unwrap(), Some("GRPC"));
    assert_eq!(created.state.get_bool("ready").unwrap(), Some(true));
    assert_eq!(
        created.state.get_str("host").unwrap(),
        Some("orders-http.endpoints.mx.local")
    );
    assert_eq!(
        created.state.get_str("basic_auth_username").unwrap(),
        Some("orders-http-user")
    );
    assert!(created.state.get_str("basic_auth_password").unwrap().is_some());
}

#[tokio::test]
async fn endpoint_changes_require_replacement() {
    let client = common::platform();
    let converger = EndpointConverger::new(client.clone());
    let created = converger
        .create(&endpoint("HTTP"), &CancellationToken::new())
        .await
        .unwrap();
    let before = client.calls().await.len();

    let err = converger
        .update(
            &created.identity,
            &endpoint("GRPC"),
            &["protocol".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequiresReplacement { .. }));

    let err = converger
        .update(&created.identity, &endpoint("HTTP"), &[], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpdateUnsupported { kind: "endpoint" }));
    assert_eq!(client.calls().await.len(), before);
}

#[tokio::test]
async fn endpoint_delete_is_idempotent() {
    let client = common::platform();
    let converger = EndpointConverger::new(client.clone());
    let created = converger
        .create(&endpoint("HTTP"), &CancellationToken::new())
        .await
        .unwrap();

    converger.delete(&created.identity).await.unwrap();
    assert!(converger.read(&created.identity).await.unwrap().is_none());
    assert!(converger.delete(&created.identity).await.unwrap().is_empty());
}
