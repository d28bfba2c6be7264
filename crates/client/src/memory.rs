//! In-memory platform for tests and local runs.
//!
//! Every call is recorded. Data resources and connectors walk through a
//! scripted state progression, one step per read, so poll loops can be
//! exercised without a live control plane.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::PlatformClient;
use crate::error::{ClientError, ClientResult};
use crate::model::{
    Connector, ConnectorAction, ConnectorState, CreateConnectorInput, CreateEndpointInput,
    CreatePipelineInput, CreateResourceInput, Endpoint, ObjectId, Pipeline, PipelineState,
    Resource, ResourceState, ResourceStatus, SshTunnel, Transform, TransformProperty,
    UpdateConnectorInput, UpdatePipelineInput, UpdateResourceInput, CONNECTOR_TYPE_KEY,
};

const DEFAULT_PIPELINE: &str = "default";

/// A call made against the in-memory platform.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreateResource(CreateResourceInput),
    GetResource(ObjectId),
    GetResourceByName(String),
    UpdateResource {
        name: String,
        input: UpdateResourceInput,
    },
    DeleteResource(ObjectId),
    ListResourceTypes,
    CreateConnector(CreateConnectorInput),
    GetConnector(ObjectId),
    GetConnectorByName(String),
    UpdateConnectorStatus {
        name: String,
        action: ConnectorAction,
    },
    UpdateConnector {
        name: String,
        input: UpdateConnectorInput,
    },
    DeleteConnector(ObjectId),
    CreatePipeline(CreatePipelineInput),
    GetPipeline(ObjectId),
    GetPipelineByName(String),
    UpdatePipeline {
        id: ObjectId,
        input: UpdatePipelineInput,
    },
    DeletePipeline(ObjectId),
    CreateEndpoint(CreateEndpointInput),
    GetEndpoint(String),
    DeleteEndpoint(String),
    ListTransforms,
}

impl ApiCall {
    /// Operation name, matching the [`PlatformClient`] method.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::CreateResource(_) => "create_resource",
            Self::GetResource(_) => "get_resource",
            Self::GetResourceByName(_) => "get_resource_by_name",
            Self::UpdateResource { .. } => "update_resource",
            Self::DeleteResource(_) => "delete_resource",
            Self::ListResourceTypes => "list_resource_types",
            Self::CreateConnector(_) => "create_connector",
            Self::GetConnector(_) => "get_connector",
            Self::GetConnectorByName(_) => "get_connector_by_name",
            Self::UpdateConnectorStatus { .. } => "update_connector_status",
            Self::UpdateConnector { .. } => "update_connector",
            Self::DeleteConnector(_) => "delete_connector",
            Self::CreatePipeline(_) => "create_pipeline",
            Self::GetPipeline(_) => "get_pipeline",
            Self::GetPipelineByName(_) => "get_pipeline_by_name",
            Self::UpdatePipeline { .. } => "update_pipeline",
            Self::DeletePipeline(_) => "delete_pipeline",
            Self::CreateEndpoint(_) => "create_endpoint",
            Self::GetEndpoint(_) => "get_endpoint",
            Self::DeleteEndpoint(_) => "delete_endpoint",
            Self::ListTransforms => "list_transforms",
        }
    }

    /// Whether the call changes remote state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateResource(_)
                | Self::UpdateResource { .. }
                | Self::DeleteResource(_)
                | Self::CreateConnector(_)
                | Self::UpdateConnectorStatus { .. }
                | Self::UpdateConnector { .. }
                | Self::DeleteConnector(_)
                | Self::CreatePipeline(_)
                | Self::UpdatePipeline { .. }
                | Self::DeletePipeline(_)
                | Self::CreateEndpoint(_)
                | Self::DeleteEndpoint(_)
        )
    }
}

#[derive(Default)]
struct Store {
    next_id: ObjectId,
    resources: BTreeMap<ObjectId, Resource>,
    resource_scripts: BTreeMap<ObjectId, VecDeque<ResourceState>>,
    connectors: BTreeMap<ObjectId, Connector>,
    connector_scripts: BTreeMap<ObjectId, VecDeque<ConnectorState>>,
    pipelines: BTreeMap<ObjectId, Pipeline>,
    endpoints: BTreeMap<String, Endpoint>,
    calls: Vec<ApiCall>,
    failures: BTreeMap<&'static str, VecDeque<ClientError>>,
}

impl Store {
    fn allocate_id(&mut self) -> ObjectId {
        self.next_id = self.next_id.saturating_add(1);
        self.next_id
    }

    /// Record the call and fail it if a failure was queued for its operation.
    fn record(&mut self, call: ApiCall) -> ClientResult<()> {
        let operation = call.operation();
        debug!(operation, "In-memory API call");
        self.calls.push(call);
        self.failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
            .map_or(Ok(()), Err)
    }

    fn resource_by_name(&self, name: &str) -> ClientResult<&Resource> {
        self.resources
            .values()
            .find(|r| r.name == name)
            .ok_or_else(|| ClientError::not_found("resource", name))
    }

    fn connector_id_by_name(&self, name: &str) -> ClientResult<ObjectId> {
        self.connectors
            .values()
            .find(|c| c.name == name)
            .map(|c| c.id)
            .ok_or_else(|| ClientError::not_found("connector", name))
    }

    fn pipeline_for(&mut self, input: &CreateConnectorInput) -> ClientResult<Pipeline> {
        match (input.pipeline_id, input.pipeline_name.as_deref()) {
            (Some(id), _) => self
                .pipelines
                .get(&id)
                .cloned()
                .ok_or_else(|| ClientError::not_found("pipeline", id)),
            (None, Some(name)) => self
                .pipelines
                .values()
                .find(|p| p.name == name)
                .cloned()
                .ok_or_else(|| ClientError::not_found("pipeline", name)),
            (None, None) => {
                if let Some(p) = self.pipelines.values().find(|p| p.name == DEFAULT_PIPELINE) {
                    return Ok(p.clone());
                }
                let id = self.allocate_id();
                let pipeline = Pipeline {
                    id,
                    name: DEFAULT_PIPELINE.to_string(),
                    state: PipelineState::Healthy,
                    metadata: BTreeMap::new(),
                };
                self.pipelines.insert(id, pipeline.clone());
                Ok(pipeline)
            }
        }
    }
}

/// In-memory [`PlatformClient`].
pub struct InMemoryClient {
    store: Mutex<Store>,
    resource_progression: Vec<ResourceState>,
    connector_progression: Vec<ConnectorState>,
    resource_types: Vec<String>,
    transforms: Vec<Transform>,
    tunnel_public_key: String,
    retries_transient: bool,
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryClient {
    /// Create a platform where resources go pending, starting, ready and
    /// connectors go pending, running.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            resource_progression: vec![
                ResourceState::Pending,
                ResourceState::Starting,
                ResourceState::Ready,
            ],
            connector_progression: vec![ConnectorState::Pending, ConnectorState::Running],
            resource_types: [
                "postgres",
                "mysql",
                "redshift",
                "url",
                "s3",
                "mongodb",
                "elasticsearch",
                "snowflakedb",
                "bigquery",
                "sqlserver",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            transforms: vec![Transform {
                id: 27,
                name: "Flatten".to_string(),
                required: false,
                description: "Flatten a nested data structure, generating names for each \
                              field by concatenating the field names at each level with a \
                              configurable delimiter character."
                    .to_string(),
                kind: "builtin".to_string(),
                properties: vec![TransformProperty {
                    name: "delimiter".to_string(),
                    required: false,
                    kind: "string".to_string(),
                }],
            }],
            tunnel_public_key: "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQC7 mx-tunnel".to_string(),
            retries_transient: false,
        }
    }

    /// States a new data resource walks through, one per read. The first
    /// state is reported by the create call itself.
    #[must_use]
    pub fn with_resource_progression(
        mut self,
        states: impl IntoIterator<Item = ResourceState>,
    ) -> Self {
        self.resource_progression = states.into_iter().collect();
        self
    }

    /// States a new connector walks through, one per read.
    #[must_use]
    pub fn with_connector_progression(
        mut self,
        states: impl IntoIterator<Item = ConnectorState>,
    ) -> Self {
        self.connector_progression = states.into_iter().collect();
        self
    }

    /// Replace the resource type catalog.
    #[must_use]
    pub fn with_resource_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.resource_types = types.into_iter().collect();
        self
    }

    /// Replace the transform catalog.
    #[must_use]
    pub fn with_transforms(mut self, transforms: Vec<Transform>) -> Self {
        self.transforms = transforms;
        self
    }

    /// Public key handed out once tunnel validation begins.
    #[must_use]
    pub fn with_tunnel_public_key(mut self, key: impl Into<String>) -> Self {
        self.tunnel_public_key = key.into();
        self
    }

    /// Report that this client retries transient failures itself.
    #[must_use]
    pub const fn with_retries_transient(mut self, retries: bool) -> Self {
        self.retries_transient = retries;
        self
    }

    /// Fail the next call of `operation` with `error`.
    pub async fn fail_next(&self, operation: &'static str, error: ClientError) {
        let mut store = self.store.lock().await;
        store.failures.entry(operation).or_default().push_back(error);
    }

    /// All calls made so far, in order.
    pub async fn calls(&self) -> Vec<ApiCall> {
        self.store.lock().await.calls.clone()
    }

    /// Calls that changed remote state.
    pub async fn mutations(&self) -> Vec<ApiCall> {
        self.store
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Number of calls made for one operation.
    pub async fn count(&self, operation: &str) -> usize {
        self.store
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Force a data resource into a state, dropping its remaining script.
    pub async fn set_resource_state(&self, id: ObjectId, state: ResourceState) {
        let mut store = self.store.lock().await;
        store.resource_scripts.remove(&id);
        if let Some(resource) = store.resources.get_mut(&id) {
            resource.status.state = state;
        }
    }

    /// Force a connector into a state, dropping its remaining script.
    pub async fn set_connector_state(&self, id: ObjectId, state: ConnectorState) {
        let mut store = self.store.lock().await;
        store.connector_scripts.remove(&id);
        if let Some(connector) = store.connectors.get_mut(&id) {
            connector.state = state;
        }
    }
}

#[async_trait]
impl PlatformClient for InMemoryClient {
    fn retries_transient(&self) -> bool {
        self.retries_transient
    }

    async fn create_resource(&self, input: &CreateResourceInput) -> ClientResult<Resource> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::CreateResource(input.clone()))?;
        if store.resource_by_name(&input.name).is_ok() {
            return Err(ClientError::api(409, format!("resource name '{}' taken", input.name)));
        }

        let id = store.allocate_id();
        let mut script: VecDeque<ResourceState> =
            self.resource_progression.iter().cloned().collect();
        let state = script.pop_front().unwrap_or(ResourceState::Ready);
        // A tunnelled resource waits for the customer to install the key.
        if input.ssh_tunnel.is_some() {
            script.clear();
        }

        let now = Utc::now();
        let resource = Resource {
            id,
            kind: input.kind.clone(),
            name: input.name.clone(),
            url: input.url.clone(),
            metadata: input.metadata.clone().unwrap_or_default(),
            credentials: input.credentials.clone(),
            ssh_tunnel: input.ssh_tunnel.as_ref().map(|t| SshTunnel {
                address: t.address.clone(),
                public_key: None,
            }),
            status: ResourceStatus {
                state,
                details: None,
            },
            created_at: now,
            updated_at: now,
        };
        store.resources.insert(id, resource.clone());
        store.resource_scripts.insert(id, script);
        Ok(resource)
    }

    async fn get_resource(&self, id: ObjectId) -> ClientResult<Resource> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::GetResource(id))?;
        let next = store
            .resource_scripts
            .get_mut(&id)
            .and_then(VecDeque::pop_front);
        let public_key = self.tunnel_public_key.clone();
        let resource = store
            .resources
            .get_mut(&id)
            .ok_or_else(|| ClientError::not_found("resource", id))?;
        if let Some(state) = next {
            resource.status.state = state;
        }
        if let Some(tunnel) = resource.ssh_tunnel.as_mut() {
            tunnel.public_key.get_or_insert(public_key);
        }
        Ok(resource.clone())
    }

    async fn get_resource_by_name(&self, name: &str) -> ClientResult<Resource> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::GetResourceByName(name.to_string()))?;
        store.resource_by_name(name).cloned()
    }

    async fn update_resource(
        &self,
        name: &str,
        input: &UpdateResourceInput,
    ) -> ClientResult<Resource> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::UpdateResource {
            name: name.to_string(),
            input: input.clone(),
        })?;
        let id = store.resource_by_name(name)?.id;
        let resource = store
            .resources
            .get_mut(&id)
            .ok_or_else(|| ClientError::not_found("resource", id))?;
        if let Some(metadata) = &input.metadata {
            resource.metadata = metadata.clone();
        }
        if let Some(credentials) = &input.credentials {
            resource.credentials = Some(credentials.clone());
        }
        if let Some(tunnel) = &input.ssh_tunnel {
            resource.ssh_tunnel = (!tunnel.is_removal()).then(|| SshTunnel {
                address: tunnel.address.clone(),
                public_key: Some(self.tunnel_public_key.clone()),
            });
        }
        resource.updated_at = Utc::now();
        Ok(resource.clone())
    }

    async fn delete_resource(&self, id: ObjectId) -> ClientResult<()> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::DeleteResource(id))?;
        store.resource_scripts.remove(&id);
        store
            .resources
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("resource", id))
    }

    async fn list_resource_types(&self) -> ClientResult<Vec<String>> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::ListResourceTypes)?;
        Ok(self.resource_types.clone())
    }

    async fn create_connector(&self, input: &CreateConnectorInput) -> ClientResult<Connector> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::CreateConnector(input.clone()))?;
        if store.connector_id_by_name(&input.name).is_ok() {
            return Err(ClientError::api(409, format!("connector name '{}' taken", input.name)));
        }
        let resource = store
            .resources
            .get(&input.resource_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("resource", input.resource_id))?;
        let pipeline = store.pipeline_for(input)?;

        let id = store.allocate_id();
        let direction = input
            .metadata
            .get(CONNECTOR_TYPE_KEY)
            .map_or("source", String::as_str);
        let stream_in = input.configuration.get("input").cloned().unwrap_or_default();
        let output = if direction == "source" {
            vec![format!("resource-{}-{id}.{stream_in}", resource.id)]
        } else {
            Vec::new()
        };
        let mut streams = serde_json::Map::new();
        streams.insert("dynamic".into(), serde_json::Value::Bool(false));
        streams.insert("input".into(), serde_json::json!([stream_in]));
        streams.insert("output".into(), serde_json::json!(output));

        let mut script: VecDeque<ConnectorState> =
            self.connector_progression.iter().cloned().collect();
        let state = script.pop_front().unwrap_or(ConnectorState::Running);

        let connector = Connector {
            id,
            name: input.name.clone(),
            kind: format!("{}-{direction}", resource.kind),
            resource_id: resource.id,
            configuration: input.configuration.clone(),
            metadata: input.metadata.clone(),
            streams,
            state,
            pipeline_id: pipeline.id,
            pipeline_name: pipeline.name,
        };
        store.connectors.insert(id, connector.clone());
        store.connector_scripts.insert(id, script);
        Ok(connector)
    }

    async fn get_connector(&self, id: ObjectId) -> ClientResult<Connector> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::GetConnector(id))?;
        let next = store
            .connector_scripts
            .get_mut(&id)
            .and_then(VecDeque::pop_front);
        let connector = store
            .connectors
            .get_mut(&id)
            .ok_or_else(|| ClientError::not_found("connector", id))?;
        if let Some(state) = next {
            connector.state = state;
        }
        Ok(connector.clone())
    }

    async fn get_connector_by_name(&self, name: &str) -> ClientResult<Connector> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::GetConnectorByName(name.to_string()))?;
        let id = store.connector_id_by_name(name)?;
        store
            .connectors
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("connector", name))
    }

    async fn update_connector_status(
        &self,
        name: &str,
        action: ConnectorAction,
    ) -> ClientResult<Connector> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::UpdateConnectorStatus {
            name: name.to_string(),
            action,
        })?;
        let id = store.connector_id_by_name(name)?;
        let (state, script) = match action {
            ConnectorAction::Pause => (ConnectorState::Paused, VecDeque::new()),
            ConnectorAction::Resume => (
                ConnectorState::Pending,
                VecDeque::from([ConnectorState::Running]),
            ),
        };
        store.connector_scripts.insert(id, script);
        let connector = store
            .connectors
            .get_mut(&id)
            .ok_or_else(|| ClientError::not_found("connector", name))?;
        connector.state = state;
        Ok(connector.clone())
    }

    async fn update_connector(
        &self,
        name: &str,
        input: &UpdateConnectorInput,
    ) -> ClientResult<Connector> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::UpdateConnector {
            name: name.to_string(),
            input: input.clone(),
        })?;
        let id = store.connector_id_by_name(name)?;
        let connector = store
            .connectors
            .get_mut(&id)
            .ok_or_else(|| ClientError::not_found("connector", name))?;
        connector.configuration = input.configuration.clone();
        Ok(connector.clone())
    }

    async fn delete_connector(&self, id: ObjectId) -> ClientResult<()> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::DeleteConnector(id))?;
        store.connector_scripts.remove(&id);
        store
            .connectors
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("connector", id))
    }

    async fn create_pipeline(&self, input: &CreatePipelineInput) -> ClientResult<Pipeline> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::CreatePipeline(input.clone()))?;
        if store.pipelines.values().any(|p| p.name == input.name) {
            return Err(ClientError::api(409, format!("pipeline name '{}' taken", input.name)));
        }
        let id = store.allocate_id();
        let pipeline = Pipeline {
            id,
            name: input.name.clone(),
            state: PipelineState::Healthy,
            metadata: input.metadata.clone(),
        };
        store.pipelines.insert(id, pipeline.clone());
        Ok(pipeline)
    }

    async fn get_pipeline(&self, id: ObjectId) -> ClientResult<Pipeline> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::GetPipeline(id))?;
        store
            .pipelines
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("pipeline", id))
    }

    async fn get_pipeline_by_name(&self, name: &str) -> ClientResult<Pipeline> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::GetPipelineByName(name.to_string()))?;
        store
            .pipelines
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| ClientError::not_found("pipeline", name))
    }

    async fn update_pipeline(
        &self,
        id: ObjectId,
        input: &UpdatePipelineInput,
    ) -> ClientResult<Pipeline> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::UpdatePipeline {
            id,
            input: input.clone(),
        })?;
        let pipeline = store
            .pipelines
            .get_mut(&id)
            .ok_or_else(|| ClientError::not_found("pipeline", id))?;
        if let Some(name) = &input.name {
            pipeline.name.clone_from(name);
        }
        if let Some(metadata) = &input.metadata {
            pipeline.metadata.clone_from(metadata);
        }
        Ok(pipeline.clone())
    }

    async fn delete_pipeline(&self, id: ObjectId) -> ClientResult<()> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::DeletePipeline(id))?;
        store
            .pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("pipeline", id))
    }

    async fn create_endpoint(&self, input: &CreateEndpointInput) -> ClientResult<()> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::CreateEndpoint(input.clone()))?;
        if store.endpoints.contains_key(&input.name) {
            return Err(ClientError::api(409, format!("endpoint name '{}' taken", input.name)));
        }
        let secret = store.allocate_id();
        let endpoint = Endpoint {
            name: input.name.clone(),
            protocol: input.protocol,
            stream: input.stream.clone(),
            host: format!("{}.endpoints.mx.local", input.name),
            ready: true,
            basic_auth_username: format!("{}-user", input.name),
            basic_auth_password: format!("secret-{secret:04}"),
        };
        store.endpoints.insert(input.name.clone(), endpoint);
        Ok(())
    }

    async fn get_endpoint(&self, name: &str) -> ClientResult<Endpoint> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::GetEndpoint(name.to_string()))?;
        store
            .endpoints
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::not_found("endpoint", name))
    }

    async fn delete_endpoint(&self, name: &str) -> ClientResult<()> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::DeleteEndpoint(name.to_string()))?;
        store
            .endpoints
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("endpoint", name))
    }

    async fn list_transforms(&self) -> ClientResult<Vec<Transform>> {
        let mut store = self.store.lock().await;
        store.record(ApiCall::ListTransforms)?;
        Ok(self.transforms.clone())
    }
}
