//! Typed request and response structures of the platform API.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque numeric identifier of a remote object.
pub type ObjectId = i64;

/// Free-form JSON metadata attached to a data resource.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

const REDACTED: &str = "<redacted>";

fn redact(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| REDACTED)
}

// ==========================================================================
// Data resources
// ==========================================================================

/// Connection credentials of a data resource.
///
/// Every field is optional and an unset field is omitted from the request
/// body; the API distinguishes "unset" from "empty string".
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &redact(self.password.as_ref()))
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<pem>"))
            .field("client_cert", &self.client_cert.as_ref().map(|_| "<pem>"))
            .field("client_cert_key", &redact(self.client_cert_key.as_ref()))
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// SSH tunnel settings sent on create or update.
///
/// On update, the empty value (blank address, no key) removes the tunnel.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTunnelInput {
    pub address: String,
    /// Write-only: never echoed back by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl SshTunnelInput {
    /// Whether this input asks the platform to drop the tunnel.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.address.is_empty() && self.private_key.is_none()
    }
}

impl fmt::Debug for SshTunnelInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTunnelInput")
            .field("address", &self.address)
            .field("private_key", &redact(self.private_key.as_ref()))
            .finish()
    }
}

/// SSH tunnel as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTunnel {
    pub address: String,
    /// Populated once the platform starts validating the tunnel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Provisioning state of a data resource.
///
/// A label this client does not know is kept verbatim in `Other`, so a
/// caller waiting on the state can report it by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceState {
    Pending,
    Starting,
    Ready,
    Error,
    Failed,
    Other(String),
}

impl ResourceState {
    /// Wire label of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for ResourceState {
    fn from(label: String) -> Self {
        match label.as_str() {
            "pending" => Self::Pending,
            "starting" => Self::Starting,
            "ready" => Self::Ready,
            "error" => Self::Error,
            "failed" => Self::Failed,
            _ => Self::Other(label),
        }
    }
}

impl From<ResourceState> for String {
    fn from(state: ResourceState) -> Self {
        match state {
            ResourceState::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status block of a data resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub state: ResourceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A data resource (database, queue, bucket) registered on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_tunnel: Option<SshTunnel>,
    pub status: ResourceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a data resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResourceInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_tunnel: Option<SshTunnelInput>,
}

/// Partial update of a data resource. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResourceInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_tunnel: Option<SshTunnelInput>,
}

impl UpdateResourceInput {
    /// Whether the update would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.credentials.is_none() && self.ssh_tunnel.is_none()
    }
}

// ==========================================================================
// Connectors
// ==========================================================================

/// Metadata key carrying the connector direction, `source` or `destination`.
pub const CONNECTOR_TYPE_KEY: &str = "mx:connectorType";

/// Runtime state of a connector. Unknown labels land in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectorState {
    Pending,
    Running,
    Paused,
    Failed,
    Degraded,
    Other(String),
}

impl ConnectorState {
    /// Wire label of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Failed => "failed",
            Self::Degraded => "degraded",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for ConnectorState {
    fn from(label: String) -> Self {
        match label.as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "failed" => Self::Failed,
            "degraded" => Self::Degraded,
            _ => Self::Other(label),
        }
    }
}

impl From<ConnectorState> for String {
    fn from(state: ConnectorState) -> Self {
        match state {
            ConnectorState::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition requested on a running connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorAction {
    Pause,
    Resume,
}

impl fmt::Display for ConnectorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// A connector streaming data in or out of a data resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ObjectId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub resource_id: ObjectId,
    #[serde(default, rename = "config")]
    pub configuration: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Raw stream topology as returned by the API.
    #[serde(default)]
    pub streams: serde_json::Map<String, serde_json::Value>,
    pub state: ConnectorState,
    pub pipeline_id: ObjectId,
    pub pipeline_name: String,
}

/// Request body for creating a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConnectorInput {
    pub name: String,
    pub resource_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    #[serde(default, rename = "config")]
    pub configuration: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Configuration replacement for a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConnectorInput {
    #[serde(rename = "config")]
    pub configuration: BTreeMap<String, String>,
}

// ==========================================================================
// Pipelines
// ==========================================================================

/// Informational health of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Healthy,
    Degraded,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// A pipeline grouping connectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: ObjectId,
    pub name: String,
    pub state: PipelineState,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Request body for creating a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePipelineInput {
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Partial update of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePipelineInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

// ==========================================================================
// Endpoints
// ==========================================================================

/// Protocol served by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointProtocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "GRPC")]
    Grpc,
}

impl EndpointProtocol {
    /// Parse the exact, case-sensitive wire label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "HTTP" => Some(Self::Http),
            "GRPC" => Some(Self::Grpc),
            _ => None,
        }
    }

    /// Wire label of the protocol.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Grpc => "GRPC",
        }
    }
}

impl fmt::Display for EndpointProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An endpoint exposing a stream over HTTP or gRPC.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub protocol: EndpointProtocol,
    pub stream: String,
    pub host: String,
    pub ready: bool,
    pub basic_auth_username: String,
    pub basic_auth_password: String,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("stream", &self.stream)
            .field("host", &self.host)
            .field("ready", &self.ready)
            .field("basic_auth_username", &self.basic_auth_username)
            .field("basic_auth_password", &REDACTED)
            .finish()
    }
}

/// Request body for creating an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEndpointInput {
    pub name: String,
    pub protocol: EndpointProtocol,
    pub stream: String,
}

// ==========================================================================
// Catalogs
// ==========================================================================

/// A configurable property of a transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformProperty {
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A built-in record transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub id: ObjectId,
    pub name: String,
    pub required: bool,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Vec<TransformProperty>,
}
