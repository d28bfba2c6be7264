//! Data resource converger.
//!
//! Data resources provision asynchronously: a create returns a `pending`
//! object that moves through `starting` to `ready`. With an SSH tunnel the
//! resource stays pending until the customer installs the platform's public
//! key, so the wait ends as soon as that key is issued and the caller gets a
//! warning telling them where to paste it.

use std::sync::Arc;

use async_trait::async_trait;
use mx_client::{
    ClientError, CreateResourceInput, Credentials, JsonMap, ObjectId, PlatformClient, Resource,
    ResourceState, SshTunnelInput, UpdateResourceInput,
};
use mx_core::{AttributeMap, Diagnostic, Diagnostics, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PollSettings;
use crate::converger::Converger;
use crate::error::{Error, Result};
use crate::poller::{PollError, StatePoller};
use crate::schema::{self, Field, CREDENTIALS, DATA_RESOURCE, SSH_TUNNEL};
use crate::transcode;
use crate::types::{Converged, Identity, ObservedState};

pub const TYPE_NAME: &str = "meroxa_resource";
pub const KIND: &str = "resource";

const PENDING: [&str; 2] = ["pending", "starting"];
/// Synthetic label: still pending, but the tunnel public key has been issued.
const AWAITING_TUNNEL: &str = "awaiting_tunnel_validation";

/// Converges `meroxa_resource` objects.
pub struct ResourceConverger {
    client: Arc<dyn PlatformClient>,
    settings: PollSettings,
}

impl ResourceConverger {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self {
            client,
            settings: PollSettings::resource(),
        }
    }

    #[must_use]
    pub fn with_poll_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wait until the resource is ready, or until its tunnel key is issued.
    async fn await_ready(
        &self,
        id: ObjectId,
        tunnel: bool,
        cancel: &CancellationToken,
    ) -> Result<Resource> {
        let mut target = vec![ResourceState::Ready.to_string()];
        if tunnel {
            target.push(AWAITING_TUNNEL.to_string());
        }
        let poller = StatePoller::new(PENDING, target)
            .with_settings(self.settings.clone())
            .with_retry_transient(self.settings.retry_transient && !self.client.retries_transient());

        let client = Arc::clone(&self.client);
        let polled = poller
            .wait(cancel, move || {
                let client = Arc::clone(&client);
                async move {
                    let resource = client.get_resource(id).await?;
                    let label = state_label(&resource, tunnel);
                    Ok::<_, ClientError>((resource, label))
                }
            })
            .await
            .map_err(|e| {
                if let PollError::Unexpected { snapshot, state } = &e {
                    warn!(
                        id,
                        state = %state,
                        details = snapshot.status.details.as_deref().unwrap_or_default(),
                        "Data resource provisioning failed"
                    );
                }
                e.into_error(KIND, &id.to_string())
            })?;

        info!(
            id,
            state = %polled.state,
            attempts = polled.attempts,
            elapsed_ms = polled.elapsed.as_millis(),
            "Data resource converged"
        );
        Ok(polled.snapshot)
    }
}

fn state_label(resource: &Resource, tunnel: bool) -> String {
    let state = &resource.status.state;
    let key_issued = resource
        .ssh_tunnel
        .as_ref()
        .is_some_and(|t| t.public_key.is_some());
    if tunnel && key_issued && matches!(state, ResourceState::Pending | ResourceState::Starting) {
        AWAITING_TUNNEL.to_string()
    } else {
        state.to_string()
    }
}

/// Observed-state attributes of a data resource.
///
/// # Errors
///
/// Returns an attribute error when the response does not match the table.
pub fn observe(resource: &Resource) -> Result<ObservedState> {
    transcode::flatten_from(KIND, DATA_RESOURCE, resource).map_err(Error::from)
}

/// Check the URL carries a scheme.
///
/// Inline `user:pass@` credentials alongside a credentials block setting a
/// username or password only produce a warning; the platform decides which
/// one wins.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the URL has no scheme.
pub fn validate_url(raw: &str, credentials: Option<&AttributeMap>) -> Result<Diagnostics> {
    let parsed = Url::parse(raw).map_err(|_| {
        Error::invalid_attribute("url", "URL missing Schema", "Please add correct URL Schema")
    })?;

    let mut diagnostics = Diagnostics::new();
    let inline = !parsed.username().is_empty() || parsed.password().is_some();
    let in_block = match credentials {
        Some(block) => {
            block.get_set_str("username").within("credentials")?.is_some()
                || block.get_set_str("password").within("credentials")?.is_some()
        }
        None => false,
    };
    if inline && in_block {
        diagnostics.push(
            Diagnostic::warning(
                "URL includes credentials",
                "The URL carries a username or password and so does the credentials block. \
                 The platform decides which one takes precedence.",
            )
            .with_attribute("url"),
        );
    }
    Ok(diagnostics)
}

/// Parse the JSON-encoded `metadata` attribute.
///
/// # Errors
///
/// Returns [`Error::Validation`] unless the attribute is a JSON object.
pub fn parse_metadata(desired: &AttributeMap) -> Result<Option<JsonMap>> {
    let Some(raw) = desired.get_set_str("metadata")? else {
        return Ok(None);
    };
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(Error::invalid_attribute(
            "metadata",
            "Invalid metadata",
            "metadata must be a JSON object",
        )),
        Err(e) => Err(Error::invalid_attribute(
            "metadata",
            "Invalid metadata",
            e.to_string(),
        )),
    }
}

fn expand_tunnel(desired: &AttributeMap) -> Result<Option<SshTunnelInput>> {
    let Some(block) = desired.get_block("ssh_tunnel")? else {
        return Ok(None);
    };
    if block.get_set_str("address").within("ssh_tunnel")?.is_none() {
        return Err(Error::invalid_attribute(
            "ssh_tunnel.0.address",
            "SSH tunnel address required",
            "An ssh_tunnel block must set address",
        ));
    }
    Ok(Some(
        transcode::expand_into("ssh_tunnel", SSH_TUNNEL, block).within("ssh_tunnel")?,
    ))
}

fn tunnel_warning(name: &str, public_key: &str) -> Diagnostic {
    Diagnostic::warning(
        "Validate SSH Tunnel",
        format!(
            "Resource {name:?} is successfully created but is pending for validation!\n\
             Paste the following public key on your host:\n{public_key}\n\
             Meroxa will try to connect to the resource for 60 minutes and send an email \
             confirmation after a successful resource validation."
        ),
    )
    .with_attribute("ssh_tunnel")
}

#[async_trait]
impl Converger for ResourceConverger {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field] {
        DATA_RESOURCE
    }

    async fn create(&self, desired: &AttributeMap, cancel: &CancellationToken) -> Result<Converged> {
        let name = desired.require_str("name")?;
        desired.require_str("type")?;
        let url = desired.require_str("url")?;

        let mut diagnostics = validate_url(url, desired.get_block("credentials")?)?;
        parse_metadata(desired)?;
        let tunnel = expand_tunnel(desired)?;

        let input: CreateResourceInput = transcode::expand_into(KIND, DATA_RESOURCE, desired)?;
        let created = self
            .client
            .create_resource(&input)
            .await
            .map_err(|e| Error::remote(KIND, name, "create", e))?;
        let id = created.id;
        info!(id, name, resource_type = %created.kind, "Data resource created");

        let resource = self
            .await_ready(id, tunnel.is_some(), cancel)
            .await
            .map_err(|e| Error::partially_created(KIND, id, e))?;

        if resource.status.state != ResourceState::Ready {
            if let Some(key) = resource.ssh_tunnel.as_ref().and_then(|t| t.public_key.as_deref()) {
                warn!(id, "Data resource awaiting SSH tunnel validation");
                diagnostics.push(tunnel_warning(name, key));
            }
        }

        Ok(Converged::new(id, observe(&resource)?).with_diagnostics(diagnostics))
    }

    async fn read(&self, identity: &Identity) -> Result<Option<Converged>> {
        let id = identity.object_id(KIND)?;
        match self.client.get_resource(id).await {
            Ok(resource) => Ok(Some(Converged::new(id, observe(&resource)?))),
            Err(e) if e.is_not_found() => {
                debug!(id, "Data resource absent");
                Ok(None)
            }
            Err(e) => Err(Error::remote(KIND, id, "read", e)),
        }
    }

    async fn update(
        &self,
        identity: &Identity,
        desired: &AttributeMap,
        changed: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Converged> {
        schema::ensure_mutable(KIND, DATA_RESOURCE, changed)?;
        let id = identity.object_id(KIND)?;
        let name = desired.require_str("name")?;
        let roots = schema::changed_roots(changed);

        let mut diagnostics = Diagnostics::new();
        let mut input = UpdateResourceInput::default();

        if roots.contains("metadata") {
            input.metadata = Some(parse_metadata(desired)?.unwrap_or_default());
        }
        if roots.contains("credentials") {
            let block = desired.get_block("credentials")?;
            diagnostics.extend(validate_url(desired.require_str("url")?, block)?);
            // The whole block is resent; the API has no per-field patch.
            input.credentials = Some(match block {
                Some(block) => {
                    transcode::expand_into::<Credentials>("credentials", CREDENTIALS, block)
                        .within("credentials")?
                }
                None => Credentials::default(),
            });
        }
        if roots.contains("ssh_tunnel") {
            // A dropped block is sent as the empty tunnel, which removes it.
            let tunnel = expand_tunnel(desired)?.unwrap_or_default();
            if tunnel.is_removal() {
                info!(id, name, "Removing SSH tunnel");
            }
            input.ssh_tunnel = Some(tunnel);
        }

        let resource = if input.is_empty() {
            debug!(id, "No mutable attribute changed");
            self.client.get_resource(id).await
        } else {
            self.client.update_resource(name, &input).await
        }
        .map_err(|e| Error::remote(KIND, id, "update", e))?;
        info!(id, name, "Data resource updated");

        Ok(Converged::new(id, observe(&resource)?).with_diagnostics(diagnostics))
    }

    async fn delete(&self, identity: &Identity) -> Result<Diagnostics> {
        let id = identity.object_id(KIND)?;
        match self.client.delete_resource(id).await {
            Ok(()) => info!(id, "Data resource deleted"),
            Err(e) if e.is_not_found() => warn!(id, "Data resource already absent"),
            Err(e) => return Err(Error::remote(KIND, id, "delete", e)),
        }
        Ok(Diagnostics::new())
    }
}
