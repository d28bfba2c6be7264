//! Connector converger.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mx_client::{
    ClientError, Connector, ConnectorAction, ConnectorState, CreateConnectorInput, ObjectId,
    PlatformClient, UpdateConnectorInput, CONNECTOR_TYPE_KEY,
};
use mx_core::{AttributeMap, Diagnostics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollSettings;
use crate::converger::Converger;
use crate::error::{Error, Result};
use crate::poller::StatePoller;
use crate::schema::{self, Field, CONNECTOR};
use crate::transcode;
use crate::types::{Converged, Identity, ObservedState};

pub const TYPE_NAME: &str = "meroxa_connector";
pub const KIND: &str = "connector";

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 64;
const INPUT_KEY: &str = "input";

/// Which side of a data resource the connector streams from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Source,
    Destination,
}

impl Direction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }

    /// Direction recorded in the connector's metadata; source unless marked
    /// as a destination.
    #[must_use]
    pub fn of(connector: &Connector) -> Self {
        match connector.metadata.get(CONNECTOR_TYPE_KEY).map(String::as_str) {
            Some("destination") => Self::Destination,
            _ => Self::Source,
        }
    }

    const fn attribute(self) -> &'static str {
        match self {
            Self::Source => "source_id",
            Self::Destination => "destination_id",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a connector name before any remote call.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the first rule the name breaks.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |detail: &str| Err(Error::invalid_attribute("name", "Invalid connector name", detail));
    let len = name.chars().count();

    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return invalid("connector name must be between 3 and 64 characters");
    }
    if name.chars().any(char::is_uppercase) {
        return invalid("connector name must be lowercase");
    }
    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return invalid("connector name must start with a letter");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return invalid("connector name may only contain letters, digits and dashes");
    }
    if name.ends_with('-') {
        return invalid("connector name must not end with a dash");
    }
    Ok(())
}

fn numeric(attribute: &str, raw: &str, what: &str) -> Result<ObjectId> {
    raw.trim().parse().map_err(|_| {
        Error::invalid_attribute(
            attribute,
            format!("Invalid {what} id"),
            format!("'{raw}' is not a numeric {what} id"),
        )
    })
}

/// Resource the connector attaches to, and on which side.
///
/// # Errors
///
/// Returns [`Error::Validation`] unless exactly one of `source_id` and
/// `destination_id` is set to a numeric id.
pub fn attachment(desired: &AttributeMap) -> Result<(ObjectId, Direction)> {
    match (
        desired.get_set_str("source_id")?,
        desired.get_set_str("destination_id")?,
    ) {
        (Some(_), Some(_)) => Err(Error::validation(
            "Conflicting attributes",
            "only one of source_id or destination_id may be set",
        )),
        (None, None) => Err(Error::validation(
            "Missing attribute",
            "one of source_id or destination_id is required",
        )),
        (Some(id), None) => Ok((numeric("source_id", id, "resource")?, Direction::Source)),
        (None, Some(id)) => Ok((
            numeric("destination_id", id, "resource")?,
            Direction::Destination,
        )),
    }
}

/// Pipeline the connector joins, by id or by name.
fn pipeline_ref(desired: &AttributeMap) -> Result<(Option<ObjectId>, Option<String>)> {
    match (
        desired.get_set_str("pipeline_id")?,
        desired.get_set_str("pipeline_name")?,
    ) {
        (Some(_), Some(_)) => Err(Error::validation(
            "Conflicting attributes",
            "only one of pipeline_id or pipeline_name may be set",
        )),
        (None, None) => Err(Error::validation(
            "Missing attribute",
            "one of pipeline_id or pipeline_name is required",
        )),
        (Some(id), None) => Ok((Some(numeric("pipeline_id", id, "pipeline")?), None)),
        (None, Some(name)) => Ok((None, Some(name.to_string()))),
    }
}

fn requested_state(desired: &AttributeMap) -> Result<Option<ConnectorState>> {
    match desired.get_set_str("state")? {
        None => Ok(None),
        Some("running") => Ok(Some(ConnectorState::Running)),
        Some("paused") => Ok(Some(ConnectorState::Paused)),
        Some(other) => Err(Error::invalid_attribute(
            "state",
            "Unsupported connector state",
            format!("state must be \"running\" or \"paused\", got {other:?}"),
        )),
    }
}

/// Configuration sent to the platform: `config` plus the `input` stream.
fn configuration(desired: &AttributeMap) -> Result<BTreeMap<String, String>> {
    let mut configuration = desired.get_string_map("config")?.unwrap_or_default();
    if let Some(input) = desired.get_set_str(INPUT_KEY)? {
        configuration.insert(INPUT_KEY.to_string(), input.to_string());
    }
    Ok(configuration)
}

/// Observed-state attributes of a connector.
///
/// `input` is lifted out of the configuration map and the attached resource
/// is reported as `source_id` or `destination_id`.
///
/// # Errors
///
/// Returns an attribute error when the response does not match the table.
pub fn observe(connector: &Connector) -> Result<ObservedState> {
    let mut state = transcode::flatten_from(KIND, CONNECTOR, connector)?;

    let mut config = connector.configuration.clone();
    let input = config.remove(INPUT_KEY);
    state.remove("config");
    if !config.is_empty() {
        state.insert("config", config);
    }
    state.insert_opt(INPUT_KEY, input);
    state.insert(
        Direction::of(connector).attribute(),
        connector.resource_id.to_string(),
    );
    Ok(state)
}

/// Converges `meroxa_connector` objects.
pub struct ConnectorConverger {
    client: Arc<dyn PlatformClient>,
    settings: PollSettings,
}

impl ConnectorConverger {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self {
            client,
            settings: PollSettings::connector(),
        }
    }

    #[must_use]
    pub fn with_poll_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn await_state(
        &self,
        id: ObjectId,
        pending: &[&'static str],
        target: ConnectorState,
        cancel: &CancellationToken,
    ) -> Result<Connector> {
        let poller = StatePoller::new(pending.iter().copied(), [target.as_str()])
            .with_settings(self.settings.clone())
            .with_retry_transient(self.settings.retry_transient && !self.client.retries_transient());

        let client = Arc::clone(&self.client);
        let polled = poller
            .wait(cancel, move || {
                let client = Arc::clone(&client);
                async move {
                    let connector = client.get_connector(id).await?;
                    let label = connector.state.as_str().to_string();
                    Ok::<_, ClientError>((connector, label))
                }
            })
            .await
            .map_err(|e| e.into_error(KIND, &id.to_string()))?;

        info!(
            id,
            state = %polled.state,
            attempts = polled.attempts,
            elapsed_ms = polled.elapsed.as_millis(),
            "Connector converged"
        );
        Ok(polled.snapshot)
    }

    /// Pause or resume, then wait for the connector to settle.
    async fn transition(
        &self,
        name: &str,
        id: ObjectId,
        target: ConnectorState,
        cancel: &CancellationToken,
    ) -> Result<Connector> {
        let (action, pending) = match target {
            ConnectorState::Paused => (ConnectorAction::Pause, &["running", "pending"][..]),
            _ => (ConnectorAction::Resume, &["pending", "paused"][..]),
        };
        self.client
            .update_connector_status(name, action)
            .await
            .map_err(|e| Error::remote(KIND, id, "update", e))?;
        debug!(id, %action, "Connector state change requested");
        self.await_state(id, pending, target, cancel).await
    }
}

#[async_trait]
impl Converger for ConnectorConverger {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field] {
        CONNECTOR
    }

    async fn create(&self, desired: &AttributeMap, cancel: &CancellationToken) -> Result<Converged> {
        let name = desired.require_str("name")?;
        validate_name(name)?;
        let (resource_id, direction) = attachment(desired)?;
        let (pipeline_id, pipeline_name) = pipeline_ref(desired)?;
        let requested = requested_state(desired)?;

        let mut metadata = desired.get_string_map("metadata")?.unwrap_or_default();
        metadata.insert(CONNECTOR_TYPE_KEY.to_string(), direction.to_string());

        let input = CreateConnectorInput {
            name: name.to_string(),
            resource_id,
            pipeline_id,
            pipeline_name,
            configuration: configuration(desired)?,
            metadata,
        };
        let created = self
            .client
            .create_connector(&input)
            .await
            .map_err(|e| Error::remote(KIND, name, "create", e))?;
        let id = created.id;
        info!(id, name, %direction, resource_id, "Connector created");

        let mut connector = self
            .await_state(id, &["pending"], ConnectorState::Running, cancel)
            .await
            .map_err(|e| Error::partially_created(KIND, id, e))?;

        if requested == Some(ConnectorState::Paused) {
            connector = self
                .transition(name, id, ConnectorState::Paused, cancel)
                .await
                .map_err(|e| Error::partially_created(KIND, id, e))?;
        }

        Ok(Converged::new(id, observe(&connector)?))
    }

    async fn read(&self, identity: &Identity) -> Result<Option<Converged>> {
        let id = identity.object_id(KIND)?;
        match self.client.get_connector(id).await {
            Ok(connector) => Ok(Some(Converged::new(id, observe(&connector)?))),
            Err(e) if e.is_not_found() => {
                debug!(id, "Connector absent");
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
        cancel: &CancellationToken,
    ) -> Result<Converged> {
        schema::ensure_mutable(KIND, CONNECTOR, changed)?;
        let id = identity.object_id(KIND)?;
        let name = desired.require_str("name")?;
        let roots = schema::changed_roots(changed);
        let requested = if roots.contains("state") {
            requested_state(desired)?
        } else {
            None
        };

        if roots.contains("config") {
            let input = UpdateConnectorInput {
                configuration: configuration(desired)?,
            };
            self.client
                .update_connector(name, &input)
                .await
                .map_err(|e| Error::remote(KIND, id, "update", e))?;
            info!(id, name, "Connector configuration replaced");
        }

        let connector = match requested {
            Some(target) => self.transition(name, id, target, cancel).await?,
            None => self
                .client
                .get_connector(id)
                .await
                .map_err(|e| Error::remote(KIND, id, "read", e))?,
        };
        Ok(Converged::new(id, observe(&connector)?))
    }

    async fn delete(&self, identity: &Identity) -> Result<Diagnostics> {
        let id = identity.object_id(KIND)?;
        match self.client.delete_connector(id).await {
            Ok(()) => info!(id, "Connector deleted"),
            Err(e) if e.is_not_found() => warn!(id, "Connector already absent"),
            Err(e) => return Err(Error::remote(KIND, id, "delete", e)),
        }
        Ok(Diagnostics::new())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use proptest::prelude::*;

    use super::*;

    fn rejection(name: &str) -> String {
        match validate_name(name) {
            Err(Error::Validation { detail, .. }) => detail,
            other => format!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_name_rules_report_specific_messages() {
        assert!(validate_name("pg-source-1").is_ok());
        assert_eq!(rejection("pg"), "connector name must be between 3 and 64 characters");
        assert_eq!(rejection("Pg-source"), "connector name must be lowercase");
        assert_eq!(rejection("1-source"), "connector name must start with a letter");
        assert_eq!(
            rejection("pg_source"),
            "connector name may only contain letters, digits and dashes"
        );
        assert_eq!(rejection("pg-source-"), "connector name must not end with a dash");
    }

    #[test]
    fn test_attachment_requires_exactly_one_side() {
        let both = AttributeMap::new()
            .with("source_id", "1")
            .with("destination_id", "2");
        assert!(attachment(&both).is_err());
        assert!(attachment(&AttributeMap::new()).is_err());

        let dest = AttributeMap::new().with("destination_id", "2");
        assert_eq!(attachment(&dest).unwrap(), (2, Direction::Destination));

        let bad = AttributeMap::new().with("source_id", "pg");
        assert!(matches!(
            attachment(&bad),
            Err(Error::Validation { attribute: Some(ref a), .. }) if a == "source_id"
        ));
    }

    #[test]
    fn test_pipeline_ref_is_exclusive() {
        let both = AttributeMap::new()
            .with("pipeline_id", "3")
            .with("pipeline_name", "orders");
        assert!(pipeline_ref(&both).is_err());
        assert!(pipeline_ref(&AttributeMap::new()).is_err());
        let by_name = AttributeMap::new().with("pipeline_name", "orders");
        assert_eq!(pipeline_ref(&by_name).unwrap(), (None, Some("orders".into())));
    }

    #[test]
    fn test_unknown_requested_state_is_rejected() {
        let desired = AttributeMap::new().with("state", "degraded");
        assert!(requested_state(&desired).is_err());
    }

    #[test]
    fn test_observe_reconstructs_derived_attributes() {
        let mut streams = serde_json::Map::new();
        streams.insert("dynamic".into(), serde_json::json!(false));
        streams.insert("input".into(), serde_json::json!(["public.orders"]));
        streams.insert("output".into(), serde_json::json!([]));
        let connector = Connector {
            id: 31,
            name: "orders-sink".into(),
            kind: "postgres-destination".into(),
            resource_id: 4,
            configuration: BTreeMap::from([
                ("input".to_string(), "public.orders".to_string()),
                ("batch.size".to_string(), "100".to_string()),
            ]),
            metadata: BTreeMap::from([(CONNECTOR_TYPE_KEY.to_string(), "destination".to_string())]),
            streams,
            state: ConnectorState::Running,
            pipeline_id: 9,
            pipeline_name: "orders".into(),
        };

        let state = observe(&connector).unwrap();
        assert_eq!(state.get_str("id").unwrap(), Some("31"));
        assert_eq!(state.get_str("destination_id").unwrap(), Some("4"));
        assert!(!state.contains("source_id"));
        assert_eq!(state.get_str("input").unwrap(), Some("public.orders"));
        assert_eq!(
            state.get_string_map("config").unwrap().unwrap(),
            BTreeMap::from([("batch.size".to_string(), "100".to_string())])
        );
        assert_eq!(state.get_str("pipeline_id").unwrap(), Some("9"));
        assert!(!state.contains("metadata"));

        let streams = state.get_block("streams").unwrap().unwrap();
        assert_eq!(streams.get_bool("dynamic").unwrap(), Some(false));
        assert_eq!(
            streams.get_string_list("input").unwrap().unwrap(),
            vec!["public.orders".to_string()]
        );
        assert_eq!(streams.get_string_list("output").unwrap().unwrap(), Vec::<String>::new());
    }

    proptest! {
        #[test]
        fn prop_valid_names_pass(name in "[a-z][a-z0-9-]{1,62}[a-z0-9]") {
            prop_assert!(validate_name(&name).is_ok());
        }

        #[test]
        fn prop_too_long_names_fail(name in "[a-z][a-z0-9]{64,80}") {
            prop_assert_eq!(rejection(&name), "connector name must be between 3 and 64 characters");
        }

        #[test]
        fn prop_too_short_names_fail(name in "[a-z][a-z0-9]?") {
            prop_assert_eq!(rejection(&name), "connector name must be between 3 and 64 characters");
        }

        #[test]
        fn prop_uppercase_names_fail(name in "[a-z]{2}[a-z0-9-]{0,30}[A-Z][a-z0-9]{0,10}") {
            prop_assert_eq!(rejection(&name), "connector name must be lowercase");
        }

        #[test]
        fn prop_digit_first_names_fail(name in "[0-9][a-z0-9-]{1,40}[a-z0-9]") {
            prop_assert_eq!(rejection(&name), "connector name must start with a letter");
        }

        #[test]
        fn prop_symbol_names_fail(name in "[a-z][a-z0-9]{1,20}[_.!@ ][a-z0-9]{1,20}") {
            prop_assert_eq!(
                rejection(&name),
                "connector name may only contain letters, digits and dashes"
            );
        }

        #[test]
        fn prop_trailing_dash_names_fail(name in "[a-z][a-z0-9-]{1,40}-") {
            prop_assert_eq!(rejection(&name), "connector name must not end with a dash");
        }
    }
}
