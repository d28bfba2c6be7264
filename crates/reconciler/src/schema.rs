//! Per-kind attribute tables.
//!
//! Each table maps a desired-state attribute to its API field and records
//! how the attribute behaves: sensitive values are redacted from logs,
//! immutable ones force replacement, write-only ones are never read back,
//! computed ones are never sent.

use std::collections::BTreeSet;

use mx_core::{AttributeMap, Value};

use crate::error::{Error, Result};

/// Shape of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Numeric API id surfaced as a string attribute.
    Id,
    Bool,
    /// JSON object encoded as a string attribute.
    Json,
    StringMap,
    StringList,
    /// Single nested block, stored as a one-element list.
    Block(&'static [Field]),
    /// List of nested blocks.
    Blocks(&'static [Field]),
}

impl FieldType {
    /// Human-readable name used in type errors.
    #[must_use]
    pub const fn expected(&self) -> &'static str {
        match self {
            Self::String | Self::Json => "a string",
            Self::Id => "a numeric id",
            Self::Bool => "a bool",
            Self::StringMap => "a map of strings",
            Self::StringList => "a list of strings",
            Self::Block(_) => "a block",
            Self::Blocks(_) => "a list of blocks",
        }
    }
}

/// One attribute of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Dotted path in the API object, `None` when derived by the converger.
    pub api: Option<&'static str>,
    pub ty: FieldType,
    pub sensitive: bool,
    pub immutable: bool,
    pub write_only: bool,
    pub computed: bool,
}

impl Field {
    #[must_use]
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            api: Some(name),
            ty,
            sensitive: false,
            immutable: false,
            write_only: false,
            computed: false,
        }
    }

    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }

    #[must_use]
    pub const fn id(name: &'static str) -> Self {
        Self::new(name, FieldType::Id)
    }

    #[must_use]
    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, FieldType::Bool)
    }

    #[must_use]
    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldType::Json)
    }

    #[must_use]
    pub const fn string_map(name: &'static str) -> Self {
        Self::new(name, FieldType::StringMap)
    }

    #[must_use]
    pub const fn string_list(name: &'static str) -> Self {
        Self::new(name, FieldType::StringList)
    }

    #[must_use]
    pub const fn block(name: &'static str, fields: &'static [Field]) -> Self {
        Self::new(name, FieldType::Block(fields))
    }

    #[must_use]
    pub const fn blocks(name: &'static str, fields: &'static [Field]) -> Self {
        Self::new(name, FieldType::Blocks(fields))
    }

    /// Read and write the attribute under a different API path.
    #[must_use]
    pub const fn api(mut self, path: &'static str) -> Self {
        self.api = Some(path);
        self
    }

    /// The converger fills the attribute itself.
    #[must_use]
    pub const fn derived(mut self) -> Self {
        self.api = None;
        self
    }

    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    #[must_use]
    pub const fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

pub const CREDENTIALS: &[Field] = &[
    Field::string("username"),
    Field::string("password").sensitive(),
    Field::string("cacert").api("ca_cert"),
    Field::string("clientcert").api("client_cert"),
    Field::string("clientkey").api("client_cert_key").sensitive(),
    Field::bool("ssl"),
];

pub const SSH_TUNNEL: &[Field] = &[
    Field::string("address"),
    Field::string("private_key").sensitive().write_only(),
    Field::string("public_key").computed(),
];

pub const DATA_RESOURCE: &[Field] = &[
    Field::id("id").computed(),
    Field::string("name").immutable(),
    Field::string("type").immutable(),
    Field::string("url").immutable().sensitive(),
    Field::json("metadata"),
    Field::block("credentials", CREDENTIALS),
    Field::block("ssh_tunnel", SSH_TUNNEL),
    Field::string("status").api("status.state").computed(),
    Field::string("created_at").computed(),
    Field::string("updated_at").computed(),
];

pub const STREAMS: &[Field] = &[
    Field::bool("dynamic"),
    Field::string_list("input"),
    Field::string_list("output"),
];

pub const CONNECTOR: &[Field] = &[
    Field::id("id").computed(),
    Field::string("name").immutable(),
    Field::string("source_id").derived().immutable(),
    Field::string("destination_id").derived().immutable(),
    Field::string("input").derived().immutable(),
    Field::id("pipeline_id").immutable(),
    Field::string("pipeline_name").immutable(),
    Field::string_map("config"),
    Field::string_map("metadata").immutable().write_only(),
    Field::string("state"),
    Field::string("type").computed(),
    Field::block("streams", STREAMS).computed(),
];

pub const PIPELINE: &[Field] = &[
    Field::id("id").computed(),
    Field::string("name"),
    Field::string_map("metadata"),
    Field::string("state").computed(),
];

pub const ENDPOINT: &[Field] = &[
    Field::string("name").immutable(),
    Field::string("protocol").immutable(),
    Field::string("stream").immutable(),
    Field::string("host").computed(),
    Field::bool("ready").computed(),
    Field::string("basic_auth_username").computed(),
    Field::string("basic_auth_password").computed().sensitive(),
];

pub const TRANSFORM_PROPERTY: &[Field] = &[
    Field::string("name"),
    Field::bool("required"),
    Field::string("type"),
];

pub const TRANSFORM: &[Field] = &[
    Field::id("id"),
    Field::string("name"),
    Field::bool("required"),
    Field::string("description"),
    Field::string("type"),
    Field::blocks("properties", TRANSFORM_PROPERTY),
];

/// Look up a field by attribute name.
#[must_use]
pub fn find(fields: &'static [Field], name: &str) -> Option<&'static Field> {
    fields.iter().find(|f| f.name == name)
}

/// Root attribute names of a change set (`credentials.0.username` is
/// `credentials`).
#[must_use]
pub fn changed_roots(changed: &[String]) -> BTreeSet<&str> {
    changed
        .iter()
        .filter_map(|path| path.split('.').next())
        .collect()
}

/// Reject a change set that touches an immutable attribute.
///
/// Changed paths may be nested (`credentials.0.username`); only the root
/// attribute is checked. Unknown attributes are ignored.
///
/// # Errors
///
/// Returns [`Error::RequiresReplacement`] naming the first immutable
/// attribute found.
pub fn ensure_mutable(kind: &'static str, fields: &'static [Field], changed: &[String]) -> Result<()> {
    changed_roots(changed)
        .into_iter()
        .find(|root| find(fields, root).is_some_and(|f| f.immutable))
        .map_or(Ok(()), |root| Err(Error::requires_replacement(kind, root)))
}

/// Copy of `state` with sensitive attributes masked, for logging.
#[must_use]
pub fn redacted(fields: &'static [Field], state: &AttributeMap) -> AttributeMap {
    state
        .iter()
        .map(|(name, value)| {
            let masked = match find(fields, name) {
                Some(field) if field.sensitive => Value::from("<redacted>"),
                Some(Field {
                    ty: FieldType::Block(sub),
                    ..
                }) => redact_block(sub, value),
                _ => value.clone(),
            };
            (name.clone(), masked)
        })
        .collect()
}

fn redact_block(fields: &'static [Field], value: &Value) -> Value {
    match value {
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| match item {
                    Value::Map(map) => Value::Map(redacted(fields, map)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn test_immutable_change_requires_replacement() {
        let changed = vec!["metadata".to_string(), "url".to_string()];
        let err = ensure_mutable("resource", DATA_RESOURCE, &changed).unwrap_err();
        assert!(matches!(
            err,
            Error::RequiresReplacement { attribute, .. } if attribute == "url"
        ));
    }

    #[test]
    fn test_nested_mutable_change_is_allowed() {
        let changed = vec!["credentials.0.password".to_string(), "unknown".to_string()];
        assert!(ensure_mutable("resource", DATA_RESOURCE, &changed).is_ok());
    }

    #[test]
    fn test_redacted_masks_nested_secrets() {
        let state = AttributeMap::new()
            .with("name", "pg")
            .with(
                "credentials",
                Value::block(
                    AttributeMap::new()
                        .with("username", "admin")
                        .with("password", "hunter2"),
                ),
            );

        let masked = redacted(DATA_RESOURCE, &state);
        let creds = masked.get_block("credentials").unwrap().unwrap();
        assert_eq!(creds.get_str("username").unwrap(), Some("admin"));
        assert_eq!(creds.get_str("password").unwrap(), Some("<redacted>"));
        assert_eq!(masked.get_str("name").unwrap(), Some("pg"));
    }

    #[test]
    fn test_endpoint_has_no_mutable_attributes() {
        assert!(ENDPOINT.iter().all(|f| f.immutable || f.computed));
    }
}
