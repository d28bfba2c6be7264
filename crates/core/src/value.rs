//! Desired/observed state attribute values.
//!
//! A resource's state is an [`AttributeMap`]: attribute names mapped to a
//! [`Value`]. Blocks that are semantically singular (credentials, SSH tunnel,
//! stream topology) are stored as a list holding at most one map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Map(AttributeMap),
}

impl Value {
    /// Wrap a map as a single-element block.
    #[must_use]
    pub fn block(map: AttributeMap) -> Self {
        Self::List(vec![Self::Map(map)])
    }

    /// Build a list of strings.
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::String(s.into())).collect())
    }

    /// Human-readable name of the variant, used in type errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "a bool",
            Self::Int(_) => "a number",
            Self::String(_) => "a string",
            Self::List(_) => "a list",
            Self::Map(_) => "a map",
        }
    }

    /// Borrow as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&AttributeMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Checked conversion to a string slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] when the value is not a string.
    pub fn expect_str(&self, path: &str) -> Result<&str> {
        self.as_str()
            .ok_or_else(|| Error::wrong_type(path, "a string", self.type_name()))
    }

    /// Checked conversion to a map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] when the value is not a map.
    pub fn expect_map(&self, path: &str) -> Result<&AttributeMap> {
        self.as_map()
            .ok_or_else(|| Error::wrong_type(path, "a map", self.type_name()))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<AttributeMap> for Value {
    fn from(map: AttributeMap) -> Self {
        Self::Map(map)
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Map(map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
    }
}

/// Attribute name to value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, Value>);

impl AttributeMap {
    /// Create an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert an attribute only when the value is present.
    pub fn insert_opt<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(v) = value {
            self.insert(key, v);
        }
    }

    /// Remove an attribute.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Raw access to an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the attribute is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Attribute names in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Optional string attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] when the attribute is not a string.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        self.get(key).map(|v| v.expect_str(key)).transpose()
    }

    /// Optional string attribute where the empty string counts as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] when the attribute is not a string.
    pub fn get_set_str(&self, key: &str) -> Result<Option<&str>> {
        Ok(self.get_str(key)?.filter(|s| !s.is_empty()))
    }

    /// Required, non-empty string attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] when absent or empty, or
    /// [`Error::WrongType`] when not a string.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_set_str(key)?.ok_or_else(|| Error::missing(key))
    }

    /// Optional boolean attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] when the attribute is not a bool.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Error::wrong_type(key, "a bool", other.type_name())),
        }
    }

    /// Optional map-of-strings attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] when the attribute is not a map or one of
    /// its entries is not a string.
    pub fn get_string_map(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let map = value.expect_map(key)?;
        map.iter()
            .map(|(k, v)| {
                v.expect_str(&format!("{key}.{k}"))
                    .map(|s| (k.clone(), s.to_string()))
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Some)
    }

    /// Optional list-of-strings attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] when the attribute is not a list of strings.
    pub fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, v)| v.expect_str(&format!("{key}.{i}")).map(str::to_string))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(Error::wrong_type(key, "a list", other.type_name())),
        }
    }

    /// Optional single-element block.
    ///
    /// An empty list is treated the same as an absent block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] when more than one element is present,
    /// or [`Error::WrongType`] when the attribute is not a list of maps.
    pub fn get_block(&self, key: &str) -> Result<Option<&AttributeMap>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::List(items)) => match items.as_slice() {
                [] => Ok(None),
                [only] => only.expect_map(&format!("{key}.0")).map(Some),
                many => Err(Error::invalid_block(key, many.len())),
            },
            Some(other) => Err(Error::wrong_type(key, "a block", other.type_name())),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for AttributeMap {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    fn credentials() -> AttributeMap {
        AttributeMap::new()
            .with("username", "admin")
            .with("ssl", true)
    }

    #[test]
    fn test_typed_getters() {
        let attrs = AttributeMap::new()
            .with("name", "pg")
            .with("pipeline_id", 7)
            .with("ready", false);

        assert_eq!(attrs.get_str("name").unwrap(), Some("pg"));
        assert_eq!(attrs.get_bool("ready").unwrap(), Some(false));
        assert_eq!(attrs.get_str("missing").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_error() {
        let attrs = AttributeMap::new().with("name", 3);
        let err = attrs.get_str("name").unwrap_err();
        assert!(matches!(err, Error::WrongType { expected: "a string", .. }));
    }

    #[test]
    fn test_empty_string_is_unset() {
        let attrs = AttributeMap::new().with("url", "");
        assert_eq!(attrs.get_set_str("url").unwrap(), None);
        assert!(matches!(
            attrs.require_str("url"),
            Err(Error::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_get_block() {
        let attrs = AttributeMap::new().with("credentials", Value::block(credentials()));
        let block = attrs.get_block("credentials").unwrap().unwrap();
        assert_eq!(block.get_str("username").unwrap(), Some("admin"));
    }

    #[test]
    fn test_get_block_empty_list_is_absent() {
        let attrs = AttributeMap::new().with("credentials", Value::List(vec![]));
        assert!(attrs.get_block("credentials").unwrap().is_none());
    }

    #[test]
    fn test_get_block_rejects_two_elements() {
        let two = Value::List(vec![
            Value::Map(credentials()),
            Value::Map(credentials()),
        ]);
        let attrs = AttributeMap::new().with("credentials", two);
        assert!(matches!(
            attrs.get_block("credentials"),
            Err(Error::InvalidBlock { count: 2, .. })
        ));
    }

    #[test]
    fn test_get_string_map_reports_entry_path() {
        let config = AttributeMap::new().with("batch", 10);
        let attrs = AttributeMap::new().with("config", config);
        let err = attrs.get_string_map("config").unwrap_err();
        assert_eq!(err.path(), "config.batch");
    }

    #[test]
    fn test_json_round_trip() {
        let attrs = AttributeMap::new()
            .with("name", "pg")
            .with("credentials", Value::block(credentials()))
            .with("tags", Value::string_list(["a", "b"]));
        let json = serde_json::to_string(&attrs).unwrap();
        let back: AttributeMap = serde_json::from_str(&json).unwrap();
        assert_eq!(attrs, back);
    }
}
