//! Cache key derivation.
//!
//! Keys are `{operation}:{entity}` followed by the lookup arguments:
//!
//! ```text
//! get_all:task
//! get_by_id:task:item_id:7
//! get_by_custom_field:user:telegram_username:alice_tg
//! get_by_custom_fields:task:owner_name:alice:workspace_id:3
//! ```
//!
//! Filter pairs are ordered by field name, so the same filter set always
//! maps to the same key. Filter values escape `\` and `:` with a backslash.

use progressor_core::entity::{EntityKind, RecordId};
use serde_json::Value;
use std::collections::BTreeMap;

pub const GET_ALL: &str = "get_all";
pub const GET_BY_ID: &str = "get_by_id";
pub const GET_BY_CUSTOM_FIELD: &str = "get_by_custom_field";
pub const GET_BY_CUSTOM_FIELDS: &str = "get_by_custom_fields";

/// Equality filters keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(BTreeMap<String, Value>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field = value`. A later value for the same field wins.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Text of a value as it appears inside a key.
fn segment(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | ':') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn all(kind: EntityKind) -> String {
    format!("{GET_ALL}:{}", kind.name())
}

pub fn by_id(kind: EntityKind, id: &RecordId) -> String {
    format!("{GET_BY_ID}:{}:item_id:{id}", kind.name())
}

pub fn by_field(kind: EntityKind, field: &str, value: &Value) -> String {
    format!(
        "{GET_BY_CUSTOM_FIELD}:{}:{field}:{}",
        kind.name(),
        segment(value)
    )
}

pub fn by_fields(kind: EntityKind, filters: &Filters) -> String {
    let mut key = format!("{GET_BY_CUSTOM_FIELDS}:{}", kind.name());
    for (field, value) in filters.iter() {
        key.push(':');
        key.push_str(field);
        key.push(':');
        key.push_str(&segment(value));
    }
    key
}

/// Keys and key patterns to drop after a write to `kind`.
///
/// Every list lookup of the kind is dropped. Point lookups by id are dropped
/// for `id` only, or for every id when `id` is `None` and `all_ids` is set.
pub(crate) struct Stale {
    pub exact: Vec<String>,
    pub patterns: Vec<String>,
}

impl Stale {
    pub(crate) fn after_write(kind: EntityKind, id: Option<&RecordId>, all_ids: bool) -> Self {
        let name = kind.name();
        let mut exact = vec![
            all(kind),
            format!("{GET_BY_CUSTOM_FIELDS}:{name}"),
        ];
        let mut patterns = vec![
            format!("{GET_BY_CUSTOM_FIELDS}:{name}:*"),
            format!("{GET_BY_CUSTOM_FIELD}:{name}:*"),
        ];
        if let Some(id) = id {
            exact.push(by_id(kind, id));
        }
        if all_ids {
            patterns.push(format!("{GET_BY_ID}:{name}:*"));
        }
        Self { exact, patterns }
    }
}
