//! Classification of patch-set tree nodes.

use super::ResolveError;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// What a value in a patch-set tree stands for.
#[derive(Debug)]
pub(crate) enum Node<'a> {
    /// A map with a `url` key: an actual patch.
    Leaf(&'a Map<String, Value>),
    /// A string naming a sibling key.
    Alias(&'a str),
    /// A string to fetch and decode as JSON.
    Reference(&'a str),
    /// Anything else map-like; lists are keyed by index.
    Container(Cow<'a, Map<String, Value>>),
}

/// Classify `value`. Strings are only considered aliases when `siblings`
/// is given and contains them as a key.
pub(crate) fn classify<'a>(
    value: &'a Value,
    siblings: Option<&Map<String, Value>>,
    location: &str,
) -> Result<Node<'a>, ResolveError> {
    match value {
        Value::Null => Err(ResolveError::EmptyData {
            location: location.to_string(),
        }),
        Value::String(s) if s.is_empty() => Err(ResolveError::EmptyData {
            location: location.to_string(),
        }),
        Value::String(s) => match siblings {
            Some(map) if map.contains_key(s.as_str()) => Ok(Node::Alias(s)),
            _ => Ok(Node::Reference(s)),
        },
        Value::Object(map) if is_patch(map) => Ok(Node::Leaf(map)),
        Value::Object(map) => Ok(Node::Container(Cow::Borrowed(map))),
        Value::Array(items) => Ok(Node::Container(Cow::Owned(index_map(items)))),
        other => Err(ResolveError::InvalidData {
            location: location.to_string(),
            found: kind(other),
        }),
    }
}

/// Flatten an already dereferenced value into a map.
pub(crate) fn flatten(value: &Value, location: &str) -> Result<Map<String, Value>, ResolveError> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Array(items) => Ok(index_map(items)),
        other => Err(ResolveError::InvalidData {
            location: location.to_string(),
            found: kind(other),
        }),
    }
}

pub(crate) fn is_patch(map: &Map<String, Value>) -> bool {
    map.contains_key("url")
}

fn index_map(items: &[Value]) -> Map<String, Value> {
    items
        .iter()
        .enumerate()
        .map(|(i, v)| (i.to_string(), v.clone()))
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}
