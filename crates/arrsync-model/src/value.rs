//! Field values of a normalized resource
//!
//! [`FieldValue`] mirrors JSON with one addition: [`FieldValue::Ref`], a
//! reference to another resource by natural key. Desired and live resources
//! both carry references in this form so that comparisons never see the
//! numeric ids a remote service assigns.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::resource::ResourceId;

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    Ref(ResourceId),
}

impl FieldValue {
    /// Build a map value from key/value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        FieldValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Convert a JSON value. No reference detection happens here.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from_json).collect())
            }
            Value::Object(map) => FieldValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON.
    ///
    /// References render as their natural key; callers that need remote ids
    /// must bind references first (see [`crate::Resource::bind`]).
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            FieldValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            FieldValue::Ref(id) => Value::String(id.key.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<&ResourceId> {
        match self {
            FieldValue::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Scalar equality with numeric tolerance.
    ///
    /// `1` and `1.0` are equal; a service may echo integers as floats.
    pub fn scalar_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            (a, b) => a == b,
        }
    }

    /// Whether the value or anything nested in it is a reference
    pub fn contains_ref(&self) -> bool {
        match self {
            FieldValue::Ref(_) => true,
            FieldValue::List(items) => items.iter().any(FieldValue::contains_ref),
            FieldValue::Map(map) => map.values().any(FieldValue::contains_ref),
            _ => false,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Ref(id) => {
                let mut map = Map::new();
                map.insert("$ref".to_string(), Value::String(id.to_string()));
                Value::Object(map).serialize(serializer)
            }
            FieldValue::List(items) => items.serialize(serializer),
            FieldValue::Map(map) => map.serialize(serializer),
            other => other.to_json().serialize(serializer),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<ResourceId> for FieldValue {
    fn from(id: ResourceId) -> Self {
        FieldValue::Ref(id)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::from_json(value)
    }
}
