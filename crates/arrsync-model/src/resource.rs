//! Normalized resources and reference edges

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::ResourceKind;
use crate::schema::visit_path_mut;
use crate::value::FieldValue;
use crate::{Error, Result};

/// Identity of a resource within one sync run: `(service, kind, key)`
///
/// Also used as the target of a reference. Ordering is by service, then
/// kind rank, then key, which gives reports and plans a stable layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub service: String,
    pub kind: ResourceKind,
    pub key: String,
}

impl ResourceId {
    pub fn new(service: impl Into<String>, kind: ResourceKind, key: impl AsRef<str>) -> Self {
        Self {
            service: service.into(),
            kind,
            key: kind.normalize_key(key.as_ref()),
        }
    }

    /// Parse `[service:]kind/key`, filling in `default_service` when the
    /// service prefix is absent.
    ///
    /// The key may itself contain `/` (root folder paths do).
    pub fn parse(value: &str, default_service: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReference {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let slash = value.find('/').ok_or_else(|| invalid("expected kind/key"))?;
        let (head, key) = (&value[..slash], &value[slash + 1..]);
        let (service, kind) = match head.split_once(':') {
            Some((service, kind)) => (service, kind),
            None => (default_service, head),
        };

        if service.is_empty() {
            return Err(invalid("empty service name"));
        }
        if key.is_empty() {
            return Err(invalid("empty key"));
        }
        let kind: ResourceKind = kind.parse()?;
        Ok(ResourceId::new(service, kind, key))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.service, self.kind, self.key)
    }
}

/// Which side of the comparison a resource came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Desired,
    Live,
}

/// Remote identity of a live resource
///
/// Opaque to the reconciliation logic; only adapters read `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHandle {
    /// Numeric id assigned by the service, if it has one
    pub id: Option<i64>,
    /// The wire object as last fetched
    pub raw: Value,
}

/// A directed dependency from one resource to another by natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceEdge {
    pub from: ResourceId,
    pub to: ResourceId,
    /// Field path the reference was found at
    pub path: String,
}

/// One normalized configuration object
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub fields: BTreeMap<String, FieldValue>,
    pub origin: Origin,
    pub remote: Option<RemoteHandle>,
}

impl Resource {
    /// A resource declared in the configuration document
    pub fn desired(id: ResourceId, fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            id,
            fields,
            origin: Origin::Desired,
            remote: None,
        }
    }

    /// A resource observed on a service
    pub fn live(id: ResourceId, fields: BTreeMap<String, FieldValue>, remote: RemoteHandle) -> Self {
        Self {
            id,
            fields,
            origin: Origin::Live,
            remote: Some(remote),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }

    pub fn service(&self) -> &str {
        &self.id.service
    }

    pub fn key(&self) -> &str {
        &self.id.key
    }

    pub fn remote_id(&self) -> Option<i64> {
        self.remote.as_ref().and_then(|r| r.id)
    }

    /// Builder-style field setter, mostly for tests and fixtures.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// All references held anywhere in the field map.
    pub fn references(&self) -> Vec<ReferenceEdge> {
        let mut edges = Vec::new();
        for (name, value) in &self.fields {
            collect_refs(&self.id, name, value, &mut edges);
        }
        edges
    }

    /// Rewrite the values at every declared reference path of this kind.
    ///
    /// `f` receives the target kind and the value slot; the desired-state
    /// loader uses it to turn names into references, the live-state fetcher to
    /// turn numeric ids into references.
    pub fn rewrite_reference_slots<F>(&mut self, mut f: F)
    where
        F: FnMut(ResourceKind, &mut FieldValue),
    {
        for reference in self.id.kind.reference_fields() {
            visit_path_mut(&mut self.fields, reference.path, &mut |slot| {
                f(reference.target, slot)
            });
        }
    }

    /// Produce a copy with every reference replaced by the value `resolve`
    /// returns for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnboundReference`] for the first reference `resolve`
    /// cannot bind.
    pub fn bind<F>(&self, mut resolve: F) -> Result<Resource>
    where
        F: FnMut(&ResourceId) -> Option<FieldValue>,
    {
        let mut bound = self.clone();
        for value in bound.fields.values_mut() {
            bind_value(&self.id, value, &mut resolve)?;
        }
        Ok(bound)
    }

    /// Field map as JSON with the natural key inserted under the kind's key
    /// field, except for singletons whose key is part of the URL. References
    /// must be bound beforehand.
    pub fn to_payload(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        if !self.id.kind.is_singleton() {
            map.insert(
                self.id.kind.key_field().to_string(),
                Value::String(self.id.key.clone()),
            );
        }
        Value::Object(map)
    }
}

fn collect_refs(from: &ResourceId, path: &str, value: &FieldValue, out: &mut Vec<ReferenceEdge>) {
    match value {
        FieldValue::Ref(to) => out.push(ReferenceEdge {
            from: from.clone(),
            to: to.clone(),
            path: path.to_string(),
        }),
        FieldValue::List(items) => {
            let path = format!("{}[]", path);
            for item in items {
                collect_refs(from, &path, item, out);
            }
        }
        FieldValue::Map(map) => {
            for (name, inner) in map {
                collect_refs(from, &format!("{}.{}", path, name), inner, out);
            }
        }
        _ => {}
    }
}

fn bind_value<F>(from: &ResourceId, value: &mut FieldValue, resolve: &mut F) -> Result<()>
where
    F: FnMut(&ResourceId) -> Option<FieldValue>,
{
    match value {
        FieldValue::Ref(to) => {
            let bound = resolve(to).ok_or_else(|| Error::UnboundReference {
                from: from.clone(),
                to: to.clone(),
            })?;
            *value = bound;
        }
        FieldValue::List(items) => {
            for item in items {
                bind_value(from, item, resolve)?;
            }
        }
        FieldValue::Map(map) => {
            for inner in map.values_mut() {
                bind_value(from, inner, resolve)?;
            }
        }
        _ => {}
    }
    Ok(())
}
