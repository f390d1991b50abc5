//! Desired-state loading: document declarations to a resource graph

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, instrument};

use arrsync_model::{
    FieldValue, ListMode, Origin, Resource, ResourceGraph, ResourceId, ResourceKind, ServiceType,
};

use super::document::{Document, KindDecl, PruneDecl, ServiceDecl};
use crate::error::DocumentError;

const REF_KEY: &str = "$ref";

/// Per-service settings derived from the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProfile {
    pub service_type: ServiceType,
    /// Kinds the document declares, including kinds declared empty
    pub managed: BTreeSet<ResourceKind>,
    /// Managed kinds whose live-only resources may be deleted
    pub prune: BTreeSet<ResourceKind>,
}

impl ServiceProfile {
    pub fn manages(&self, kind: ResourceKind) -> bool {
        self.managed.contains(&kind)
    }

    pub fn prunes(&self, kind: ResourceKind) -> bool {
        self.prune.contains(&kind)
    }

    /// Force pruning on or off for every managed kind.
    pub fn override_prune(&mut self, prune: bool) {
        self.prune = if prune {
            self.managed.clone()
        } else {
            BTreeSet::new()
        };
    }
}

/// The desired side of a sync run
#[derive(Debug, Clone)]
pub struct DesiredState {
    pub graph: ResourceGraph,
    pub services: BTreeMap<String, ServiceProfile>,
}

impl DesiredState {
    /// Flatten a document into desired resources.
    ///
    /// References are recorded but not resolved, so declarations may refer
    /// forward; call [`DesiredState::validate_references`] once loading is
    /// complete.
    ///
    /// # Errors
    ///
    /// Any malformed declaration aborts loading.
    #[instrument(skip_all, fields(services = document.services.len()))]
    pub fn load(document: &Document) -> Result<Self, DocumentError> {
        let mut graph = ResourceGraph::new(Origin::Desired);
        let mut services = BTreeMap::new();

        for (name, decl) in &document.services {
            validate_service_name(name)?;
            let profile = load_service(name, decl, &mut graph)?;
            services.insert(name.clone(), profile);
        }

        declare_used_targets(&mut graph, &services)?;

        debug!(resources = graph.len(), "loaded desired state");
        Ok(Self { graph, services })
    }

    /// Check that every reference names a declared resource.
    ///
    /// # Errors
    ///
    /// Returns the first [`DocumentError::UnknownService`] or
    /// [`DocumentError::UnresolvedReference`] in resource order.
    pub fn validate_references(&self) -> Result<(), DocumentError> {
        for edge in self.graph.references() {
            if !self.services.contains_key(&edge.to.service) {
                return Err(DocumentError::UnknownService {
                    service: edge.to.service.clone(),
                    from: edge.from,
                });
            }
            if !self.graph.contains(&edge.to) {
                return Err(DocumentError::UnresolvedReference {
                    from: edge.from,
                    to: edge.to,
                });
            }
        }
        Ok(())
    }

    /// Apply a run-wide prune switch over the per-service settings.
    pub fn override_prune(&mut self, prune: bool) {
        for profile in self.services.values_mut() {
            profile.override_prune(prune);
        }
    }

    pub fn service_type(&self, service: &str) -> Option<ServiceType> {
        self.services.get(service).map(|p| p.service_type)
    }

    /// Type of every declared service, by name
    pub fn service_types(&self) -> BTreeMap<String, ServiceType> {
        self.services
            .iter()
            .map(|(name, profile)| (name.clone(), profile.service_type))
            .collect()
    }
}

fn validate_service_name(name: &str) -> Result<(), DocumentError> {
    if name.is_empty() || name.contains([':', '/']) {
        return Err(DocumentError::InvalidDeclaration {
            location: format!("services.{}", name),
            reason: "service names must be non-empty and contain neither ':' nor '/'".into(),
        });
    }
    Ok(())
}

fn load_service(
    name: &str,
    decl: &ServiceDecl,
    graph: &mut ResourceGraph,
) -> Result<ServiceProfile, DocumentError> {
    let mut managed = BTreeSet::new();

    for (kind_name, kind_decl) in &decl.resources {
        let location = format!("services.{}.resources.{}", name, kind_name);
        let kind = parse_kind(kind_name, &location)?;
        if !kind.supported_by(decl.service_type) {
            return Err(DocumentError::UnsupportedKind {
                service: name.to_string(),
                service_type: decl.service_type,
                kind,
            });
        }
        managed.insert(kind);

        for (key, fields) in declarations(kind, kind_decl, &location)? {
            let sections = kind.sections(decl.service_type);
            if kind.is_singleton() && !sections.contains(&key.as_str()) {
                return Err(DocumentError::InvalidDeclaration {
                    location: format!("{}.{}", location, key),
                    reason: format!("unknown {} section, expected one of {}", kind, sections.join(", ")),
                });
            }
            let resource = build_resource(name, kind, &key, fields, &location)?;
            graph.insert(resource)?;
        }
    }

    let prune = match &decl.prune {
        PruneDecl::All(true) => managed.clone(),
        PruneDecl::All(false) => BTreeSet::new(),
        PruneDecl::PerKind(kinds) => {
            let mut prune = BTreeSet::new();
            for (kind_name, on) in kinds {
                let kind = parse_kind(kind_name, &format!("services.{}.prune", name))?;
                if *on && managed.contains(&kind) {
                    prune.insert(kind);
                }
            }
            prune
        }
    };

    Ok(ServiceProfile {
        service_type: decl.service_type,
        managed,
        prune,
    })
}

fn parse_kind(name: &str, location: &str) -> Result<ResourceKind, DocumentError> {
    name.parse().map_err(|_| DocumentError::InvalidDeclaration {
        location: location.to_string(),
        reason: format!("unknown resource kind '{}'", name),
    })
}

/// Normalize either declaration form into `(key, fields)` pairs.
fn declarations(
    kind: ResourceKind,
    decl: &KindDecl,
    location: &str,
) -> Result<Vec<(String, serde_json::Map<String, Value>)>, DocumentError> {
    let key_field = kind.key_field();
    let invalid = |at: String, reason: String| DocumentError::InvalidDeclaration {
        location: at,
        reason,
    };

    let mut out = Vec::new();
    match decl {
        KindDecl::Keyed(entries) => {
            for (key, value) in entries {
                let at = format!("{}.{}", location, key);
                let mut fields = match value {
                    Value::Object(map) => map.clone(),
                    Value::Null => serde_json::Map::new(),
                    other => {
                        return Err(invalid(at, format!("expected a mapping, got {}", other)));
                    }
                };
                if let Some(inner) = fields.remove(key_field)
                    && inner.as_str() != Some(key.as_str())
                {
                    return Err(invalid(
                        at,
                        format!("'{}' is {} but the entry is keyed '{}'", key_field, inner, key),
                    ));
                }
                out.push((key.clone(), fields));
            }
        }
        KindDecl::Listed(items) => {
            for (index, item) in items.iter().enumerate() {
                let at = format!("{}[{}]", location, index);
                match item {
                    Value::String(key) => out.push((key.clone(), serde_json::Map::new())),
                    Value::Object(map) => {
                        let mut fields = map.clone();
                        let key = match fields.remove(key_field) {
                            Some(Value::String(key)) => key,
                            _ => {
                                return Err(invalid(
                                    at,
                                    format!("missing string field '{}'", key_field),
                                ));
                            }
                        };
                        out.push((key, fields));
                    }
                    other => {
                        return Err(invalid(
                            at,
                            format!("expected a mapping or a key, got {}", other),
                        ));
                    }
                }
            }
        }
    }

    for (key, _) in &out {
        if key.trim().is_empty() {
            return Err(invalid(location.to_string(), "empty natural key".into()));
        }
    }
    Ok(out)
}

fn build_resource(
    service: &str,
    kind: ResourceKind,
    key: &str,
    raw: serde_json::Map<String, Value>,
    location: &str,
) -> Result<Resource, DocumentError> {
    let at = format!("{}.{}", location, key);

    let mut fields = BTreeMap::new();
    for (name, value) in raw {
        fields.insert(name, to_field(value, service)?);
    }
    for (name, value) in kind.defaults() {
        fields.entry(name).or_insert(value);
    }
    for (name, value) in &fields {
        check_keyed_lists(kind, name, value).map_err(|reason| DocumentError::InvalidDeclaration {
            location: format!("{}.{}", at, name),
            reason,
        })?;
    }

    let mut resource = Resource::desired(ResourceId::new(service, kind, key), fields);

    let mut rejected = None;
    resource.rewrite_reference_slots(|target, slot| {
        if let Some(name) = slot.as_str().map(str::to_string) {
            *slot = FieldValue::Ref(ResourceId::new(service, target, name));
        } else if !matches!(slot, FieldValue::Ref(_) | FieldValue::Null) && rejected.is_none() {
            rejected = Some(format!(
                "{} must be referenced by name, got {}",
                target,
                slot.to_json()
            ));
        }
    });
    if let Some(reason) = rejected {
        return Err(DocumentError::InvalidDeclaration {
            location: at,
            reason,
        });
    }

    Ok(resource)
}

/// Every element of a keyed list must carry its key, or the diff could never
/// match it against a live element.
fn check_keyed_lists(kind: ResourceKind, path: &str, value: &FieldValue) -> Result<(), String> {
    match value {
        FieldValue::Map(map) => map
            .iter()
            .try_for_each(|(name, inner)| check_keyed_lists(kind, &format!("{}.{}", path, name), inner)),
        FieldValue::List(items) => {
            if let ListMode::Keyed(key) = kind.list_mode(path)
                && let Some(index) = items
                    .iter()
                    .position(|item| item.as_map().is_none_or(|m| !m.contains_key(key)))
            {
                return Err(format!("element {} has no '{}'", index, key));
            }
            let element = format!("{}[]", path);
            items
                .iter()
                .try_for_each(|item| check_keyed_lists(kind, &element, item))
        }
        _ => Ok(()),
    }
}

/// Convert a declared value, turning `{"$ref": "..."}` objects into references.
fn to_field(value: Value, service: &str) -> Result<FieldValue, DocumentError> {
    match value {
        Value::Object(map) => {
            if map.len() == 1
                && let Some(Value::String(target)) = map.get(REF_KEY)
            {
                return Ok(FieldValue::Ref(ResourceId::parse(target, service)?));
            }
            let mut out = BTreeMap::new();
            for (name, inner) in map {
                out.insert(name, to_field(inner, service)?);
            }
            Ok(FieldValue::Map(out))
        }
        Value::Array(items) => Ok(FieldValue::List(
            items
                .into_iter()
                .map(|item| to_field(item, service))
                .collect::<Result<_, _>>()?,
        )),
        other => Ok(FieldValue::from_json(other)),
    }
}

/// Declare referenced tags and metadata profiles the document does not
/// list. An empty declaration only asks for the resource to exist.
fn declare_used_targets(
    graph: &mut ResourceGraph,
    services: &BTreeMap<String, ServiceProfile>,
) -> Result<(), DocumentError> {
    let missing: BTreeSet<ResourceId> = graph
        .references()
        .into_iter()
        .map(|edge| edge.to)
        .filter(|to| to.kind.declared_by_use() && !graph.contains(to))
        .filter(|to| {
            services
                .get(&to.service)
                .is_some_and(|p| to.kind.supported_by(p.service_type))
        })
        .collect();

    for id in missing {
        debug!(resource = %id, "declaring from usage");
        graph.insert(Resource::desired(id, BTreeMap::new()))?;
    }
    Ok(())
}
