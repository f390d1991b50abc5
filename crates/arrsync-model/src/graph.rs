//! Resource graphs keyed by `(service, kind, key)`

use std::collections::{BTreeMap, BTreeSet};

use crate::kind::ResourceKind;
use crate::resource::{Origin, ReferenceEdge, Resource, ResourceId};
use crate::{Error, Result};

/// A set of resources from one side of the comparison
///
/// Iteration order follows [`ResourceId`] ordering, so anything derived
/// from a graph (plans, reports) is deterministic.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    origin: Origin,
    resources: BTreeMap<ResourceId, Resource>,
}

impl ResourceGraph {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            resources: BTreeMap::new(),
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Insert a resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if a resource with the same id is
    /// already present. The graph is left unchanged.
    pub fn insert(&mut self, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&resource.id) {
            return Err(Error::DuplicateKey { id: resource.id });
        }
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    /// Service names that own at least one resource
    pub fn services(&self) -> BTreeSet<&str> {
        self.resources.keys().map(|id| id.service.as_str()).collect()
    }

    /// Kinds present for one service
    pub fn kinds_for(&self, service: &str) -> BTreeSet<ResourceKind> {
        self.resources
            .keys()
            .filter(|id| id.service == service)
            .map(|id| id.kind)
            .collect()
    }

    /// Resources of one kind on one service, in key order
    pub fn of_kind<'a>(
        &'a self,
        service: &'a str,
        kind: ResourceKind,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .values()
            .filter(move |r| r.id.service == service && r.id.kind == kind)
    }

    /// Find a live resource by the numeric id its service assigned
    pub fn find_by_remote_id<'a>(
        &'a self,
        service: &'a str,
        kind: ResourceKind,
        remote_id: i64,
    ) -> Option<&'a Resource> {
        self.of_kind(service, kind)
            .find(|r| r.remote_id() == Some(remote_id))
    }

    /// Move every resource of `other` into this graph.
    ///
    /// # Errors
    ///
    /// Fails on the first id collision.
    pub fn extend(&mut self, other: ResourceGraph) -> Result<()> {
        for resource in other.resources.into_values() {
            self.insert(resource)?;
        }
        Ok(())
    }

    /// Every reference edge held by any resource
    pub fn references(&self) -> Vec<ReferenceEdge> {
        self.resources.values().flat_map(|r| r.references()).collect()
    }
}
