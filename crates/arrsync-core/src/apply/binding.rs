//! Binding references to the identifiers a service expects

use std::collections::HashMap;

use arrsync_model::{FieldValue, Resource, ResourceGraph, ResourceId, ResourceKind};

/// Remote ids of one service's resources, by natural key
///
/// Seeded from live state and kept current as creates and deletes succeed.
/// Owned by a single service worker, so it needs no locking.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    service: String,
    ids: HashMap<(ResourceKind, String), i64>,
}

impl IdIndex {
    pub fn seed(service: &str, live: &ResourceGraph) -> Self {
        let ids = live
            .iter()
            .filter(|r| r.service() == service)
            .filter_map(|r| r.remote_id().map(|id| ((r.kind(), r.key().to_string()), id)))
            .collect();
        Self {
            service: service.to_string(),
            ids,
        }
    }

    pub fn lookup(&self, id: &ResourceId) -> Option<i64> {
        self.ids.get(&(id.kind, id.key.clone())).copied()
    }

    pub fn record(&mut self, id: &ResourceId, remote_id: i64) {
        self.ids.insert((id.kind, id.key.clone()), remote_id);
    }

    pub fn forget(&mut self, id: &ResourceId) {
        self.ids.remove(&(id.kind, id.key.clone()));
    }

    /// Copy of `resource` ready for the wire.
    ///
    /// References within the service become numeric ids. References to
    /// other services become the target's natural key, which is how the
    /// services name each other's objects.
    ///
    /// # Errors
    ///
    /// Fails when a same-service target has no known remote id, which
    /// happens when its own create failed or was skipped.
    pub fn bind(&self, resource: &Resource) -> arrsync_model::Result<Resource> {
        resource.bind(|target| {
            if target.service == self.service {
                self.lookup(target).map(FieldValue::from)
            } else {
                Some(FieldValue::String(target.key.clone()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrsync_model::{Origin, RemoteHandle};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_bind_same_and_cross_service() {
        let mut live = ResourceGraph::new(Origin::Live);
        live.insert(Resource::live(
            ResourceId::new("tv", ResourceKind::Tag, "anime"),
            BTreeMap::new(),
            RemoteHandle {
                id: Some(4),
                raw: json!({}),
            },
        ))
        .unwrap();
        let index = IdIndex::seed("tv", &live);

        let profile = Resource::desired(
            ResourceId::new("tv", ResourceKind::ReleaseProfile, "Preferred"),
            BTreeMap::new(),
        )
        .with_field(
            "tags",
            FieldValue::List(vec![FieldValue::Ref(ResourceId::new("tv", ResourceKind::Tag, "anime"))]),
        )
        .with_field(
            "indexerId",
            FieldValue::Ref(ResourceId::new("idx", ResourceKind::Indexer, "Nyaa")),
        );

        let bound = index.bind(&profile).unwrap();
        assert_eq!(bound.fields["tags"], FieldValue::List(vec![FieldValue::from(4i64)]));
        assert_eq!(bound.fields["indexerId"], FieldValue::from("Nyaa"));
    }

    #[test]
    fn test_bind_fails_for_unknown_target() {
        let index = IdIndex::seed("tv", &ResourceGraph::new(Origin::Live));
        let profile = Resource::desired(
            ResourceId::new("tv", ResourceKind::QualityProfile, "UHD"),
            BTreeMap::new(),
        )
        .with_field(
            "formatItems",
            FieldValue::List(vec![FieldValue::map([(
                "format",
                FieldValue::Ref(ResourceId::new("tv", ResourceKind::CustomFormat, "HDR")),
            )])]),
        );

        assert!(index.bind(&profile).is_err());
    }

    #[test]
    fn test_record_and_forget() {
        let mut index = IdIndex::seed("tv", &ResourceGraph::new(Origin::Live));
        let id = ResourceId::new("tv", ResourceKind::CustomFormat, "HDR");
        index.record(&id, 12);
        assert_eq!(index.lookup(&id), Some(12));
        index.forget(&id);
        assert_eq!(index.lookup(&id), None);
    }
}
