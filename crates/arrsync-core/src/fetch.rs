//! Live-state fetching and normalization

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{Instrument, info_span, instrument, warn};

use arrsync_client::{AdapterError, ServiceAdapter};
use arrsync_model::{FieldValue, Origin, Resource, ResourceGraph, ResourceKind};

use crate::config::ServiceProfile;

/// A service whose live state could not be read
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub service: String,
    /// Kind being fetched when the failure happened; `None` for the health check
    pub kind: Option<ResourceKind>,
    pub error: String,
}

/// The live side of a sync run
#[derive(Debug, Clone)]
pub struct LiveState {
    pub graph: ResourceGraph,
    pub failures: Vec<FetchFailure>,
}

impl LiveState {
    /// Services excluded from this run
    pub fn skipped(&self) -> BTreeSet<String> {
        self.failures.iter().map(|f| f.service.clone()).collect()
    }
}

/// Kinds to read from a service: the managed kinds plus the kinds they
/// reference, which are needed to turn live ids back into natural keys.
pub fn kinds_to_fetch(profile: &ServiceProfile, desired_kinds: &BTreeSet<ResourceKind>) -> Vec<ResourceKind> {
    let mut kinds: BTreeSet<ResourceKind> = profile.managed.union(desired_kinds).copied().collect();
    let referenced: Vec<ResourceKind> = kinds
        .iter()
        .flat_map(|k| k.reference_fields().iter().map(|r| r.target))
        .collect();
    kinds.extend(referenced);
    kinds
        .into_iter()
        .filter(|k| k.supported_by(profile.service_type))
        .collect()
}

/// Read the live state of every service that has something declared.
///
/// Services are fetched concurrently. A failure excludes only the failing
/// service; its partial results are discarded.
#[instrument(skip_all)]
pub async fn fetch_live(
    desired: &ResourceGraph,
    services: &BTreeMap<String, ServiceProfile>,
    adapters: &BTreeMap<String, Arc<dyn ServiceAdapter>>,
) -> LiveState {
    let mut pending = Vec::new();
    for (name, profile) in services {
        let desired_kinds = desired.kinds_for(name);
        if profile.managed.is_empty() && desired_kinds.is_empty() {
            continue;
        }
        let Some(adapter) = adapters.get(name) else {
            continue;
        };
        let kinds = kinds_to_fetch(profile, &desired_kinds);
        let span = info_span!("fetch", service = %name);
        pending.push(fetch_service(Arc::clone(adapter), kinds).instrument(span));
    }

    let mut graph = ResourceGraph::new(Origin::Live);
    let mut failures = Vec::new();
    for result in join_all(pending).await {
        match result {
            Ok(service_graph) => {
                if let Err(err) = graph.extend(service_graph) {
                    // Adapters only return resources of their own service
                    warn!(error = %err, "conflicting live resources");
                }
            }
            Err(failure) => {
                warn!(
                    service = %failure.service,
                    kind = ?failure.kind,
                    error = %failure.error,
                    "skipping service"
                );
                failures.push(failure);
            }
        }
    }

    LiveState { graph, failures }
}

async fn fetch_service(
    adapter: Arc<dyn ServiceAdapter>,
    kinds: Vec<ResourceKind>,
) -> Result<ResourceGraph, FetchFailure> {
    let service = adapter.service().to_string();
    let failure = |kind: Option<ResourceKind>, error: AdapterError| FetchFailure {
        service: service.clone(),
        kind,
        error: error.to_string(),
    };

    adapter.ping().await.map_err(|e| failure(None, e))?;

    let mut graph = ResourceGraph::new(Origin::Live);
    for kind in kinds {
        let resources = adapter
            .fetch_all(kind)
            .await
            .map_err(|e| failure(Some(kind), e))?;
        for resource in resources {
            if resource.service() != service || resource.kind() != kind {
                return Err(FetchFailure {
                    service: service.clone(),
                    kind: Some(kind),
                    error: format!("adapter returned foreign resource {}", resource.id),
                });
            }
            // Services do not enforce unique names for every kind; keep the first
            if graph.contains(&resource.id) {
                warn!(resource = %resource.id, "duplicate live key, ignoring later copy");
                continue;
            }
            graph
                .insert(resource)
                .map_err(|e| FetchFailure {
                    service: service.clone(),
                    kind: Some(kind),
                    error: e.to_string(),
                })?;
        }
    }

    normalize_references(&mut graph);
    Ok(graph)
}

/// Rewrite numeric ids at reference paths into references by natural key.
///
/// Ids that match no live resource stay numeric, so they never compare equal
/// to a declared reference.
pub fn normalize_references(graph: &mut ResourceGraph) {
    let lookup: BTreeMap<(ResourceKind, i64), Resource> = graph
        .iter()
        .filter_map(|r| r.remote_id().map(|id| ((r.kind(), id), r.clone())))
        .collect();

    for resource in graph.iter_mut() {
        resource.rewrite_reference_slots(|target, slot| {
            if let Some(remote_id) = slot.as_i64()
                && let Some(found) = lookup.get(&(target, remote_id))
            {
                *slot = FieldValue::Ref(found.id.clone());
            }
        });
    }
}
