//! Dependency graph and topological ordering of change operations
//!
//! Edges point from dependent to dependency: if A depends on B, the edge is
//! `A -> B` and B is ordered first. Each edge is tagged:
//!
//! - [`EdgeKind::Reference`]: A holds a reference to B. If B does not
//!   succeed, A is blocked.
//! - [`EdgeKind::Ordering`]: A only has to run after B, whatever B's outcome.
//!
//! Edge sources, in order of construction:
//!
//! 1. intrinsic kind order within one service (custom formats before
//!    quality profiles, tags before everything that carries tags)
//! 2. references held by desired resources
//! 3. static cross-service order (indexer-manager indexers before
//!    library-manager release profiles)
//! 4. deletes: after every other operation of their service, dependents
//!    before what they depend on, following live references
//!
//! Ties are broken by `(phase, kind rank, service, key)`, so the same input
//! always yields the same order.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use arrsync_model::{ResourceGraph, ResourceId, ResourceKind, ServiceType};

use super::differ::{ChangeOp, Operation};
use crate::error::DocumentError;

/// How a dependency constrains its dependent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Ordering,
    Reference,
}

/// Tie-break key of a node in the ready set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadyKey {
    pub phase: u8,
    pub rank: usize,
    pub service: String,
    pub key: String,
}

impl ReadyKey {
    fn for_op(op: &ChangeOp) -> Self {
        let rank = op.kind().rank();
        match op.operation {
            Operation::Delete => Self {
                phase: 1,
                rank: ResourceKind::ALL.len() - rank,
                service: op.id.service.clone(),
                key: op.id.key.clone(),
            },
            _ => Self {
                phase: 0,
                rank,
                service: op.id.service.clone(),
                key: op.id.key.clone(),
            },
        }
    }

    fn for_resource(id: &ResourceId) -> Self {
        Self {
            phase: 0,
            rank: id.kind.rank(),
            service: id.service.clone(),
            key: id.key.clone(),
        }
    }
}

/// Directed graph over numbered nodes with tagged edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    keys: Vec<ReadyKey>,
    /// `deps[a]` holds every node `a` depends on
    deps: Vec<BTreeMap<usize, EdgeKind>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index.
    pub fn add_node(&mut self, key: ReadyKey) -> usize {
        self.keys.push(key);
        self.deps.push(BTreeMap::new());
        self.keys.len() - 1
    }

    /// Declare that `from` depends on `to`.
    ///
    /// When both a reference and an ordering edge connect the same pair, the
    /// reference wins.
    pub fn add_edge(&mut self, from: usize, to: usize, kind: EdgeKind) {
        let slot = self.deps[from].entry(to).or_insert(kind);
        *slot = (*slot).max(kind);
    }

    pub fn node_count(&self) -> usize {
        self.keys.len()
    }

    pub fn edge_count(&self) -> usize {
        self.deps.iter().map(BTreeMap::len).sum()
    }

    /// Direct dependencies of a node
    pub fn dependencies_of(&self, node: usize) -> impl Iterator<Item = (usize, EdgeKind)> + '_ {
        self.deps[node].iter().map(|(&to, &kind)| (to, kind))
    }

    /// Kahn's algorithm with a ready set ordered by [`ReadyKey`].
    ///
    /// # Errors
    ///
    /// On a cycle, returns the nodes that lie on or between cycles.
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let count = self.node_count();
        let mut in_degree: Vec<usize> = self.deps.iter().map(BTreeMap::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (from, deps) in self.deps.iter().enumerate() {
            for &to in deps.keys() {
                dependents[to].push(from);
            }
        }

        let mut ready: BTreeSet<(&ReadyKey, usize)> = (0..count)
            .filter(|&n| in_degree[n] == 0)
            .map(|n| (&self.keys[n], n))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some((_, current)) = ready.pop_first() {
            order.push(current);
            for &dependent in &dependents[current] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert((&self.keys[dependent], dependent));
                }
            }
        }

        if order.len() == count {
            return Ok(order);
        }

        // Peel off nodes that merely sit downstream of a cycle
        let mut remaining: BTreeSet<usize> = (0..count).filter(|&n| in_degree[n] > 0).collect();
        loop {
            let downstream: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&n| !dependents[n].iter().any(|d| remaining.contains(d)))
                .collect();
            if downstream.is_empty() {
                break;
            }
            for n in downstream {
                remaining.remove(&n);
            }
        }
        Err(remaining.into_iter().collect())
    }
}

/// A change operation placed in the global order
#[derive(Debug, Clone)]
pub struct ScheduledOp {
    pub op: ChangeOp,
    /// Positions in [`Schedule::ops`] this operation waits for; always lower
    /// than its own position
    pub deps: Vec<(usize, EdgeKind)>,
    /// A referenced resource that has no operation in this run because its
    /// service was skipped
    pub unavailable: Option<ResourceId>,
}

/// Change operations in dependency order
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub ops: Vec<ScheduledOp>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Services with at least one operation, in name order
    pub fn services(&self) -> BTreeSet<String> {
        self.ops.iter().map(|s| s.op.id.service.clone()).collect()
    }

    /// Positions of one service's operations, in schedule order
    pub fn positions_for(&self, service: &str) -> Vec<usize> {
        self.ops
            .iter()
            .enumerate()
            .filter(|(_, s)| s.op.service() == service)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Order change operations.
///
/// `service_types` supplies the role of each service for the static
/// cross-service table.
///
/// # Errors
///
/// Returns [`DocumentError::DependencyCycle`] naming the resources involved.
pub fn schedule(
    ops: Vec<ChangeOp>,
    service_types: &BTreeMap<String, ServiceType>,
) -> Result<Schedule, DocumentError> {
    let mut graph = DependencyGraph::new();
    let mut index: BTreeMap<ResourceId, usize> = BTreeMap::new();
    for op in &ops {
        let node = graph.add_node(ReadyKey::for_op(op));
        index.insert(op.id.clone(), node);
    }

    let is_delete = |n: usize| ops[n].operation == Operation::Delete;

    // Non-delete operations grouped by (service, kind)
    let mut upserts: BTreeMap<(&str, ResourceKind), Vec<usize>> = BTreeMap::new();
    let mut deletes: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n, op) in ops.iter().enumerate() {
        if is_delete(n) {
            deletes.entry(op.service()).or_default().push(n);
        } else {
            upserts.entry((op.service(), op.kind())).or_default().push(n);
        }
    }

    let mut unavailable: BTreeMap<usize, ResourceId> = BTreeMap::new();

    // 1. intrinsic kind order, 3. static cross-service order
    add_kind_order_edges(&mut graph, &upserts, service_types);

    // 2. references
    for (n, op) in ops.iter().enumerate() {
        if is_delete(n) {
            continue;
        }
        if let Some(desired) = &op.desired {
            for edge in desired.references() {
                match index.get(&edge.to) {
                    Some(&m) if !is_delete(m) => graph.add_edge(n, m, EdgeKind::Reference),
                    Some(_) => {}
                    None => {
                        unavailable.entry(n).or_insert(edge.to);
                    }
                }
            }
        }
    }

    // 4. deletes
    for (service, nodes) in &deletes {
        for &d in nodes {
            for ((other, _), upsert_nodes) in &upserts {
                if other == service {
                    for &m in upsert_nodes {
                        graph.add_edge(d, m, EdgeKind::Ordering);
                    }
                }
            }
            for &e in nodes {
                if ops[e].kind().dependencies().contains(&ops[d].kind()) {
                    graph.add_edge(d, e, EdgeKind::Ordering);
                }
            }
            if let Some(live) = &ops[d].live {
                for edge in live.references() {
                    if let Some(&target) = index.get(&edge.to)
                        && is_delete(target)
                        && target != d
                    {
                        graph.add_edge(target, d, EdgeKind::Ordering);
                    }
                }
            }
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built dependency graph"
    );

    let order = graph.topological_sort().map_err(|nodes| DocumentError::DependencyCycle {
        participants: nodes.into_iter().map(|n| ops[n].id.clone()).collect(),
    })?;

    let mut position = vec![0; ops.len()];
    for (pos, &node) in order.iter().enumerate() {
        position[node] = pos;
    }

    let mut numbered: Vec<(usize, ChangeOp)> = ops.into_iter().enumerate().collect();
    numbered.sort_by_key(|(node, _)| position[*node]);
    let scheduled = numbered
        .into_iter()
        .map(|(node, op)| ScheduledOp {
            op,
            deps: graph
                .dependencies_of(node)
                .map(|(to, kind)| (position[to], kind))
                .collect(),
            unavailable: unavailable.remove(&node),
        })
        .collect();

    Ok(Schedule { ops: scheduled })
}

/// Ordering edges between upserts: intrinsic kind order within a service
/// and the static cross-service table.
fn add_kind_order_edges(
    graph: &mut DependencyGraph,
    upserts: &BTreeMap<(&str, ResourceKind), Vec<usize>>,
    service_types: &BTreeMap<String, ServiceType>,
) {
    for (&(service, kind), nodes) in upserts {
        let mut targets = Vec::new();
        for dep_kind in kind.dependencies() {
            targets.extend(upserts.get(&(service, *dep_kind)).into_iter().flatten().copied());
        }
        if let Some(service_type) = service_types.get(service) {
            for (role, dep_kind) in kind.cross_service_dependencies(*service_type) {
                for (&(other, other_kind), others) in upserts {
                    let matches_role = service_types
                        .get(other)
                        .is_some_and(|t| t.role() == *role);
                    if other_kind == *dep_kind && other != service && matches_role {
                        targets.extend(others.iter().copied());
                    }
                }
            }
        }
        for &n in nodes {
            for &m in &targets {
                graph.add_edge(n, m, EdgeKind::Ordering);
            }
        }
    }
}

/// Reject dependency cycles among desired resources before any network
/// call.
///
/// Uses the same edges [`schedule`] builds for creates and updates, so a
/// document that passes here cannot fail to schedule.
///
/// # Errors
///
/// Returns [`DocumentError::DependencyCycle`] naming the resources involved.
pub fn check_acyclic(
    desired: &ResourceGraph,
    service_types: &BTreeMap<String, ServiceType>,
) -> Result<(), DocumentError> {
    let mut graph = DependencyGraph::new();
    let mut index = BTreeMap::new();
    let mut ids = Vec::with_capacity(desired.len());
    let mut upserts: BTreeMap<(&str, ResourceKind), Vec<usize>> = BTreeMap::new();
    for resource in desired.iter() {
        let node = graph.add_node(ReadyKey::for_resource(&resource.id));
        index.insert(resource.id.clone(), node);
        ids.push(resource.id.clone());
        upserts
            .entry((resource.service(), resource.kind()))
            .or_default()
            .push(node);
    }

    add_kind_order_edges(&mut graph, &upserts, service_types);
    for edge in desired.references() {
        if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
            graph.add_edge(from, to, EdgeKind::Reference);
        }
    }

    graph
        .topological_sort()
        .map(|_| ())
        .map_err(|nodes| DocumentError::DependencyCycle {
            participants: nodes.into_iter().map(|n| ids[n].clone()).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrsync_model::{FieldValue, Origin, RemoteHandle, Resource};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn create(service: &str, kind: ResourceKind, key: &str) -> ChangeOp {
        let id = ResourceId::new(service, kind, key);
        ChangeOp {
            id: id.clone(),
            operation: Operation::Create,
            desired: Some(Resource::desired(id, BTreeMap::new())),
            live: None,
            changes: Vec::new(),
        }
    }

    fn delete(service: &str, kind: ResourceKind, key: &str) -> ChangeOp {
        let id = ResourceId::new(service, kind, key);
        ChangeOp {
            id: id.clone(),
            operation: Operation::Delete,
            desired: None,
            live: Some(Resource::live(
                id,
                BTreeMap::new(),
                RemoteHandle {
                    id: Some(1),
                    raw: json!({}),
                },
            )),
            changes: Vec::new(),
        }
    }

    fn types() -> BTreeMap<String, ServiceType> {
        BTreeMap::from([
            ("idx".to_string(), ServiceType::Prowlarr),
            ("tv".to_string(), ServiceType::Sonarr),
        ])
    }

    fn order(schedule: &Schedule) -> Vec<String> {
        schedule.ops.iter().map(|s| s.op.id.to_string()).collect()
    }

    #[test]
    fn test_custom_format_before_quality_profile() {
        let hdr = ResourceId::new("tv", ResourceKind::CustomFormat, "HDR");
        let mut uhd = create("tv", ResourceKind::QualityProfile, "UHD");
        uhd.desired = uhd.desired.map(|r| {
            r.with_field(
                "formatItems",
                FieldValue::List(vec![FieldValue::map([("format", FieldValue::Ref(hdr.clone()))])]),
            )
        });

        let schedule = schedule(vec![uhd, create("tv", ResourceKind::CustomFormat, "HDR")], &types()).unwrap();

        assert_eq!(order(&schedule), vec!["tv:customFormat/HDR", "tv:qualityProfile/UHD"]);
        assert_eq!(schedule.ops[1].deps, vec![(0, EdgeKind::Reference)]);
    }

    #[test]
    fn test_ties_break_by_rank_then_service_then_key() {
        let schedule = schedule(
            vec![
                create("tv", ResourceKind::RootFolder, "/b"),
                create("tv", ResourceKind::Notification, "z"),
                create("idx", ResourceKind::Notification, "z"),
                create("tv", ResourceKind::Notification, "a"),
            ],
            &types(),
        )
        .unwrap();

        assert_eq!(
            order(&schedule),
            vec![
                "idx:notification/z",
                "tv:notification/a",
                "tv:notification/z",
                "tv:rootFolder//b"
            ]
        );
    }

    #[test]
    fn test_release_profiles_wait_for_indexer_manager() {
        let schedule = schedule(
            vec![
                create("tv", ResourceKind::ReleaseProfile, "Preferred"),
                create("idx", ResourceKind::Indexer, "Nyaa"),
            ],
            &types(),
        )
        .unwrap();

        assert_eq!(order(&schedule), vec!["idx:indexer/Nyaa", "tv:releaseProfile/Preferred"]);
        assert_eq!(schedule.ops[1].deps, vec![(0, EdgeKind::Ordering)]);
    }

    #[test]
    fn test_deletes_after_upserts_in_reverse_kind_order() {
        let schedule = schedule(
            vec![
                delete("tv", ResourceKind::Tag, "old"),
                delete("tv", ResourceKind::DownloadClient, "legacy"),
                create("tv", ResourceKind::CustomFormat, "HDR"),
            ],
            &types(),
        )
        .unwrap();

        assert_eq!(
            order(&schedule),
            vec![
                "tv:customFormat/HDR",
                "tv:downloadClient/legacy",
                "tv:tag/old"
            ]
        );
    }

    #[test]
    fn test_reference_cycle_is_reported() {
        let tag = ResourceId::new("tv", ResourceKind::Tag, "loop");
        let folder = ResourceId::new("tv", ResourceKind::RootFolder, "/data");
        let mut desired = ResourceGraph::new(Origin::Desired);
        desired
            .insert(
                Resource::desired(tag.clone(), BTreeMap::new())
                    .with_field("note", FieldValue::Ref(folder.clone())),
            )
            .unwrap();
        desired
            .insert(
                Resource::desired(folder.clone(), BTreeMap::new())
                    .with_field("defaultTags", FieldValue::List(vec![FieldValue::Ref(tag.clone())])),
            )
            .unwrap();
        desired
            .insert(
                Resource::desired(ResourceId::new("tv", ResourceKind::CustomFormat, "HDR"), BTreeMap::new())
                    .with_field("extra", FieldValue::Ref(tag.clone())),
            )
            .unwrap();

        let err = check_acyclic(&desired, &types()).unwrap_err();
        assert_eq!(
            err,
            DocumentError::DependencyCycle {
                participants: vec![tag, folder],
            }
        );
    }

    #[test]
    fn test_reference_into_skipped_service_is_marked_unavailable() {
        let mut profile = create("tv", ResourceKind::ReleaseProfile, "Preferred");
        let nyaa = ResourceId::new("idx", ResourceKind::Indexer, "Nyaa");
        profile.desired = profile
            .desired
            .map(|r| r.with_field("indexerId", FieldValue::Ref(nyaa.clone())));

        let schedule = schedule(vec![profile], &types()).unwrap();
        assert_eq!(schedule.ops[0].unavailable, Some(nyaa));
    }

    #[test]
    fn test_dependency_graph_orders_by_key() {
        let mut graph = DependencyGraph::new();
        let key = |k: &str| ReadyKey {
            phase: 0,
            rank: 0,
            service: "s".into(),
            key: k.into(),
        };
        let c = graph.add_node(key("c"));
        let a = graph.add_node(key("a"));
        let b = graph.add_node(key("b"));
        graph.add_edge(a, c, EdgeKind::Ordering);

        assert_eq!(graph.topological_sort().unwrap(), vec![b, c, a]);
    }
}
