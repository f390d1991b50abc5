//! Desired vs live comparison
//!
//! Comparison is one-sided: only what the desired resource declares is
//! checked against live state. Fields the service fills in on its own (ids,
//! computed values, settings nobody declared) never cause an update.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use arrsync_model::{FieldValue, ListMode, Resource, ResourceGraph, ResourceId, ResourceKind};

use crate::config::ServiceProfile;

/// What a change does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Noop,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Noop => "noop",
        };
        f.write_str(s)
    }
}

/// One differing top-level field of an update
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub desired: FieldValue,
    /// `None` when the live object lacks the field entirely
    pub live: Option<FieldValue>,
}

/// One unit of reconciliation work
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeOp {
    pub id: ResourceId,
    pub operation: Operation,
    /// Present for create, update and noop
    pub desired: Option<Resource>,
    /// Present for update, delete and noop
    pub live: Option<Resource>,
    /// Present for update only
    pub changes: Vec<FieldChange>,
}

impl ChangeOp {
    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }

    pub fn service(&self) -> &str {
        &self.id.service
    }

    /// Names of the changed fields
    pub fn changed_fields(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.field.clone()).collect()
    }

    pub fn is_mutation(&self) -> bool {
        self.operation != Operation::Noop
    }
}

/// Pair desired and live resources into change operations.
///
/// Resources of services listed in `skipped` are left out entirely. Live-only
/// resources are considered only for kinds the document manages for their
/// service; they become deletes when that service prunes the kind and the
/// kind can be deleted, no-ops otherwise.
///
/// Output is ordered by resource id.
pub fn diff(
    desired: &ResourceGraph,
    live: &ResourceGraph,
    services: &BTreeMap<String, ServiceProfile>,
    skipped: &BTreeSet<String>,
) -> Vec<ChangeOp> {
    let mut ops = Vec::new();

    for wanted in desired.iter() {
        if skipped.contains(wanted.service()) {
            continue;
        }
        let op = match live.get(&wanted.id) {
            None => ChangeOp {
                id: wanted.id.clone(),
                operation: Operation::Create,
                desired: Some(wanted.clone()),
                live: None,
                changes: Vec::new(),
            },
            Some(current) => {
                let changes = field_changes(wanted, current);
                ChangeOp {
                    id: wanted.id.clone(),
                    operation: if changes.is_empty() {
                        Operation::Noop
                    } else {
                        Operation::Update
                    },
                    desired: Some(wanted.clone()),
                    live: Some(current.clone()),
                    changes,
                }
            }
        };
        ops.push(op);
    }

    for current in live.iter() {
        if desired.contains(&current.id) || skipped.contains(current.service()) {
            continue;
        }
        let Some(profile) = services.get(current.service()) else {
            continue;
        };
        let kind = current.kind();
        if !profile.manages(kind) {
            continue;
        }
        let operation = if profile.prunes(kind) && kind.can_delete() {
            Operation::Delete
        } else {
            Operation::Noop
        };
        ops.push(ChangeOp {
            id: current.id.clone(),
            operation,
            desired: None,
            live: Some(current.clone()),
            changes: Vec::new(),
        });
    }

    ops.sort_by(|a, b| a.id.cmp(&b.id));
    ops
}

/// Top-level fields of `desired` whose value `live` does not satisfy
pub fn field_changes(desired: &Resource, live: &Resource) -> Vec<FieldChange> {
    let kind = desired.kind();
    desired
        .fields
        .iter()
        .filter_map(|(name, wanted)| {
            let current = live.fields.get(name);
            let satisfied = match current {
                Some(value) => satisfies(kind, name, wanted, value),
                None => matches!(wanted, FieldValue::Null),
            };
            (!satisfied).then(|| FieldChange {
                field: name.clone(),
                desired: wanted.clone(),
                live: current.cloned(),
            })
        })
        .collect()
}

/// Whether `live` already holds everything `desired` asks for at `path`.
pub fn satisfies(kind: ResourceKind, path: &str, desired: &FieldValue, live: &FieldValue) -> bool {
    match (desired, live) {
        (FieldValue::Map(wanted), FieldValue::Map(current)) => wanted.iter().all(|(name, value)| {
            let child = format!("{}.{}", path, name);
            match current.get(name) {
                Some(inner) => satisfies(kind, &child, value, inner),
                None => matches!(value, FieldValue::Null),
            }
        }),
        (FieldValue::List(wanted), FieldValue::List(current)) => {
            let element = format!("{}[]", path);
            match kind.list_mode(path) {
                ListMode::Exact => {
                    wanted.len() == current.len()
                        && wanted
                            .iter()
                            .zip(current)
                            .all(|(w, c)| satisfies(kind, &element, w, c))
                }
                ListMode::Set => {
                    wanted.len() == current.len() && set_matches(kind, &element, wanted, current)
                }
                ListMode::Keyed(key) => wanted.iter().all(|w| {
                    let Some(wanted_key) = w.as_map().and_then(|m| m.get(key)) else {
                        return false;
                    };
                    current
                        .iter()
                        .find(|c| {
                            c.as_map()
                                .and_then(|m| m.get(key))
                                .is_some_and(|k| satisfies(kind, "", wanted_key, k))
                        })
                        .is_some_and(|c| satisfies(kind, &element, w, c))
                }),
            }
        }
        (FieldValue::Ref(wanted), FieldValue::Ref(current)) => wanted == current,
        // Cross-service references are written as the target's key
        (FieldValue::Ref(wanted), FieldValue::String(current)) => {
            wanted.key.eq_ignore_ascii_case(current)
        }
        (wanted, current) => wanted.scalar_eq(current),
    }
}

/// Order-insensitive match where every live element pairs with one desired
/// element.
fn set_matches(kind: ResourceKind, path: &str, wanted: &[FieldValue], current: &[FieldValue]) -> bool {
    let mut used = vec![false; current.len()];
    wanted.iter().all(|w| {
        let found = current
            .iter()
            .enumerate()
            .position(|(i, c)| !used[i] && satisfies(kind, path, w, c));
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}
