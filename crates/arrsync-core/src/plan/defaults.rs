//! Desired values that depend on live state
//!
//! Filled in after fetching and before diffing, so the diff and the
//! scheduler see them like any declared value.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use arrsync_model::{FieldValue, ResourceGraph, ResourceId, ResourceKind};

use crate::config::ServiceProfile;

const APP_PROFILE_FIELD: &str = "appProfileId";
const FORMAT_ITEMS_FIELD: &str = "formatItems";

/// Complete desired resources from live state.
///
/// - Indexers that do not name an app profile get the default one, see
///   [`default_app_profile`].
/// - Quality profiles about to be created list every custom format the
///   service will have, scored 0 unless declared. The services reject a
///   new profile that leaves one out.
pub fn fill_live_defaults(
    desired: &mut ResourceGraph,
    live: &ResourceGraph,
    services: &BTreeMap<String, ServiceProfile>,
) {
    for (service, profile) in services {
        if ResourceKind::Indexer.supported_by(profile.service_type) {
            default_indexer_profiles(service, desired, live);
        }
        if ResourceKind::QualityProfile.supported_by(profile.service_type) {
            complete_format_items(service, profile, desired, live);
        }
    }
}

/// App profile for indexers that do not name one.
///
/// With app profiles declared, the declared profile with the lowest live id,
/// or the first declared one when none exists yet. Otherwise the live
/// profile with the lowest id.
pub fn default_app_profile(
    service: &str,
    desired: &ResourceGraph,
    live: &ResourceGraph,
) -> Option<ResourceId> {
    let declared: Vec<&ResourceId> = desired
        .of_kind(service, ResourceKind::AppProfile)
        .map(|r| &r.id)
        .collect();

    live.of_kind(service, ResourceKind::AppProfile)
        .filter(|r| declared.is_empty() || declared.contains(&&r.id))
        .filter_map(|r| r.remote_id().map(|remote| (remote, &r.id)))
        .min_by_key(|(remote, _)| *remote)
        .map(|(_, id)| id.clone())
        .or_else(|| declared.first().map(|id| (*id).clone()))
}

fn default_indexer_profiles(service: &str, desired: &mut ResourceGraph, live: &ResourceGraph) {
    let unassigned: Vec<ResourceId> = desired
        .of_kind(service, ResourceKind::Indexer)
        .filter(|r| {
            r.fields
                .get(APP_PROFILE_FIELD)
                .is_none_or(|v| matches!(v, FieldValue::Null))
        })
        .map(|r| r.id.clone())
        .collect();
    if unassigned.is_empty() {
        return;
    }
    let Some(app_profile) = default_app_profile(service, desired, live) else {
        return;
    };

    for id in unassigned {
        if let Some(indexer) = desired.get_mut(&id) {
            debug!(indexer = %id, app_profile = %app_profile, "defaulting app profile");
            indexer
                .fields
                .insert(APP_PROFILE_FIELD.to_string(), FieldValue::Ref(app_profile.clone()));
        }
    }
}

fn complete_format_items(
    service: &str,
    profile: &ServiceProfile,
    desired: &mut ResourceGraph,
    live: &ResourceGraph,
) {
    // Live formats about to be pruned must not be listed
    let kept_live = !profile.prunes(ResourceKind::CustomFormat);
    let formats: BTreeSet<ResourceId> = desired
        .of_kind(service, ResourceKind::CustomFormat)
        .chain(
            live.of_kind(service, ResourceKind::CustomFormat)
                .filter(|_| kept_live),
        )
        .map(|r| r.id.clone())
        .collect();
    let creating: Vec<ResourceId> = desired
        .of_kind(service, ResourceKind::QualityProfile)
        .filter(|r| !live.contains(&r.id))
        .map(|r| r.id.clone())
        .collect();

    for id in creating {
        let Some(quality_profile) = desired.get_mut(&id) else {
            continue;
        };
        let FieldValue::List(items) = quality_profile
            .fields
            .entry(FORMAT_ITEMS_FIELD.to_string())
            .or_insert_with(|| FieldValue::List(Vec::new()))
        else {
            continue;
        };
        let listed: BTreeSet<ResourceId> = items
            .iter()
            .filter_map(|item| match item.as_map()?.get("format")? {
                FieldValue::Ref(format) => Some(format.clone()),
                _ => None,
            })
            .collect();
        for format in formats.difference(&listed) {
            items.push(FieldValue::map([
                ("format", FieldValue::Ref(format.clone())),
                ("score", FieldValue::from(0i64)),
            ]));
        }
    }
}
