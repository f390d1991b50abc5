//! Conversion between wire objects and normalized resources
//!
//! The services expose provider settings (download clients, indexers,
//! notifications, and custom format specifications) as a list of
//! `{"name": .., "value": ..}` pairs under `fields`. Normalized resources
//! carry the same data as a map so that declarations can name only the
//! settings they care about. [`decode`] converts lists into maps, [`encode`]
//! converts them back.

use serde_json::{Map, Value};

use arrsync_model::{
    FieldValue, ListMode, RemoteHandle, Resource, ResourceId, ResourceKind,
};

use crate::error::{AdapterError, AdapterResult};

const FIELDS: &str = "fields";

/// Build a live resource from one wire object.
///
/// # Errors
///
/// Returns [`AdapterError::Decode`] when the object is not a JSON object or
/// lacks its natural key.
pub fn decode(service: &str, kind: ResourceKind, raw: Value, url: &str) -> AdapterResult<Resource> {
    let key_field = kind.key_field();
    let key = raw
        .get(key_field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Decode {
            url: url.to_string(),
            message: format!("{} object without '{}'", kind, key_field),
        })?;
    live_resource(service, kind, key, raw, url)
}

/// Build a live resource from a singleton object fetched at `section`.
///
/// # Errors
///
/// Returns [`AdapterError::Decode`] when the object is not a JSON object.
pub fn decode_section(
    service: &str,
    kind: ResourceKind,
    section: &str,
    raw: Value,
    url: &str,
) -> AdapterResult<Resource> {
    live_resource(service, kind, section.to_string(), raw, url)
}

fn live_resource(
    service: &str,
    kind: ResourceKind,
    key: String,
    raw: Value,
    url: &str,
) -> AdapterResult<Resource> {
    let Value::Object(normalized) = fields_to_map(raw.clone()) else {
        return Err(AdapterError::Decode {
            url: url.to_string(),
            message: format!("expected {} object, got {}", kind, raw),
        });
    };
    let key_field = kind.key_field();
    let remote_id = raw.get("id").and_then(Value::as_i64);
    let fields = normalized
        .into_iter()
        .filter(|(name, _)| name != "id" && name != key_field)
        .map(|(name, value)| (name, FieldValue::from_json(value)))
        .collect();

    Ok(Resource::live(
        ResourceId::new(service, kind, key),
        fields,
        RemoteHandle { id: remote_id, raw },
    ))
}

/// Wire form of a bound resource for a create call.
///
/// When `template` is given its settings form the base and the declaration
/// is merged over it.
pub fn encode(resource: &Resource, template: Option<&Value>) -> Value {
    let payload = resource.to_payload();
    let merged = match template {
        Some(template) => {
            let mut base = fields_to_map(template.clone());
            if let Value::Object(map) = &mut base {
                map.remove("id");
                map.remove("presets");
            }
            merge_value(resource.kind(), "", &mut base, payload);
            base
        }
        None => payload,
    };
    fields_to_list(merged)
}

/// Wire form of an update: the last fetched object with the changed
/// top-level fields of `resource` merged in.
///
/// Nested maps are merged key by key, keyed lists element by element;
/// everything else is replaced.
pub fn merge_update(raw: &Value, resource: &Resource, changed: &[String]) -> Value {
    let mut base = fields_to_map(raw.clone());
    let payload = resource.to_payload();

    if let (Value::Object(base_map), Value::Object(payload_map)) = (&mut base, payload) {
        for field in changed {
            let Some(desired) = payload_map.get(field) else {
                continue;
            };
            match base_map.get_mut(field) {
                Some(existing) => merge_value(resource.kind(), field, existing, desired.clone()),
                None => {
                    base_map.insert(field.clone(), desired.clone());
                }
            }
        }
        let key_field = resource.kind().key_field();
        if let Some(key) = payload_map.get(key_field) {
            base_map.insert(key_field.to_string(), key.clone());
        }
    }

    fields_to_list(base)
}

/// Pick the schema template a contract declaration is based on.
///
/// # Errors
///
/// Returns [`AdapterError::MissingTemplate`] when the declaration names a
/// template the service does not offer.
pub fn find_template<'a>(
    kind: ResourceKind,
    templates: &'a [Value],
    resource: &Resource,
) -> AdapterResult<Option<&'a Value>> {
    let Some(field) = kind.template_field() else {
        return Ok(None);
    };
    let Some(wanted) = resource.fields.get(field).and_then(FieldValue::as_str) else {
        return Ok(None);
    };

    templates
        .iter()
        .find(|t| {
            t.get(field)
                .and_then(Value::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
        })
        .map(Some)
        .ok_or_else(|| AdapterError::MissingTemplate {
            kind,
            template: wanted.to_string(),
        })
}

fn merge_value(kind: ResourceKind, path: &str, existing: &mut Value, desired: Value) {
    match (existing, desired) {
        (Value::Object(live), Value::Object(wanted)) => {
            for (name, value) in wanted {
                let child = join(path, &name);
                match live.get_mut(&name) {
                    Some(slot) => merge_value(kind, &child, slot, value),
                    None => {
                        live.insert(name, value);
                    }
                }
            }
        }
        (Value::Array(live), Value::Array(wanted)) => match kind.list_mode(path) {
            ListMode::Keyed(key) => {
                for item in wanted {
                    let position = item.get(key).and_then(|k| {
                        live.iter().position(|l| l.get(key) == Some(k))
                    });
                    match position {
                        Some(i) => merge_value(kind, &format!("{}[]", path), &mut live[i], item),
                        None => live.push(item),
                    }
                }
            }
            ListMode::Exact | ListMode::Set => *live = wanted,
        },
        (slot, value) => *slot = value,
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

/// Recursively turn `fields: [{name, value}]` lists into maps.
fn fields_to_map(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, inner)| {
                    let inner = if name == FIELDS && is_name_value_list(&inner) {
                        pairs_to_map(inner)
                    } else {
                        inner
                    };
                    (name, fields_to_map(inner))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(fields_to_map).collect()),
        other => other,
    }
}

/// Recursively turn `fields` maps back into `[{name, value}]` lists.
fn fields_to_list(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, inner)| {
                    let inner = fields_to_list(inner);
                    let inner = match inner {
                        Value::Object(settings) if name == FIELDS => map_to_pairs(settings),
                        other => other,
                    };
                    (name, inner)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(fields_to_list).collect()),
        other => other,
    }
}

fn is_name_value_list(value: &Value) -> bool {
    value.as_array().is_some_and(|items| {
        items
            .iter()
            .all(|item| item.get("name").is_some_and(Value::is_string))
    })
}

fn pairs_to_map(value: Value) -> Value {
    let Value::Array(items) = value else {
        return value;
    };
    let mut out = Map::new();
    for item in items {
        if let Value::Object(mut pair) = item
            && let Some(Value::String(name)) = pair.remove("name")
        {
            out.insert(name, pair.remove("value").unwrap_or(Value::Null));
        }
    }
    Value::Object(out)
}

fn map_to_pairs(settings: Map<String, Value>) -> Value {
    Value::Array(
        settings
            .into_iter()
            .map(|(name, value)| {
                let mut pair = Map::new();
                pair.insert("name".to_string(), Value::String(name));
                if !value.is_null() {
                    pair.insert("value".to_string(), value);
                }
                Value::Object(pair)
            })
            .collect(),
    )
}
