//! [`FakeService`]: an in-memory managed service.
//!
//! Stores raw JSON objects the way a real service would and goes through the
//! same wire codec as the REST adapter, so contract kinds, `fields` arrays and
//! partial updates behave like the real thing. Like the real services it
//! rejects numeric references to objects that do not exist, duplicate
//! names, and deletes of objects still referenced by others.
//!
//! Config sections are stored with their section name under `section`, the
//! kind's key field; the real services leave it implicit in the URL, so it
//! is stripped before decoding.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use arrsync_client::codec;
use arrsync_client::{AdapterError, AdapterResult, Applied, ServiceAdapter};
use arrsync_model::{FieldValue, Resource, ResourceKind, ServiceType};

use crate::journal::{Action, Journal};

#[derive(Debug, Clone)]
struct Fault {
    action: Action,
    kind: Option<ResourceKind>,
    key: Option<String>,
    /// `None` fails forever
    remaining: Option<usize>,
    error: AdapterError,
}

impl Fault {
    fn matches(&self, action: Action, kind: Option<ResourceKind>, key: Option<&str>) -> bool {
        self.action == action
            && self.remaining != Some(0)
            && (self.kind.is_none() || self.kind == kind)
            && match (&self.key, key) {
                (None, _) => true,
                (Some(wanted), Some(key)) => wanted.eq_ignore_ascii_case(key),
                (Some(_), None) => false,
            }
    }
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceKind, Vec<Value>>,
    templates: BTreeMap<ResourceKind, Vec<Value>>,
    faults: Vec<Fault>,
    next_id: i64,
}

/// In-memory [`ServiceAdapter`] with fault injection and call recording
#[derive(Debug)]
pub struct FakeService {
    name: String,
    service_type: ServiceType,
    journal: Journal,
    latency: Duration,
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeService {
    pub fn new(name: &str, service_type: ServiceType, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            service_type,
            journal: journal.clone(),
            latency: Duration::ZERO,
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add an existing object, builder style.
    pub fn with(self, kind: ResourceKind, raw: Value) -> Self {
        self.seed(kind, raw);
        self
    }

    /// Offer a `/schema` template for a contract kind.
    pub fn with_template(self, kind: ResourceKind, template: Value) -> Self {
        self.lock().templates.entry(kind).or_default().push(template);
        self
    }

    /// Add an existing object and return its id. An `id` already present in
    /// `raw` is kept.
    pub fn seed(&self, kind: ResourceKind, mut raw: Value) -> i64 {
        let mut state = self.lock();
        let id = match raw.get("id").and_then(Value::as_i64) {
            Some(id) => {
                state.next_id = state.next_id.max(id + 1);
                id
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                if let Value::Object(map) = &mut raw {
                    map.insert("id".to_string(), Value::from(id));
                }
                id
            }
        };
        state.objects.entry(kind).or_default().push(raw);
        id
    }

    /// Make `ping` fail with a connection error.
    pub fn fail_ping(&self) {
        let error = AdapterError::Network {
            url: self.url("/ping"),
            message: "connection refused".to_string(),
            connect: true,
        };
        self.inject(Action::Ping, None, None, None, error);
    }

    /// Make fetching `kind` fail with a server error.
    pub fn fail_fetch(&self, kind: ResourceKind) {
        let error = self.rejected("GET", kind, 500, "internal error");
        self.inject(Action::Fetch, Some(kind), None, None, error);
    }

    /// Reject every `action` on `kind/key` with HTTP 400.
    pub fn fail(&self, action: Action, kind: ResourceKind, key: &str) {
        let error = self.rejected(method(action), kind, 400, "validation failed");
        self.inject(action, Some(kind), Some(key), None, error);
    }

    /// Answer the next `times` matching calls with HTTP 503, then recover.
    pub fn fail_transiently(&self, action: Action, kind: ResourceKind, key: &str, times: usize) {
        let error = self.rejected(method(action), kind, 503, "service unavailable");
        self.inject(action, Some(kind), Some(key), Some(times), error);
    }

    /// Snapshot of the stored objects of one kind.
    pub fn objects(&self, kind: ResourceKind) -> Vec<Value> {
        self.lock().objects.get(&kind).cloned().unwrap_or_default()
    }

    /// Stored object with the given natural key.
    pub fn find(&self, kind: ResourceKind, key: &str) -> Option<Value> {
        let wanted = kind.normalize_key(key);
        self.objects(kind).into_iter().find(|raw| {
            raw.get(kind.key_field())
                .and_then(Value::as_str)
                .is_some_and(|k| kind.normalize_key(k) == wanted)
        })
    }

    /// Highest number of calls that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn url(&self, path: &str) -> String {
        format!("fake://{}{}", self.name, path)
    }

    fn rejected(&self, method: &str, kind: ResourceKind, status: u16, body: &str) -> AdapterError {
        AdapterError::Rejected {
            method: method.to_string(),
            url: self.url(kind.api_path()),
            status,
            body: body.to_string(),
        }
    }

    fn inject(
        &self,
        action: Action,
        kind: Option<ResourceKind>,
        key: Option<&str>,
        remaining: Option<usize>,
        error: AdapterError,
    ) {
        self.lock().faults.push(Fault {
            action,
            kind,
            key: key.map(str::to_string),
            remaining,
            error,
        });
    }

    /// Record the call, simulate latency, then apply any injected fault.
    async fn enter(
        &self,
        action: Action,
        kind: Option<ResourceKind>,
        key: Option<&str>,
    ) -> AdapterResult<InFlight<'_>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        self.journal.record(&self.name, action, kind, key);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        if let Some(fault) = state
            .faults
            .iter_mut()
            .find(|f| f.matches(action, kind, key))
        {
            if let Some(remaining) = &mut fault.remaining {
                *remaining -= 1;
            }
            return Err(fault.error.clone());
        }
        Ok(guard)
    }

    fn ensure_supported(&self, kind: ResourceKind, operation: &'static str) -> AdapterResult<()> {
        if kind.supported_by(self.service_type) {
            Ok(())
        } else {
            Err(AdapterError::Unsupported { kind, operation })
        }
    }

    /// Numeric ids at reference slots must name stored objects.
    fn check_references(&self, state: &State, resource: &Resource) -> AdapterResult<()> {
        let mut missing = None;
        let mut scratch = resource.clone();
        scratch.rewrite_reference_slots(|target, slot| {
            for id in numeric_ids(slot) {
                let exists = state
                    .objects
                    .get(&target)
                    .is_some_and(|objects| objects.iter().any(|o| object_id(o) == Some(id)));
                if !exists && missing.is_none() {
                    missing = Some((target, id));
                }
            }
        });
        match missing {
            Some((target, id)) => Err(self.rejected(
                "POST",
                resource.kind(),
                400,
                &format!("{target} with id {id} does not exist"),
            )),
            None => Ok(()),
        }
    }

    /// Natural key of a stored object that references `kind` id `id`.
    fn referenced_by(&self, state: &State, kind: ResourceKind, id: i64) -> Option<String> {
        for (other_kind, objects) in &state.objects {
            for raw in objects {
                let Ok(mut resource) = codec::decode(&self.name, *other_kind, raw.clone(), "") else {
                    continue;
                };
                let mut found = false;
                resource.rewrite_reference_slots(|target, slot| {
                    found |= target == kind && numeric_ids(slot).contains(&id);
                });
                if found {
                    return Some(resource.id.to_string());
                }
            }
        }
        None
    }
}

fn method(action: Action) -> &'static str {
    match action {
        Action::Ping | Action::Fetch => "GET",
        Action::Create => "POST",
        Action::Update => "PUT",
        Action::Delete => "DELETE",
    }
}

fn decode_stored(service: &str, kind: ResourceKind, mut raw: Value, url: &str) -> AdapterResult<Resource> {
    if !kind.is_singleton() {
        return codec::decode(service, kind, raw, url);
    }
    let section = raw
        .as_object_mut()
        .and_then(|map| map.remove(kind.key_field()))
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    codec::decode_section(service, kind, &section, raw, url)
}

fn object_id(raw: &Value) -> Option<i64> {
    raw.get("id").and_then(Value::as_i64)
}

fn numeric_ids(slot: &FieldValue) -> Vec<i64> {
    match slot {
        FieldValue::List(items) => items.iter().filter_map(FieldValue::as_i64).collect(),
        other => other.as_i64().into_iter().collect(),
    }
}

#[async_trait]
impl ServiceAdapter for FakeService {
    fn service(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        self.service_type
    }

    async fn ping(&self) -> AdapterResult<()> {
        self.enter(Action::Ping, None, None).await?;
        Ok(())
    }

    async fn fetch_all(&self, kind: ResourceKind) -> AdapterResult<Vec<Resource>> {
        let _flight = self.enter(Action::Fetch, Some(kind), None).await?;
        self.ensure_supported(kind, "fetch")?;
        let url = self.url(kind.api_path());
        self.objects(kind)
            .into_iter()
            .map(|raw| decode_stored(&self.name, kind, raw, &url))
            .collect()
    }

    async fn create(&self, resource: &Resource) -> AdapterResult<Applied> {
        let kind = resource.kind();
        let _flight = self
            .enter(Action::Create, Some(kind), Some(resource.key()))
            .await?;
        self.ensure_supported(kind, "create")?;
        if !kind.can_create() {
            return Err(AdapterError::Unsupported {
                kind,
                operation: "create",
            });
        }
        if self.find(kind, resource.key()).is_some() {
            return Err(self.rejected("POST", kind, 400, "name must be unique"));
        }

        let mut state = self.lock();
        self.check_references(&state, resource)?;
        let templates = state.templates.get(&kind).cloned().unwrap_or_default();
        let template = codec::find_template(kind, &templates, resource)?;
        let mut body = codec::encode(resource, template);

        let id = state.next_id;
        state.next_id += 1;
        if let Value::Object(map) = &mut body {
            map.insert("id".to_string(), Value::from(id));
        }
        state.objects.entry(kind).or_default().push(body);
        Ok(Applied { remote_id: Some(id) })
    }

    async fn update(&self, resource: &Resource, changed: &[String]) -> AdapterResult<Applied> {
        let kind = resource.kind();
        let _flight = self
            .enter(Action::Update, Some(kind), Some(resource.key()))
            .await?;
        self.ensure_supported(kind, "update")?;
        let id = resource
            .remote_id()
            .ok_or_else(|| AdapterError::MissingRemoteId {
                id: resource.id.clone(),
            })?;

        let mut state = self.lock();
        self.check_references(&state, resource)?;
        // Every config section has the same id; the section name tells them apart
        let section = kind.is_singleton().then(|| resource.key());
        let Some(stored) = state.objects.get_mut(&kind).and_then(|objects| {
            objects.iter_mut().find(|o| match section {
                Some(section) => o.get(kind.key_field()).and_then(Value::as_str) == Some(section),
                None => object_id(o) == Some(id),
            })
        }) else {
            return Err(self.rejected("PUT", kind, 404, "not found"));
        };
        let mut body = codec::merge_update(stored, resource, changed);
        if let Value::Object(map) = &mut body {
            map.insert("id".to_string(), Value::from(id));
        }
        *stored = body;
        Ok(Applied { remote_id: Some(id) })
    }

    async fn delete(&self, resource: &Resource) -> AdapterResult<()> {
        let kind = resource.kind();
        let _flight = self
            .enter(Action::Delete, Some(kind), Some(resource.key()))
            .await?;
        self.ensure_supported(kind, "delete")?;
        if !kind.can_delete() {
            return Err(AdapterError::Unsupported {
                kind,
                operation: "delete",
            });
        }
        let id = resource
            .remote_id()
            .ok_or_else(|| AdapterError::MissingRemoteId {
                id: resource.id.clone(),
            })?;

        let mut state = self.lock();
        if let Some(user) = self.referenced_by(&state, kind, id) {
            return Err(self.rejected("DELETE", kind, 400, &format!("still in use by {user}")));
        }
        let objects = state.objects.entry(kind).or_default();
        let before = objects.len();
        objects.retain(|o| object_id(o) != Some(id));
        if objects.len() == before {
            return Err(self.rejected("DELETE", kind, 404, "not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrsync_model::ResourceId;
    use serde_json::json;

    fn tag(service: &str, key: &str) -> Resource {
        Resource::desired(ResourceId::new(service, ResourceKind::Tag, key), BTreeMap::new())
    }

    #[tokio::test]
    async fn test_create_assigns_ids_and_rejects_duplicates() {
        let journal = Journal::new();
        let fake = FakeService::new("tv", ServiceType::Sonarr, &journal).with(
            ResourceKind::Tag,
            json!({"id": 7, "label": "anime"}),
        );

        let applied = fake.create(&tag("tv", "uhd")).await.unwrap();
        assert_eq!(applied.remote_id, Some(8));
        assert!(fake.create(&tag("tv", "ANIME")).await.is_err());
        assert_eq!(journal.count(Action::Create), 2);
    }

    #[tokio::test]
    async fn test_transient_fault_recovers() {
        let journal = Journal::new();
        let fake = FakeService::new("tv", ServiceType::Sonarr, &journal);
        fake.fail_transiently(Action::Create, ResourceKind::Tag, "uhd", 1);

        let err = fake.create(&tag("tv", "uhd")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(fake.create(&tag("tv", "uhd")).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_refuses_referenced_objects() {
        let journal = Journal::new();
        let fake = FakeService::new("tv", ServiceType::Sonarr, &journal)
            .with(ResourceKind::Tag, json!({"id": 1, "label": "anime"}))
            .with(
                ResourceKind::ReleaseProfile,
                json!({"id": 2, "name": "Subs", "tags": [1]}),
            );

        let mut live = fake.fetch_all(ResourceKind::Tag).await.unwrap();
        let anime = live.remove(0);
        let err = fake.delete(&anime).await.unwrap_err();
        assert!(err.to_string().contains("still in use"));
        assert_eq!(fake.objects(ResourceKind::Tag).len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_reference_ids() {
        let journal = Journal::new();
        let fake = FakeService::new("tv", ServiceType::Sonarr, &journal);
        let profile = Resource::desired(
            ResourceId::new("tv", ResourceKind::ReleaseProfile, "Subs"),
            BTreeMap::new(),
        )
        .with_field("tags", FieldValue::List(vec![FieldValue::from(99i64)]));

        let err = fake.create(&profile).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
