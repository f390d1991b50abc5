//! REST adapter shared by every supported service type

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use arrsync_model::{Resource, ResourceKind, ServiceType};

use crate::adapter::{Applied, ServiceAdapter};
use crate::codec;
use crate::endpoint::ServiceEndpoint;
use crate::error::{AdapterError, AdapterResult};
use crate::http::HttpClient;

/// Adapter speaking the common REST dialect of the *arr services.
///
/// The dialects differ only in API prefix and in which kinds exist, both of
/// which come from the model. Contract templates are fetched from
/// `{path}/schema` once per kind and cached for the adapter's lifetime.
pub struct ArrAdapter {
    endpoint: ServiceEndpoint,
    http: HttpClient,
    templates: Mutex<HashMap<ResourceKind, Vec<Value>>>,
}

impl ArrAdapter {
    pub fn new(endpoint: ServiceEndpoint) -> AdapterResult<Self> {
        let http = HttpClient::new(&endpoint)?;
        Ok(Self {
            endpoint,
            http,
            templates: Mutex::new(HashMap::new()),
        })
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    fn ensure_supported(&self, kind: ResourceKind, operation: &'static str) -> AdapterResult<()> {
        if kind.supported_by(self.endpoint.service_type) {
            Ok(())
        } else {
            Err(AdapterError::Unsupported { kind, operation })
        }
    }

    /// Collection path of `resource`; a singleton's section has its own.
    fn collection_path(resource: &Resource) -> String {
        let kind = resource.kind();
        if kind.is_singleton() {
            format!("{}/{}", kind.api_path(), resource.key())
        } else {
            kind.api_path().to_string()
        }
    }

    fn item_url(&self, resource: &Resource) -> AdapterResult<String> {
        let id = resource
            .remote_id()
            .ok_or_else(|| AdapterError::MissingRemoteId {
                id: resource.id.clone(),
            })?;
        Ok(self
            .endpoint
            .api_url(&format!("{}/{}", Self::collection_path(resource), id)))
    }

    async fn fetch_sections(&self, kind: ResourceKind) -> AdapterResult<Vec<Resource>> {
        let mut resources = Vec::new();
        for section in kind.sections(self.endpoint.service_type) {
            let url = self.endpoint.api_url(&format!("{}/{}", kind.api_path(), section));
            let raw = self.http.get_json(&url).await?;
            resources.push(codec::decode_section(&self.endpoint.name, kind, section, raw, &url)?);
        }
        Ok(resources)
    }

    async fn template_for(&self, resource: &Resource) -> AdapterResult<Option<Value>> {
        let kind = resource.kind();
        if kind.template_field().is_none() {
            return Ok(None);
        }

        let mut cache = self.templates.lock().await;
        if !cache.contains_key(&kind) {
            let url = self.endpoint.api_url(&format!("{}/schema", kind.api_path()));
            let templates = match self.http.get_json(&url).await? {
                Value::Array(items) => items,
                other => {
                    return Err(AdapterError::Decode {
                        url,
                        message: format!("expected template list, got {}", other),
                    });
                }
            };
            debug!(service = %self.endpoint.name, %kind, count = templates.len(), "loaded templates");
            cache.insert(kind, templates);
        }

        let templates = cache.get(&kind).map(Vec::as_slice).unwrap_or_default();
        Ok(codec::find_template(kind, templates, resource)?.cloned())
    }
}

fn applied_from(response: &Value, fallback: Option<i64>) -> Applied {
    Applied {
        remote_id: response.get("id").and_then(Value::as_i64).or(fallback),
    }
}

#[async_trait]
impl ServiceAdapter for ArrAdapter {
    fn service(&self) -> &str {
        &self.endpoint.name
    }

    fn service_type(&self) -> ServiceType {
        self.endpoint.service_type
    }

    #[instrument(skip(self), fields(service = %self.endpoint.name))]
    async fn ping(&self) -> AdapterResult<()> {
        self.http.get_json(&self.endpoint.ping_url()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(service = %self.endpoint.name))]
    async fn fetch_all(&self, kind: ResourceKind) -> AdapterResult<Vec<Resource>> {
        self.ensure_supported(kind, "fetch")?;
        if kind.is_singleton() {
            return self.fetch_sections(kind).await;
        }

        let url = self.endpoint.api_url(kind.api_path());
        let items = match self.http.get_json(&url).await? {
            Value::Array(items) => items,
            other => {
                return Err(AdapterError::Decode {
                    url,
                    message: format!("expected a list, got {}", other),
                });
            }
        };

        let resources = items
            .into_iter()
            .map(|raw| codec::decode(&self.endpoint.name, kind, raw, &url))
            .collect::<AdapterResult<Vec<_>>>()?;
        debug!(count = resources.len(), "fetched live resources");
        Ok(resources)
    }

    #[instrument(skip_all, fields(service = %self.endpoint.name, resource = %resource.id))]
    async fn create(&self, resource: &Resource) -> AdapterResult<Applied> {
        let kind = resource.kind();
        self.ensure_supported(kind, "create")?;
        if !kind.can_create() {
            return Err(AdapterError::Unsupported {
                kind,
                operation: "create",
            });
        }

        let template = self.template_for(resource).await?;
        let body = codec::encode(resource, template.as_ref());
        let url = self.endpoint.api_url(kind.api_path());
        let response = self.http.send_json(Method::POST, &url, Some(&body)).await?;

        info!("created");
        Ok(applied_from(&response, None))
    }

    #[instrument(skip_all, fields(service = %self.endpoint.name, resource = %resource.id))]
    async fn update(&self, resource: &Resource, changed: &[String]) -> AdapterResult<Applied> {
        self.ensure_supported(resource.kind(), "update")?;
        let remote = resource
            .remote
            .as_ref()
            .ok_or_else(|| AdapterError::MissingRemoteId {
                id: resource.id.clone(),
            })?;

        let url = self.item_url(resource)?;
        let body = codec::merge_update(&remote.raw, resource, changed);
        let response = self.http.send_json(Method::PUT, &url, Some(&body)).await?;

        info!(fields = ?changed, "updated");
        Ok(applied_from(&response, remote.id))
    }

    #[instrument(skip_all, fields(service = %self.endpoint.name, resource = %resource.id))]
    async fn delete(&self, resource: &Resource) -> AdapterResult<()> {
        let kind = resource.kind();
        self.ensure_supported(kind, "delete")?;
        if !kind.can_delete() {
            return Err(AdapterError::Unsupported {
                kind,
                operation: "delete",
            });
        }

        let url = self.item_url(resource)?;
        self.http.send_json(Method::DELETE, &url, None).await?;

        info!("deleted");
        Ok(())
    }
}
