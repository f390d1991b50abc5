//! The seam between the sync engine and one managed service

use async_trait::async_trait;

use arrsync_model::{Resource, ResourceKind, ServiceType};

use crate::error::AdapterResult;

/// Result of a successful mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Applied {
    /// Numeric id the service assigned or kept
    pub remote_id: Option<i64>,
}

/// Everything the engine needs from one service.
///
/// Implementations hold their own credentials and never see other services.
/// Resources passed to mutating calls have their references already bound
/// to whatever the service expects (numeric ids or names); update and delete
/// calls receive a resource carrying the live [`arrsync_model::RemoteHandle`].
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Service name as declared in the document
    fn service(&self) -> &str;

    fn service_type(&self) -> ServiceType;

    /// Cheap reachability check
    async fn ping(&self) -> AdapterResult<()>;

    /// Every live resource of one kind, normalized
    async fn fetch_all(&self, kind: ResourceKind) -> AdapterResult<Vec<Resource>>;

    async fn create(&self, resource: &Resource) -> AdapterResult<Applied>;

    /// Apply the listed top-level fields of `resource`
    async fn update(&self, resource: &Resource, changed: &[String]) -> AdapterResult<Applied>;

    async fn delete(&self, resource: &Resource) -> AdapterResult<()>;
}
