//! Immutable connection settings for one managed service

use std::fmt;
use std::time::Duration;

use arrsync_model::ServiceType;

/// Where and how to reach one service
///
/// Built once by the caller (the CLI resolves credentials from the
/// environment or files) and handed to the adapter; nothing in the sync
/// engine reads ambient process state.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Service name as declared in the document
    pub name: String,
    pub service_type: ServiceType,
    /// Base URL without the API prefix, e.g. `http://sonarr:8989`
    pub base_url: String,
    pub api_key: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Total attempts for a read, including the first
    pub read_attempts: usize,
    /// Delay before the first read retry; doubles on each further retry
    pub read_backoff: Duration,
}

impl ServiceEndpoint {
    pub fn new(
        name: impl Into<String>,
        service_type: ServiceType,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_type,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(30),
            read_attempts: 3,
            read_backoff: Duration::from_millis(200),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_retry(mut self, attempts: usize, backoff: Duration) -> Self {
        self.read_attempts = attempts.max(1);
        self.read_backoff = backoff;
        self
    }

    /// Absolute URL of a path below the API prefix
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.service_type.api_prefix(), path)
    }

    /// Absolute URL of the unauthenticated health endpoint
    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.base_url)
    }
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("name", &self.name)
            .field("service_type", &self.service_type)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("read_attempts", &self.read_attempts)
            .finish()
    }
}
