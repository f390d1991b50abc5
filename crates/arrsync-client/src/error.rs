//! Error types for arrsync-client

use arrsync_model::{ResourceId, ResourceKind};

/// Result type for adapter operations
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Errors raised by a service adapter
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// The request never produced a response (DNS, refused, TLS, timeout)
    #[error("network error calling {url}: {message}")]
    Network {
        url: String,
        message: String,
        /// The request may not have reached the service
        connect: bool,
    },

    /// The service rejected the credentials
    #[error("{method} {url} unauthorized ({status})")]
    Unauthorized {
        method: String,
        url: String,
        status: u16,
    },

    /// The service answered with a non-success status
    #[error("{method} {url} failed with {status}: {body}")]
    Rejected {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape
    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The kind does not support the requested operation
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        kind: ResourceKind,
        operation: &'static str,
    },

    /// Update or delete requested for a resource without a remote id
    #[error("{id} has no remote id")]
    MissingRemoteId { id: ResourceId },

    /// No `/schema` template matched a contract declaration
    #[error("no {kind} template named '{template}'")]
    MissingTemplate { kind: ResourceKind, template: String },

    /// The client could not be constructed
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl AdapterError {
    /// Whether retrying the same call may succeed.
    ///
    /// Only failures where the request is known not to have been applied,
    /// or the service signalled a transient condition, qualify. A timed-out
    /// POST might have been applied remotely.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Network { connect, .. } => *connect,
            AdapterError::Rejected { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return AdapterError::Setup(err.to_string());
        }
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_decode() {
            return AdapterError::Decode {
                url,
                message: err.to_string(),
            };
        }
        AdapterError::Network {
            url,
            message: err.to_string(),
            connect: err.is_connect(),
        }
    }
}
