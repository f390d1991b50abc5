//! Error types for arrsync-model

use crate::resource::ResourceId;

/// Result type for arrsync-model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or manipulating resource graphs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Two resources share a natural key within one (service, kind)
    #[error("duplicate key {id}")]
    DuplicateKey { id: ResourceId },

    /// A reference could not be bound to a remote value
    #[error("{from} references {to}, which has no remote identity")]
    UnboundReference { from: ResourceId, to: ResourceId },

    /// A `$ref` string did not follow `[service:]kind/key`
    #[error("invalid reference '{value}': {reason}")]
    InvalidReference { value: String, reason: String },

    /// Unknown resource kind name
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// Unknown service type name
    #[error("unknown service type: {0}")]
    UnknownServiceType(String),
}
