//! Error types for arrsync-core

use std::path::PathBuf;

use arrsync_model::{ResourceId, ResourceKind, ServiceType};

/// Result type for arrsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Static defects of the configuration document
///
/// Any of these aborts the run before a single network call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// The document file could not be read
    #[error("cannot read {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// The document is not valid in its format
    #[error("invalid {format} in {path}: {message}")]
    Parse {
        path: PathBuf,
        format: String,
        message: String,
    },

    /// The file extension does not name a known format
    #[error("unsupported document format: '{extension}'")]
    UnsupportedFormat { extension: String },

    /// Two declarations share a natural key within one kind and service
    #[error("duplicate key: {id}")]
    DuplicateKey { id: ResourceId },

    /// A service declares a kind its type does not have
    #[error("service '{service}' ({service_type}) does not support {kind}")]
    UnsupportedKind {
        service: String,
        service_type: ServiceType,
        kind: ResourceKind,
    },

    /// A declaration is malformed
    #[error("invalid declaration at {location}: {reason}")]
    InvalidDeclaration { location: String, reason: String },

    /// A reference names a service the document does not declare
    #[error("{from} references undeclared service '{service}'")]
    UnknownService { from: ResourceId, service: String },

    /// A reference names a resource absent from the desired state
    #[error("unresolved reference from {from} to {to}")]
    UnresolvedReference { from: ResourceId, to: ResourceId },

    /// Resources depend on each other in a loop
    #[error("dependency cycle between {}", join_ids(.participants))]
    DependencyCycle { participants: Vec<ResourceId> },
}

/// Errors that can occur in arrsync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The engine was not given an adapter for a declared service
    #[error("no adapter configured for service '{0}'")]
    MissingAdapter(String),
}

impl Error {
    /// Whether the error is a defect of the document itself
    pub fn is_document_error(&self) -> bool {
        matches!(self, Error::Document(_))
    }
}

impl From<arrsync_model::Error> for DocumentError {
    fn from(err: arrsync_model::Error) -> Self {
        use arrsync_model::Error as ModelError;
        match err {
            ModelError::DuplicateKey { id } => DocumentError::DuplicateKey { id },
            ModelError::UnboundReference { from, to } => {
                DocumentError::UnresolvedReference { from, to }
            }
            ModelError::InvalidReference { value, reason } => DocumentError::InvalidDeclaration {
                location: format!("reference '{}'", value),
                reason,
            },
            ModelError::UnknownKind(kind) => DocumentError::InvalidDeclaration {
                location: format!("kind '{}'", kind),
                reason: "unknown resource kind".to_string(),
            },
            ModelError::UnknownServiceType(ty) => DocumentError::InvalidDeclaration {
                location: format!("service type '{}'", ty),
                reason: "unknown service type".to_string(),
            },
        }
    }
}

impl From<arrsync_model::Error> for Error {
    fn from(err: arrsync_model::Error) -> Self {
        Error::Document(err.into())
    }
}

fn join_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
