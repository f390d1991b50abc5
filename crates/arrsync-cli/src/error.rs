//! Error types for arrsync-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit code for runs that never produced a report
pub const EXIT_INVALID: i32 = 2;

/// Errors that stop the CLI before a report exists
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from arrsync-core
    #[error(transparent)]
    Core(#[from] arrsync_core::Error),

    /// The document itself is defective
    #[error(transparent)]
    Document(#[from] arrsync_core::DocumentError),

    /// An adapter could not be constructed
    #[error(transparent)]
    Adapter(#[from] arrsync_client::AdapterError),

    /// No usable API key for a service
    #[error("credentials for service '{service}': {message}")]
    Credentials { service: String, message: String },

    /// Report serialization failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn credentials(service: &str, message: impl Into<String>) -> Self {
        Self::Credentials {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_INVALID
    }
}
