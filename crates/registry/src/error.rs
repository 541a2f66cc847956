//! Error types for the module registry.

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid module slug: '{slug}'")]
    InvalidSlug { slug: String },

    #[error("Module not found: {slug}")]
    ModuleNotFound { slug: String },

    #[error("Invalid module record: {message}")]
    InvalidRecord {
        message: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Registry data is corrupted: {message}")]
    Corrupted {
        message: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Registry operation failed: {operation}")]
    OperationFailed {
        operation: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Registry backend error")]
    BackendError {
        #[source]
        source: Option<eyre::Report>,
    },
}

impl RegistryError {
    pub(crate) fn operation(operation: impl Into<String>, source: impl Into<eyre::Report>) -> Self {
        RegistryError::OperationFailed {
            operation: operation.into(),
            source: Some(source.into()),
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
