//! Error types for the manifest crate

use thiserror::Error;

/// Manifest errors
#[derive(Debug, Error)]
pub enum Error {
    /// The service graph violates a structural rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// A template directive could not be parsed or resolved
    #[error("Template error: {0}")]
    Template(String),

    /// A referenced service does not exist
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// A release descriptor cannot serve the requested platform
    #[error("Release error: {0}")]
    Release(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, Error>;
