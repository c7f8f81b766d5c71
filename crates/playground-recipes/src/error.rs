//! Error types for recipes

use thiserror::Error;

/// Recipe errors
#[derive(Debug, Error)]
pub enum Error {
    /// No built-in recipe with this name
    #[error("Unknown recipe '{0}'")]
    UnknownRecipe(String),

    /// A YAML service patch names an unregistered component kind
    #[error("Unknown component kind '{0}'")]
    UnknownComponent(String),

    /// A flag was not declared or its value does not parse
    #[error("Invalid flag: {0}")]
    Flag(String),

    /// A YAML override is inconsistent
    #[error("Invalid recipe override: {0}")]
    Override(String),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Manifest assembly or validation failed
    #[error(transparent)]
    Manifest(#[from] playground_manifest::Error),

    /// Artifact generation failed
    #[error(transparent)]
    Artifacts(#[from] playground_artifacts::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recipe operations
pub type Result<T> = std::result::Result<T, Error>;
