//! Error types for artifact generation

use thiserror::Error;

/// Artifact generation errors
#[derive(Debug, Error)]
pub enum Error {
    /// A genesis document is malformed or inconsistent
    #[error("Genesis error: {0}")]
    Genesis(String),

    /// A user predeploy collides with a template account
    #[error("Predeploy {0} conflicts with an account in the L2 genesis template")]
    PredeployConflict(String),

    /// Key generation, signing or encryption failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A prefunded account key is not a valid secp256k1 key
    #[error("Invalid private key '{0}'")]
    InvalidKey(String),

    /// Writing into the session directory failed
    #[error("Output error: {0}")]
    Output(#[from] playground_manifest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for artifact generation
pub type Result<T> = std::result::Result<T, Error>;
