//! Execution context shared by recipes and the runner.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log verbosity requested for the launched services
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace
    Trace,
    /// Debug
    Debug,
    /// Info
    #[default]
    Info,
    /// Warn
    Warn,
    /// Error
    Error,
}

impl LogLevel {
    /// Verbosity as a count of `-v` flags, as used by reth
    pub fn verbosity(&self) -> usize {
        match self {
            LogLevel::Trace => 5,
            LogLevel::Debug => 4,
            LogLevel::Info => 3,
            LogLevel::Warn => 2,
            LogLevel::Error => 1,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Service whose enode identity other services dial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootnodeRef {
    /// Service exposing an `rlpx` port
    pub service: String,
    /// Hex node id (uncompressed public key without the `04` prefix)
    pub id: String,
}

/// Transaction injection settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContenderConfig {
    /// Add the contender service to the recipe
    #[serde(default)]
    pub enabled: bool,
    /// Extra arguments passed to contender
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Execution context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExContext {
    /// Service log level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Session output directory
    #[serde(default)]
    pub output: PathBuf,
    /// Bootnode designation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootnode: Option<BootnodeRef>,
    /// Contender settings
    #[serde(default)]
    pub contender: ContenderConfig,
}
