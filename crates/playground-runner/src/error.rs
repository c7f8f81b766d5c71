//! Error types for the runner

use std::path::Path;
use thiserror::Error;

/// Runner errors
#[derive(Debug, Error)]
pub enum Error {
    /// No free host port near a container port
    #[error("No free host port for container port {port} after {attempts} attempts")]
    PortExhausted {
        /// Container port that needed a host port
        port: u16,
        /// Candidates tried
        attempts: u32,
    },

    /// `docker compose` exited non-zero
    #[error("Compose failed: {0}")]
    Compose(String),

    /// An image is missing locally and could not be pulled
    #[error("Failed to pull image {image}: {message}")]
    Pull {
        /// Image reference
        image: String,
        /// Daemon output
        message: String,
    },

    /// The docker CLI failed or the daemon is unreachable
    #[error("Docker error: {0}")]
    Docker(String),

    /// A container died while the session was running
    #[error("{0}")]
    ServiceDied(String),

    /// A host process exited non-zero while the session was running
    #[error("{0}")]
    HostExit(String),

    /// A lifecycle hook failed
    #[error("{0}")]
    Lifecycle(String),

    /// A watchdog reported a failure
    #[error("Watchdog of {service} failed: {message}")]
    Watchdog {
        /// Watched service
        service: String,
        /// Reason
        message: String,
    },

    /// A ready hook failed
    #[error("Service {service} did not become ready: {message}")]
    NotReady {
        /// Service
        service: String,
        /// Reason
        message: String,
    },

    /// A dependency did not become healthy in time
    #[error("Service {service} timed out waiting for {dependency} to become healthy")]
    DependencyTimeout {
        /// Waiting service
        service: String,
        /// Dependency it waited for
        dependency: String,
    },

    /// A release binary could not be downloaded or unpacked
    #[error("Release error: {0}")]
    Release(String),

    /// The session was torn down before it became ready
    #[error("Session stopped")]
    Stopped,

    /// Manifest resolution failed
    #[error(transparent)]
    Manifest(#[from] playground_manifest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write the compose document
    #[error("Failed to serialize compose file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for runner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lines of a service log shown in failure reports
pub const TAIL_LINES: usize = 10;

/// Last `n` lines of a log file, empty if it cannot be read
pub fn tail(path: &Path, n: usize) -> Vec<String> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

/// Multi-line report naming the service, the failing command and its log
pub fn failure_report(headline: &str, service: &str, command: Option<&str>, log: &Path) -> String {
    let mut report = format!("{}\n  service: {}", headline, service);
    if let Some(command) = command {
        report.push_str(&format!("\n  command: {}", command));
    }
    report.push_str(&format!("\n  log: {}", log.display()));
    let lines = tail(log, TAIL_LINES);
    if !lines.is_empty() {
        report.push_str(&format!("\n  last {} lines:", lines.len()));
        for line in lines {
            report.push_str("\n    ");
            report.push_str(&line);
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_failure_report_tails_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("svc.log");
        let body: Vec<String> = (1..=15).map(|i| format!("line {}", i)).collect();
        std::fs::write(&log, body.join("\n")).unwrap();

        let report = failure_report("init failed", "svc", Some("false"), &log);
        assert!(report.contains("service: svc"));
        assert!(report.contains("command: false"));
        assert!(report.contains("last 10 lines"));
        assert!(report.contains("line 6"));
        assert!(!report.contains("line 5\n"));
        assert!(report.ends_with("line 15"));
    }

    #[test]
    fn test_missing_log() {
        let report = failure_report("died", "el", None, &PathBuf::from("/nonexistent/el.log"));
        assert!(!report.contains("last"));
        assert!(!report.contains("command"));
    }
}
