//! Session output directory and the global home directory.

use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the directory holding per-service logs
pub const LOGS_DIR: &str = "logs";

/// Scoped filesystem directory of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    dir: PathBuf,
}

impl Output {
    /// Create (if needed) and open a session directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let dir = fs::canonicalize(dir)?;
        Ok(Self { dir })
    }

    /// Absolute path of the directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of an entry
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.join(rel)
    }

    /// Whether an entry exists
    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.path(rel).exists()
    }

    /// Create a subdirectory
    pub fn create_dir(&self, rel: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.path(rel);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Write a file, creating parent directories
    pub fn write_file(&self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write a pretty-printed JSON document
    pub fn write_json<T: Serialize>(&self, rel: impl AsRef<Path>, value: &T) -> Result<PathBuf> {
        let mut data = serde_json::to_vec_pretty(value)?;
        data.push(b'\n');
        self.write_file(rel, data)
    }

    /// Write a YAML document
    pub fn write_yaml<T: Serialize>(&self, rel: impl AsRef<Path>, value: &T) -> Result<PathBuf> {
        self.write_file(rel, serde_yaml::to_string(value)?)
    }

    /// Read a file
    pub fn read(&self, rel: impl AsRef<Path>) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(rel))?)
    }

    /// Copy a file from outside the session into it
    pub fn copy_in(&self, src: impl AsRef<Path>, rel: impl AsRef<Path>) -> Result<PathBuf> {
        let src = src.as_ref();
        let data = fs::read(src).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", src.display(), e),
            ))
        })?;
        self.write_file(rel, data)
    }

    /// Log file of a service
    pub fn log_path(&self, service: &str) -> PathBuf {
        self.dir.join(LOGS_DIR).join(format!("{}.log", service))
    }
}

/// Global state directory holding downloaded binaries.
///
/// `$XDG_STATE_HOME/builder-playground`, falling back to
/// `~/.local/state/builder-playground`.
pub fn home_dir() -> Result<PathBuf> {
    let base = match dirs::state_dir() {
        Some(dir) => dir,
        None => dirs::home_dir()
            .map(|h| h.join(".local").join("state"))
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "cannot determine home directory",
                ))
            })?,
    };
    let dir = base.join("builder-playground");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_nested_files() {
        let tmp = TempDir::new().unwrap();
        let out = Output::new(tmp.path().join("session")).unwrap();

        let path = out.write_file("testnet/deploy_block.txt", "0").unwrap();
        assert!(path.is_absolute());
        assert_eq!(fs::read_to_string(path).unwrap(), "0");

        out.write_json("x.json", &serde_json::json!({"a": 1})).unwrap();
        assert!(out.exists("x.json"));
        assert_eq!(out.log_path("el"), out.dir().join("logs").join("el.log"));
    }
}
