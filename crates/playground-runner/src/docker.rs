//! [`ContainerRuntime`] backed by the docker CLI.

use crate::runtime::{ContainerEvent, ContainerInfo, ContainerRuntime, LABEL_SESSION, parse_event};
use crate::{Error, Result};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use futures_lite::io::{AsyncBufReadExt, BufReader};
use std::path::Path;
use std::process::Output;
use tracing::{debug, info};

/// Drives `docker` and `docker compose` as child processes
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Use `docker` from `PATH`
    pub fn new() -> Self {
        Self { binary: "docker".to_string() }
    }

    /// Use a specific docker binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn output(&self, args: &[String]) -> Result<Output> {
        debug!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Docker(format!("failed to run {}: {}", self.binary, e)))
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(Error::Docker(format!(
                "{} {} failed: {}",
                self.binary,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Stream the merged stdout and stderr lines of a long-running docker command.
    ///
    /// The child is killed when the stream is dropped.
    fn follow(&self, args: &[String]) -> Result<BoxStream<'static, String>> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Docker(format!("failed to spawn {}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Docker("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Docker("child stderr not captured".to_string()))?;

        let out = BufReader::new(stdout)
            .lines()
            .filter_map(|line| futures::future::ready(line.ok()));
        let err = BufReader::new(stderr)
            .lines()
            .filter_map(|line| futures::future::ready(line.ok()));
        let merged = stream::select(out, err).boxed();

        Ok(stream::unfold((merged, child), |(mut merged, child)| async move {
            let line = merged.next().await?;
            Some((line, (merged, child)))
        })
        .boxed())
    }

    fn compose_args(session: &str, compose_file: &Path) -> Vec<String> {
        let mut args = vec!["compose".to_string(), "-p".to_string(), session.to_string()];
        if compose_file.exists() {
            args.push("-f".to_string());
            args.push(compose_file.display().to_string());
        }
        args
    }

    fn session_filter(session: &str) -> String {
        format!("label={}={}", LABEL_SESSION, session)
    }

    /// `docker events` replaying from `since`, so events emitted before the
    /// subscription is live are still delivered
    fn events_args(session: &str, since: DateTime<Utc>) -> Vec<String> {
        vec![
            "events".to_string(),
            "--since".to_string(),
            format!("{}.{:09}", since.timestamp(), since.timestamp_subsec_nanos()),
            "--filter".to_string(),
            "type=container".to_string(),
            "--filter".to_string(),
            Self::session_filter(session),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ]
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let args = ["image", "inspect", "--format", "{{.Id}}", image].map(String::from);
        Ok(self.output(&args).await?.status.success())
    }

    async fn pull_image(&self, image: &str, platform: Option<&str>) -> Result<()> {
        let mut args = vec!["pull".to_string()];
        if let Some(platform) = platform {
            args.push("--platform".to_string());
            args.push(platform.to_string());
        }
        args.push(image.to_string());

        let output = self.output(&args).await?;
        if !output.status.success() {
            return Err(Error::Pull {
                image: image.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn compose_up(&self, session: &str, compose_file: &Path) -> Result<()> {
        let mut args = Self::compose_args(session, compose_file);
        args.extend(["up", "-d"].map(String::from));
        info!("Starting compose project {}", session);

        let output = self.output(&args).await?;
        if !output.status.success() {
            return Err(Error::Compose(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn compose_down(&self, session: &str, compose_file: &Path, keep_volumes: bool) -> Result<()> {
        let mut args = Self::compose_args(session, compose_file);
        args.push("down".to_string());
        if !keep_volumes {
            args.push("-v".to_string());
        }
        info!("Tearing down compose project {}", session);

        let output = self.output(&args).await?;
        if !output.status.success() {
            return Err(Error::Compose(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn events(&self, session: &str) -> Result<BoxStream<'static, ContainerEvent>> {
        let args = Self::events_args(session, Utc::now());
        let lines = self.follow(&args)?;
        Ok(lines
            .filter_map(|line| futures::future::ready(parse_event(&line)))
            .boxed())
    }

    async fn containers(&self, session: &str) -> Result<Vec<ContainerInfo>> {
        let args = [
            "ps".to_string(),
            "--filter".to_string(),
            Self::session_filter(session),
            "--format".to_string(),
            "{{.ID}}|{{.Label \"service\"}}".to_string(),
            "--no-trunc".to_string(),
        ];
        let out = self.run(&args).await?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (id, service) = line.trim().split_once('|')?;
                Some(ContainerInfo { id: id.to_string(), service: service.to_string() })
            })
            .collect())
    }

    async fn logs(&self, container: &str) -> Result<BoxStream<'static, String>> {
        let args = ["logs", "-f", "--tail", "all", container].map(String::from);
        self.follow(&args)
    }

    async fn kill_session(&self, session: &str) -> Result<()> {
        let args = ["ps".to_string(), "-q".to_string(), "--filter".to_string(), Self::session_filter(session)];
        let ids: Vec<String> = self
            .run(&args)
            .await?
            .split_whitespace()
            .map(String::from)
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let mut args = vec!["stop".to_string(), "-s".to_string(), "SIGKILL".to_string()];
        args.extend(ids);
        self.run(&args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_events_replay_from_subscription_time() {
        let since = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
        let args = DockerCli::events_args("brave-otter", since);
        assert_eq!(&args[..3], ["events", "--since", "1700000000.000005000"]);
        assert!(args.contains(&format!("label={}=brave-otter", LABEL_SESSION)));
    }
}
