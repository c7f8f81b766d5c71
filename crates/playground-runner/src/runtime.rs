//! The container runtime seam.
//!
//! The runner only needs a narrow slice of a container engine: image
//! inspection and pulls, `compose up`/`down` keyed by the session id, a
//! label-filtered event stream and log following. [`ContainerRuntime`]
//! captures that slice so tests can swap the docker CLI for a fake.

use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Label present on every playground container
pub const LABEL_PLAYGROUND: &str = "playground";
/// Label carrying the session id
pub const LABEL_SESSION: &str = "playground.session";
/// Label carrying the service name
pub const LABEL_SERVICE: &str = "service";
/// Prefix of the per-port labels
pub const LABEL_PORT_PREFIX: &str = "port.";

/// What happened to a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Container started
    Start,
    /// Container exited
    Die {
        /// Exit code, when reported
        exit_code: Option<i32>,
    },
    /// Healthcheck passed
    Healthy,
    /// Healthcheck failed past its retries
    Unhealthy,
}

/// A container event of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// Service label of the container
    pub service: String,
    /// What happened
    pub kind: EventKind,
}

impl ContainerEvent {
    /// Convenience constructor
    pub fn new(service: impl Into<String>, kind: EventKind) -> Self {
        Self { service: service.into(), kind }
    }
}

/// A running container of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container id
    pub id: String,
    /// Service label
    pub service: String,
}

/// Operations the runner needs from a container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether an image is present in the local cache
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image
    async fn pull_image(&self, image: &str, platform: Option<&str>) -> Result<()>;

    /// `compose up -d` of the project named after the session
    async fn compose_up(&self, session: &str, compose_file: &Path) -> Result<()>;

    /// `compose down` of the session project
    async fn compose_down(&self, session: &str, compose_file: &Path, keep_volumes: bool) -> Result<()>;

    /// Subscribe to container events labelled with the session id
    async fn events(&self, session: &str) -> Result<BoxStream<'static, ContainerEvent>>;

    /// Containers labelled with the session id
    async fn containers(&self, session: &str) -> Result<Vec<ContainerInfo>>;

    /// Follow a container's combined stdout and stderr
    async fn logs(&self, container: &str) -> Result<BoxStream<'static, String>>;

    /// SIGKILL every container labelled with the session id
    async fn kill_session(&self, session: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: RawActor,
}

#[derive(Debug, Default, Deserialize)]
struct RawActor {
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

/// Parse one line of `docker events --format '{{json .}}'`.
///
/// Returns `None` for events the runner does not track.
pub fn parse_event(line: &str) -> Option<ContainerEvent> {
    let raw: RawEvent = serde_json::from_str(line).ok()?;
    let service = raw.actor.attributes.get(LABEL_SERVICE)?.clone();
    let kind = match raw.action.trim() {
        "start" => EventKind::Start,
        "die" => EventKind::Die {
            exit_code: raw.actor.attributes.get("exitCode").and_then(|c| c.parse().ok()),
        },
        "health_status: healthy" => EventKind::Healthy,
        "health_status: unhealthy" => EventKind::Unhealthy,
        _ => return None,
    };
    Some(ContainerEvent { service, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let start = r#"{"Type":"container","Action":"start","Actor":{"ID":"abc","Attributes":{"service":"el","playground":"true"}}}"#;
        assert_eq!(parse_event(start), Some(ContainerEvent::new("el", EventKind::Start)));

        let die = r#"{"Action":"die","Actor":{"Attributes":{"service":"beacon","exitCode":"137"}}}"#;
        assert_eq!(
            parse_event(die),
            Some(ContainerEvent::new("beacon", EventKind::Die { exit_code: Some(137) }))
        );

        let healthy = r#"{"Action":"health_status: healthy","Actor":{"Attributes":{"service":"el"}}}"#;
        assert_eq!(parse_event(healthy).unwrap().kind, EventKind::Healthy);

        let unhealthy = r#"{"Action":"health_status: unhealthy","Actor":{"Attributes":{"service":"el"}}}"#;
        assert_eq!(parse_event(unhealthy).unwrap().kind, EventKind::Unhealthy);
    }

    #[test]
    fn test_ignored_events() {
        assert_eq!(parse_event(r#"{"Action":"create","Actor":{"Attributes":{"service":"el"}}}"#), None);
        assert_eq!(parse_event(r#"{"Action":"start","Actor":{"Attributes":{}}}"#), None);
        assert_eq!(parse_event("not json"), None);
    }
}
