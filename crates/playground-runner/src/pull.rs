//! Parallel, deduplicated image pulls.

use crate::runtime::ContainerRuntime;
use crate::{Error, Result};
use async_channel::Sender;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::lock::Mutex;
use futures::stream::{self, TryStreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

type PullFuture = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

/// Progress of one image pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullEvent {
    /// The image is missing locally and is being pulled
    Pulling(String),
    /// The pull finished
    Pulled(String),
}

/// Pulls images missing from the local cache.
///
/// Concurrent requests for the same image join the first request's pull.
pub struct ImagePuller {
    runtime: Arc<dyn ContainerRuntime>,
    platform: Option<String>,
    parallelism: usize,
    inflight: Mutex<HashMap<String, PullFuture>>,
    events: Option<Sender<PullEvent>>,
}

impl ImagePuller {
    /// Create a puller running at most `parallelism` pulls at once
    pub fn new(runtime: Arc<dyn ContainerRuntime>, parallelism: usize) -> Self {
        Self {
            runtime,
            platform: None,
            parallelism: parallelism.max(1),
            inflight: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Pull for a specific platform
    pub fn with_platform(mut self, platform: Option<String>) -> Self {
        self.platform = platform;
        self
    }

    /// Report progress on a channel
    pub fn with_events(mut self, events: Sender<PullEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn start(&self, image: &str) -> PullFuture {
        let runtime = self.runtime.clone();
        let platform = self.platform.clone();
        let events = self.events.clone();
        let image = image.to_string();
        let message = |e: Error| match e {
            Error::Pull { message, .. } => message,
            other => other.to_string(),
        };

        async move {
            if runtime.image_exists(&image).await.map_err(message)? {
                debug!("Image {} is cached", image);
                return Ok(());
            }
            info!("Pulling {}", image);
            if let Some(events) = &events {
                let _ = events.try_send(PullEvent::Pulling(image.clone()));
            }
            runtime.pull_image(&image, platform.as_deref()).await.map_err(message)?;
            info!("Pulled {}", image);
            if let Some(events) = &events {
                let _ = events.try_send(PullEvent::Pulled(image.clone()));
            }
            Ok(())
        }
        .boxed()
        .shared()
    }

    /// Make sure one image is available locally
    pub async fn pull(&self, image: &str) -> Result<()> {
        let pull = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(image.to_string())
                .or_insert_with(|| self.start(image))
                .clone()
        };
        pull.await.map_err(|message| Error::Pull { image: image.to_string(), message })
    }

    /// Make sure every image is available, failing on the first error
    pub async fn pull_all<I>(&self, images: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let unique: BTreeSet<String> = images.into_iter().collect();
        stream::iter(unique.into_iter().map(Ok))
            .try_for_each_concurrent(self.parallelism, |image| async move {
                self.pull(&image).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerEvent, ContainerInfo};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Counts pulls; each pull takes a little while so requests overlap
    struct CountingRuntime {
        cached: Vec<&'static str>,
        pulls: StdMutex<Vec<String>>,
    }

    impl CountingRuntime {
        fn new(cached: &[&'static str]) -> Arc<Self> {
            Arc::new(Self { cached: cached.to_vec(), pulls: StdMutex::new(Vec::new()) })
        }

        fn pulls(&self) -> Vec<String> {
            self.pulls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for CountingRuntime {
        async fn image_exists(&self, image: &str) -> Result<bool> {
            Ok(self.cached.contains(&image))
        }

        async fn pull_image(&self, image: &str, _platform: Option<&str>) -> Result<()> {
            self.pulls.lock().unwrap().push(image.to_string());
            smol::Timer::after(Duration::from_millis(50)).await;
            if image == "broken" {
                return Err(Error::Pull { image: image.to_string(), message: "manifest unknown".to_string() });
            }
            Ok(())
        }

        async fn compose_up(&self, _session: &str, _compose_file: &Path) -> Result<()> {
            unreachable!()
        }

        async fn compose_down(&self, _session: &str, _compose_file: &Path, _keep_volumes: bool) -> Result<()> {
            unreachable!()
        }

        async fn events(&self, _session: &str) -> Result<BoxStream<'static, ContainerEvent>> {
            unreachable!()
        }

        async fn containers(&self, _session: &str) -> Result<Vec<ContainerInfo>> {
            unreachable!()
        }

        async fn logs(&self, _container: &str) -> Result<BoxStream<'static, String>> {
            unreachable!()
        }

        async fn kill_session(&self, _session: &str) -> Result<()> {
            unreachable!()
        }
    }

    #[smol_potat::test]
    async fn test_concurrent_requests_share_one_pull() {
        let runtime = CountingRuntime::new(&[]);
        let puller = ImagePuller::new(runtime.clone(), 4);

        let (first, second) = futures::join!(puller.pull("reth:v1"), puller.pull("reth:v1"));
        first.unwrap();
        second.unwrap();
        assert_eq!(runtime.pulls(), vec!["reth:v1"]);

        puller.pull("reth:v1").await.unwrap();
        assert_eq!(runtime.pulls().len(), 1);
    }

    #[smol_potat::test]
    async fn test_events_only_for_missing_images() {
        let runtime = CountingRuntime::new(&["lighthouse:v7"]);
        let (tx, rx) = async_channel::unbounded();
        let puller = ImagePuller::new(runtime.clone(), 2).with_events(tx);

        let images = ["lighthouse:v7", "reth:v1", "reth:v1"].map(String::from);
        puller.pull_all(images).await.unwrap();
        drop(puller);

        let mut events = Vec::new();
        while let Ok(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![PullEvent::Pulling("reth:v1".to_string()), PullEvent::Pulled("reth:v1".to_string())]
        );
        assert_eq!(runtime.pulls(), vec!["reth:v1"]);
    }

    #[smol_potat::test]
    async fn test_failed_pull_names_the_image() {
        let puller = ImagePuller::new(CountingRuntime::new(&[]), 1);
        let err = puller.pull_all(vec!["broken".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Pull { ref image, ref message } if image == "broken" && message == "manifest unknown"));
    }
}
