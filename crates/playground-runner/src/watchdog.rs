//! In-process callbacks run once the session is up.

use crate::{Error, Result};
use futures::future::try_join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use playground_manifest::{Manifest, ServiceEndpoint};
use tracing::{debug, info};

/// Run every ready hook concurrently, failing on the first error
pub async fn run_ready_hooks(manifest: &Manifest) -> Result<()> {
    let hooks = manifest.services.iter().filter_map(|service| {
        let hook = service.hooks.ready.clone()?;
        let endpoint = ServiceEndpoint::from_service(service);
        Some(async move {
            hook.ready(&endpoint).await.map_err(|e| Error::NotReady {
                service: endpoint.service.clone(),
                message: format!("{:#}", e),
            })
        })
    });
    try_join_all(hooks).await?;
    Ok(())
}

/// Run every watchdog until the first one fails.
///
/// Returns `Ok` once all watchdogs have returned without error, or at once
/// when no service carries one.
pub async fn run_watchdogs(manifest: &Manifest) -> Result<()> {
    let mut running: FuturesUnordered<_> = manifest
        .services
        .iter()
        .filter_map(|service| {
            let watchdog = service.hooks.watchdog.clone()?;
            let endpoint = ServiceEndpoint::from_service(service);
            Some(async move {
                let result = watchdog.watch(&endpoint).await;
                (endpoint.service, result)
            })
        })
        .collect();

    if running.is_empty() {
        return Ok(());
    }
    info!("Running {} watchdogs", running.len());

    while let Some((service, result)) = running.next().await {
        match result {
            Ok(()) => debug!("Watchdog of {} finished", service),
            Err(e) => {
                return Err(Error::Watchdog { service, message: format!("{:#}", e) });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use playground_manifest::{ComponentTree, ExContext, ReadyHook, Service, Watchdog};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Stalls(Duration);

    #[async_trait]
    impl Watchdog for Stalls {
        async fn watch(&self, endpoint: &ServiceEndpoint) -> anyhow::Result<()> {
            smol::Timer::after(self.0).await;
            anyhow::bail!("{} stalled", endpoint.service)
        }
    }

    struct Counts(Arc<AtomicUsize>);

    #[async_trait]
    impl ReadyHook for Counts {
        async fn ready(&self, _endpoint: &ServiceEndpoint) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manifest() -> Manifest {
        let mut tree = ComponentTree::new("test");
        let root = tree.root();
        tree.add_service(root, Service::new("el").with_image("reth"));
        tree.add_service(root, Service::new("op-geth").with_image("geth"));
        Manifest::from_tree("s", "test", ExContext::default(), &tree).unwrap()
    }

    #[smol_potat::test]
    async fn test_first_failure_wins() {
        let mut manifest = manifest();
        manifest.services[0].hooks.watchdog = Some(Arc::new(Stalls(Duration::from_secs(30))));
        manifest.services[1].hooks.watchdog = Some(Arc::new(Stalls(Duration::from_millis(10))));

        let err = run_watchdogs(&manifest).await.unwrap_err();
        assert!(matches!(err, Error::Watchdog { ref service, ref message }
            if service == "op-geth" && message == "op-geth stalled"));
    }

    #[smol_potat::test]
    async fn test_no_watchdogs() {
        run_watchdogs(&manifest()).await.unwrap();
    }

    #[smol_potat::test]
    async fn test_ready_hooks_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut manifest = manifest();
        for service in &mut manifest.services {
            service.hooks.ready = Some(Arc::new(Counts(count.clone())));
        }
        run_ready_hooks(&manifest).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
