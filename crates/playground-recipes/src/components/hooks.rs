//! Chain liveness callbacks for execution clients.

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use playground_manifest::{ReadyHook, ServiceEndpoint, Watchdog};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Latest block number over JSON-RPC
pub async fn block_number(url: &str) -> anyhow::Result<u64> {
    let url = url.to_string();
    smol::unblock(move || {
        let client = reqwest::blocking::Client::builder().timeout(RPC_TIMEOUT).build()?;
        let response: serde_json::Value = client
            .post(&url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_blockNumber",
                "params": []
            }))
            .send()
            .with_context(|| format!("eth_blockNumber against {}", url))?
            .json()?;
        let hex = response["result"]
            .as_str()
            .ok_or_else(|| anyhow!("unexpected eth_blockNumber response: {}", response))?;
        Ok(u64::from_str_radix(hex.trim_start_matches("0x"), 16)?)
    })
    .await
}

fn rpc_url(endpoint: &ServiceEndpoint, port: &str) -> anyhow::Result<String> {
    endpoint
        .http_url(port)
        .ok_or_else(|| anyhow!("service {} has no reserved '{}' port", endpoint.service, port))
}

/// Fails when the chain head stops advancing
#[derive(Debug, Clone)]
pub struct ChainWatchdog {
    port: String,
    stall_timeout: Duration,
    interval: Duration,
}

impl ChainWatchdog {
    /// Watch the RPC behind `port`, allowing `stall_timeout` between blocks
    pub fn new(port: impl Into<String>, stall_timeout: Duration) -> Self {
        Self { port: port.into(), stall_timeout, interval: Duration::from_secs(1) }
    }

    /// Poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl Watchdog for ChainWatchdog {
    async fn watch(&self, endpoint: &ServiceEndpoint) -> anyhow::Result<()> {
        let url = rpc_url(endpoint, &self.port)?;
        let mut head = 0u64;
        let mut last_progress = Instant::now();
        info!("Watching chain head of {}", endpoint.service);

        loop {
            smol::Timer::after(self.interval).await;
            match block_number(&url).await {
                Ok(n) if n > head => {
                    debug!("{} head at block {}", endpoint.service, n);
                    head = n;
                    last_progress = Instant::now();
                }
                Ok(_) => {}
                Err(e) => warn!("Watchdog query of {} failed: {}", endpoint.service, e),
            }
            if last_progress.elapsed() > self.stall_timeout {
                bail!(
                    "chain head of {} stuck at block {} for more than {:?}",
                    endpoint.service,
                    head,
                    self.stall_timeout
                );
            }
        }
    }
}

/// Ready once the chain has produced its first block
#[derive(Debug, Clone)]
pub struct FirstBlockHook {
    port: String,
    interval: Duration,
}

impl FirstBlockHook {
    /// Poll the RPC behind `port`
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into(), interval: Duration::from_secs(1) }
    }
}

#[async_trait]
impl ReadyHook for FirstBlockHook {
    async fn ready(&self, endpoint: &ServiceEndpoint) -> anyhow::Result<()> {
        let url = rpc_url(endpoint, &self.port)?;
        loop {
            match block_number(&url).await {
                Ok(n) if n > 0 => {
                    info!("{} produced block {}", endpoint.service, n);
                    return Ok(());
                }
                Ok(_) => debug!("{} still at genesis", endpoint.service),
                Err(e) => debug!("{} not answering yet: {}", endpoint.service, e),
            }
            smol::Timer::after(self.interval).await;
        }
    }
}
