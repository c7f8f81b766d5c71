//! L1 services: execution client, beacon node, validator client, relay and
//! the transaction spammer.

use super::hooks::{ChainWatchdog, FirstBlockHook};
use crate::{ComponentFactory, RecipeContext, Result};
use playground_artifacts::{GENESIS_FILE, JWT_FILE, TESTNET_DIR, VALIDATOR_DATA_DIR};
use playground_manifest::{ReadyCheck, Release, ReleaseFormat, Service, ServiceHooks, Volume};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Reth container image
pub const RETH_IMAGE: &str = "ghcr.io/paradigmxyz/reth";
/// Reth version, shared by the image tag and the native release
pub const RETH_VERSION: &str = "v1.4.8";
/// Lighthouse container image
pub const LIGHTHOUSE_IMAGE: &str = "sigp/lighthouse";
/// Lighthouse image tag
pub const LIGHTHOUSE_TAG: &str = "v7.0.1";
/// Image bundling the playground relay
pub const UTILS_IMAGE: &str = "docker.io/flashbots/playground-utils";
/// Contender image
pub const CONTENDER_IMAGE: &str = "flashbots/contender";

/// Fee recipient used by beacon and validator clients
pub const FEE_RECIPIENT: &str = "0x690B9A9E9aa1C9dB991C7721a92d351Db4FaC990";

/// Reth binary from the GitHub releases of paradigmxyz/reth
pub fn reth_release() -> Release {
    Release {
        name: "reth".to_string(),
        org: "paradigmxyz".to_string(),
        repo: "reth".to_string(),
        version: RETH_VERSION.to_string(),
        arch: BTreeMap::from([
            ("linux/amd64".to_string(), "x86_64-unknown-linux-gnu".to_string()),
            ("linux/arm64".to_string(), "aarch64-unknown-linux-gnu".to_string()),
            ("darwin/arm64".to_string(), "aarch64-apple-darwin".to_string()),
        ]),
        format: ReleaseFormat::TarGz,
    }
}

/// Reth execution client
#[derive(Debug, Clone)]
pub struct Reth {
    /// Run from a downloaded release on the host
    pub native: bool,
    /// Dial the context bootnode
    pub use_bootnode: bool,
    /// Block time, sizes the watchdog stall window
    pub block_time: u64,
}

impl Default for Reth {
    fn default() -> Self {
        Self { native: false, use_bootnode: false, block_time: playground_artifacts::DEFAULT_BLOCK_TIME }
    }
}

impl Reth {
    fn stall_timeout(&self) -> Duration {
        Duration::from_secs((self.block_time * 5).max(30))
    }
}

impl ComponentFactory for Reth {
    fn kind(&self) -> &'static str {
        "reth"
    }

    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service> {
        let enode = ctx.artifacts.next_enode()?;
        let verbosity = format!("-{}", "v".repeat(ctx.ex.log_level.verbosity()));

        let service = Service::new(name).with_component(self.kind());
        let service = if self.native {
            service.with_release(reth_release())
        } else {
            service
                .with_image(RETH_IMAGE)
                .with_tag(RETH_VERSION)
                .with_entrypoint("/usr/local/bin/reth")
        };

        let service = service
            .with_args([
                "node",
                "--chain",
                "/data/genesis.json",
                "--datadir",
                "/data_reth",
                "--color",
                "never",
                "--ipcpath",
                "/data_reth/reth.ipc",
                "--addr",
                "0.0.0.0",
                "--port",
                r#"{{Port "rlpx" 30303}}"#,
                "--discovery.port",
                r#"{{PortUDP "rlpx" 30303}}"#,
                "--p2p-secret-key",
                "/data/p2p_key.txt",
                "--http",
                "--http.addr",
                "0.0.0.0",
                "--http.api",
                "admin,eth,web3,net,rpc,mev,flashbots",
                "--http.port",
                r#"{{Port "http" 8545}}"#,
                "--authrpc.port",
                r#"{{Port "authrpc" 8551}}"#,
                "--authrpc.addr",
                "0.0.0.0",
                "--authrpc.jwtsecret",
                "/data/jwtsecret",
                "--metrics",
                r#"0.0.0.0:{{Port "metrics" 9090}}"#,
                "--engine.persistence-threshold",
                "0",
                "--engine.memory-block-buffer-target",
                "0",
            ])
            .with_args([verbosity])
            .with_args_if(self.use_bootnode, ["--bootnodes", "{{Bootnode}}"])
            .with_artifact("/data/genesis.json", GENESIS_FILE)
            .with_artifact("/data/jwtsecret", JWT_FILE)
            .with_artifact("/data/p2p_key.txt", enode.key_file)
            .with_volume("/data_reth", Volume::local_bind(format!("{}-data", name)))
            .with_ready_check(ReadyCheck::nc("http://localhost:8545").with_start_period(Duration::from_secs(2)));

        let hooks = self.hooks(&service);
        Ok(Service { hooks, ..service })
    }

    fn hooks(&self, _service: &Service) -> ServiceHooks {
        ServiceHooks {
            watchdog: Some(Arc::new(ChainWatchdog::new("http", self.stall_timeout()))),
            ready: Some(Arc::new(FirstBlockHook::new("http"))),
        }
    }
}

/// Lighthouse beacon node
#[derive(Debug, Clone)]
pub struct LighthouseBeacon {
    /// Execution client driven through the engine API
    pub execution: String,
    /// Relay used as external builder, if any
    pub relay: Option<String>,
}

impl Default for LighthouseBeacon {
    fn default() -> Self {
        Self { execution: "el".to_string(), relay: Some("mev-boost-relay".to_string()) }
    }
}

impl ComponentFactory for LighthouseBeacon {
    fn kind(&self) -> &'static str {
        "lighthouse-beacon"
    }

    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service> {
        let mut service = Service::new(name)
            .with_component(self.kind())
            .with_image(LIGHTHOUSE_IMAGE)
            .with_tag(LIGHTHOUSE_TAG)
            .with_entrypoint("lighthouse")
            .with_args([
                "bn",
                "--datadir",
                "/data_beacon",
                "--testnet-dir",
                "/data/testnet-dir",
                "--enable-private-discovery",
                "--disable-peer-scoring",
                "--staking",
                "--enr-address",
                "127.0.0.1",
                "--enr-udp-port",
                r#"{{PortUDP "p2p" 9000}}"#,
                "--enr-tcp-port",
                r#"{{Port "p2p" 9000}}"#,
                "--enr-quic-port",
                r#"{{PortUDP "quic-p2p" 9100}}"#,
                "--port",
                r#"{{Port "p2p" 9000}}"#,
                "--quic-port",
                r#"{{PortUDP "quic-p2p" 9100}}"#,
                "--http",
                "--http-port",
                r#"{{Port "http" 3500}}"#,
                "--http-address",
                "0.0.0.0",
                "--http-allow-origin",
                "*",
                "--disable-packet-filter",
                "--target-peers",
                "0",
                "--execution-jwt",
                "/data/jwtsecret",
                "--always-prepare-payload",
                "--prepare-payload-lookahead",
                "8000",
                "--suggested-fee-recipient",
                FEE_RECIPIENT,
                "--debug-level",
            ])
            .with_args([ctx.ex.log_level.to_string()])
            .with_args([
                "--execution-endpoint".to_string(),
                format!(r#"{{{{Service "{}" "authrpc" "http" ""}}}}"#, self.execution),
            ]);

        if let Some(relay) = &self.relay {
            service = service.with_args([
                "--builder".to_string(),
                format!(r#"{{{{Service "{}" "http" "http" ""}}}}"#, relay),
                "--builder-fallback-epochs-since-finalization".to_string(),
                "0".to_string(),
                "--builder-fallback-disable-checks".to_string(),
            ]);
        }

        Ok(service
            .with_artifact("/data/testnet-dir", TESTNET_DIR)
            .with_artifact("/data/jwtsecret", JWT_FILE)
            .with_volume("/data_beacon", Volume::local_bind(format!("{}-data", name)))
            .depends_on_healthy(&self.execution)
            .with_ready_check(
                ReadyCheck::http("http://localhost:3500/eth/v1/node/syncing")
                    .with_start_period(Duration::from_secs(1))
                    .with_retries(30),
            ))
    }
}

/// Lighthouse validator client holding the interop keys
#[derive(Debug, Clone)]
pub struct LighthouseValidator {
    /// Beacon node to attach to
    pub beacon: String,
}

impl Default for LighthouseValidator {
    fn default() -> Self {
        Self { beacon: "beacon".to_string() }
    }
}

impl ComponentFactory for LighthouseValidator {
    fn kind(&self) -> &'static str {
        "lighthouse-validator"
    }

    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service> {
        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(LIGHTHOUSE_IMAGE)
            .with_tag(LIGHTHOUSE_TAG)
            .with_entrypoint("lighthouse")
            .with_args([
                "vc".to_string(),
                "--datadir".to_string(),
                "/data/validator".to_string(),
                "--testnet-dir".to_string(),
                "/data/testnet-dir".to_string(),
                "--init-slashing-protection".to_string(),
                "--beacon-nodes".to_string(),
                format!(r#"{{{{Service "{}" "http" "http" ""}}}}"#, self.beacon),
                "--suggested-fee-recipient".to_string(),
                FEE_RECIPIENT.to_string(),
                "--builder-proposals".to_string(),
                "--prefer-builder-proposals".to_string(),
                "--debug-level".to_string(),
                ctx.ex.log_level.to_string(),
            ])
            .with_artifact("/data/validator", VALIDATOR_DATA_DIR)
            .with_artifact("/data/testnet-dir", TESTNET_DIR)
            .depends_on_healthy(&self.beacon))
    }
}

/// Local MEV-Boost relay that also acts as the block builder of last resort
#[derive(Debug, Clone)]
pub struct MevBoostRelay {
    /// Beacon node the relay follows
    pub beacon: String,
    /// Builder validating submissions, if any
    pub validation: Option<String>,
}

impl Default for MevBoostRelay {
    fn default() -> Self {
        Self { beacon: "beacon".to_string(), validation: None }
    }
}

impl ComponentFactory for MevBoostRelay {
    fn kind(&self) -> &'static str {
        "mev-boost-relay"
    }

    fn build(&self, name: &str, _ctx: &mut RecipeContext<'_>) -> Result<Service> {
        let mut service = Service::new(name)
            .with_component(self.kind())
            .with_image(UTILS_IMAGE)
            .with_tag("latest")
            .with_entrypoint("mev-boost-relay")
            .with_env("ALLOW_SYNCING_BEACON_NODE", "1")
            .with_args([
                "--api-listen-addr".to_string(),
                "0.0.0.0".to_string(),
                "--api-listen-port".to_string(),
                r#"{{Port "http" 5555}}"#.to_string(),
                "--beacon-client-addr".to_string(),
                format!(r#"{{{{Service "{}" "http" "http" ""}}}}"#, self.beacon),
            ]);

        if let Some(validation) = &self.validation {
            service = service.with_args([
                "--validation-server-addr".to_string(),
                format!(r#"{{{{Service "{}" "http" "http" ""}}}}"#, validation),
            ]);
        }

        Ok(service
            .depends_on_healthy(&self.beacon)
            .with_ready_check(
                ReadyCheck::http("http://localhost:5555/eth/v1/builder/status").with_retries(30),
            ))
    }
}

/// Contender transaction spammer aimed at an execution client
#[derive(Debug, Clone)]
pub struct Contender {
    /// Execution client receiving the transactions
    pub target: String,
}

impl Default for Contender {
    fn default() -> Self {
        Self { target: "el".to_string() }
    }
}

impl ComponentFactory for Contender {
    fn kind(&self) -> &'static str {
        "contender"
    }

    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service> {
        let funder = ctx
            .artifacts
            .accounts
            .last()
            .map(|account| account.key.to_string())
            .unwrap_or_default();

        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(CONTENDER_IMAGE)
            .with_tag("latest")
            .with_args([
                "spam".to_string(),
                "--tps".to_string(),
                "20".to_string(),
                "--forever".to_string(),
                "-r".to_string(),
                format!(r#"{{{{Service "{}" "http" "http" ""}}}}"#, self.target),
                "-p".to_string(),
                funder,
                "fill-block".to_string(),
            ])
            .with_args(ctx.ex.contender.extra_args.iter().cloned())
            .depends_on_healthy(&self.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reth_release_targets() {
        let release = reth_release();
        assert_eq!(
            release.download_url("linux/amd64").unwrap(),
            format!(
                "https://github.com/paradigmxyz/reth/releases/download/{0}/reth-{0}-x86_64-unknown-linux-gnu.tar.gz",
                RETH_VERSION
            )
        );
        assert!(release.download_url("windows/amd64").is_err());
    }

    #[test]
    fn test_watchdog_window_has_floor() {
        assert_eq!(Reth::default().stall_timeout(), Duration::from_secs(60));
        let fast = Reth { block_time: 2, ..Reth::default() };
        assert_eq!(fast.stall_timeout(), Duration::from_secs(30));
    }
}
