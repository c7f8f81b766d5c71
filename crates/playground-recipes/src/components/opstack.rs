//! OP-stack services: op-geth, op-node, op-batcher and rollup-boost.

use super::hooks::ChainWatchdog;
use crate::{ComponentFactory, RecipeContext, Result};
use playground_artifacts::JWT_FILE;
use playground_artifacts::l2::{DEFAULT_L2_BLOCK_TIME, L2_GENESIS_FILE, ROLLUP_FILE};
use playground_manifest::{ReadyCheck, Service, ServiceHooks, Volume};
use std::sync::Arc;
use std::time::Duration;

const OP_IMAGES: &str = "us-docker.pkg.dev/oplabs-tools-artifacts/images";

/// op-geth image tag
pub const OP_GETH_TAG: &str = "v1.101503.2";
/// op-node image tag
pub const OP_NODE_TAG: &str = "v1.13.3";
/// op-batcher image tag
pub const OP_BATCHER_TAG: &str = "v1.14.0";
/// rollup-boost image
pub const ROLLUP_BOOST_IMAGE: &str = "docker.io/flashbots/rollup-boost";
/// rollup-boost image tag
pub const ROLLUP_BOOST_TAG: &str = "v0.7.0";

/// Dev account that signs batches
const BATCHER_ACCOUNT: usize = 2;
/// Dev account that signs sequencer gossip
const SEQUENCER_ACCOUNT: usize = 1;

fn service_url(service: &str, port: &str) -> String {
    format!(r#"{{{{Service "{}" "{}" "http" ""}}}}"#, service, port)
}

fn account_key(ctx: &RecipeContext<'_>, index: usize) -> String {
    ctx.artifacts
        .accounts
        .get(index)
        .map(|account| account.key.to_string())
        .unwrap_or_default()
}

/// Op-geth L2 execution client
#[derive(Debug, Clone)]
pub struct OpGeth {
    /// L2 block time, sizes the watchdog stall window
    pub block_time: u64,
}

impl Default for OpGeth {
    fn default() -> Self {
        Self { block_time: DEFAULT_L2_BLOCK_TIME }
    }
}

impl ComponentFactory for OpGeth {
    fn kind(&self) -> &'static str {
        "op-geth"
    }

    fn build(&self, name: &str, _ctx: &mut RecipeContext<'_>) -> Result<Service> {
        // geth needs its datadir initialised from the genesis before it starts
        let script = [
            "geth init --datadir /data_opgeth --state.scheme hash /data/l2-genesis.json",
            "&& exec geth",
            "--datadir /data_opgeth",
            "--verbosity 3",
            "--http --http.corsdomain \"*\" --http.vhosts \"*\" --http.addr 0.0.0.0",
            r#"--http.port {{Port "http" 8545}}"#,
            "--http.api web3,debug,eth,txpool,net,engine,miner",
            r#"--ws --ws.addr 0.0.0.0 --ws.port {{Port "ws" 8546}} --ws.api debug,eth,txpool,net,engine"#,
            "--syncmode full --nodiscover --maxpeers 5 --rpc.allow-unprotected-txs",
            r#"--authrpc.addr 0.0.0.0 --authrpc.port {{Port "authrpc" 8551}} --authrpc.vhosts "*""#,
            "--authrpc.jwtsecret /data/jwtsecret",
            "--gcmode archive --state.scheme hash",
            r#"--port {{Port "rlpx" 30304}}"#,
            r#"--metrics --metrics.addr 0.0.0.0 --metrics.port {{Port "metrics" 6061}}"#,
        ]
        .join(" ");

        let service = Service::new(name)
            .with_component(self.kind())
            .with_image(format!("{}/op-geth", OP_IMAGES))
            .with_tag(OP_GETH_TAG)
            .with_entrypoint("/bin/sh")
            .with_args(["-c".to_string(), script])
            .with_artifact("/data/l2-genesis.json", L2_GENESIS_FILE)
            .with_artifact("/data/jwtsecret", JWT_FILE)
            .with_volume("/data_opgeth", Volume::local_bind(format!("{}-data", name)))
            .with_ready_check(ReadyCheck::nc("http://localhost:8545").with_start_period(Duration::from_secs(2)));

        let hooks = self.hooks(&service);
        Ok(Service { hooks, ..service })
    }

    fn hooks(&self, _service: &Service) -> ServiceHooks {
        let stall = Duration::from_secs((self.block_time * 10).max(20));
        ServiceHooks { watchdog: Some(Arc::new(ChainWatchdog::new("http", stall))), ready: None }
    }
}

/// Op-node rollup driver in sequencer mode
#[derive(Debug, Clone)]
pub struct OpNode {
    /// L1 execution client
    pub l1: String,
    /// L1 beacon node
    pub l1_beacon: String,
    /// Engine API target, op-geth or rollup-boost in front of it
    pub l2_engine: String,
}

impl Default for OpNode {
    fn default() -> Self {
        Self {
            l1: "el".to_string(),
            l1_beacon: "beacon".to_string(),
            l2_engine: "op-geth".to_string(),
        }
    }
}

impl ComponentFactory for OpNode {
    fn kind(&self) -> &'static str {
        "op-node"
    }

    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service> {
        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(format!("{}/op-node", OP_IMAGES))
            .with_tag(OP_NODE_TAG)
            .with_entrypoint("op-node")
            .with_args([
                "--l1".to_string(),
                service_url(&self.l1, "http"),
                "--l1.beacon".to_string(),
                service_url(&self.l1_beacon, "http"),
                "--l1.epoch-poll-interval".to_string(),
                "12s".to_string(),
                "--l1.http-poll-interval".to_string(),
                "6s".to_string(),
                "--l2".to_string(),
                service_url(&self.l2_engine, "authrpc"),
                "--l2.jwt-secret".to_string(),
                "/data/jwtsecret".to_string(),
                "--sequencer.enabled".to_string(),
                "--sequencer.l1-confs".to_string(),
                "0".to_string(),
                "--verifier.l1-confs".to_string(),
                "0".to_string(),
                "--p2p.sequencer.key".to_string(),
                account_key(ctx, SEQUENCER_ACCOUNT),
                "--rollup.config".to_string(),
                "/data/rollup.json".to_string(),
                "--rpc.addr".to_string(),
                "0.0.0.0".to_string(),
                "--rpc.port".to_string(),
                r#"{{Port "http" 8549}}"#.to_string(),
                "--rpc.enable-admin".to_string(),
                "--p2p.listen.ip".to_string(),
                "0.0.0.0".to_string(),
                "--p2p.listen.tcp".to_string(),
                r#"{{Port "p2p" 9003}}"#.to_string(),
                "--p2p.listen.udp".to_string(),
                r#"{{PortUDP "p2p" 9003}}"#.to_string(),
                "--p2p.scoring.peers".to_string(),
                "light".to_string(),
                "--p2p.ban.peers".to_string(),
                "true".to_string(),
                "--metrics.enabled".to_string(),
                "--metrics.addr".to_string(),
                "0.0.0.0".to_string(),
                "--metrics.port".to_string(),
                r#"{{Port "metrics" 7300}}"#.to_string(),
                "--safedb.path".to_string(),
                "/data_db".to_string(),
                "--log.level".to_string(),
                ctx.ex.log_level.to_string(),
            ])
            .with_artifact("/data/jwtsecret", JWT_FILE)
            .with_artifact("/data/rollup.json", ROLLUP_FILE)
            .with_volume("/data_db", Volume::local_bind(format!("{}-data", name)))
            .depends_on_healthy(&self.l1)
            .depends_on_healthy(&self.l1_beacon)
            .depends_on_healthy(&self.l2_engine)
            .with_ready_check(ReadyCheck::nc("http://localhost:8549").with_retries(30)))
    }
}

/// Op-batcher posting L2 batches to L1
#[derive(Debug, Clone)]
pub struct OpBatcher {
    /// L1 execution client
    pub l1: String,
    /// L2 execution client
    pub l2: String,
    /// Rollup node
    pub rollup: String,
}

impl Default for OpBatcher {
    fn default() -> Self {
        Self { l1: "el".to_string(), l2: "op-geth".to_string(), rollup: "op-node".to_string() }
    }
}

impl ComponentFactory for OpBatcher {
    fn kind(&self) -> &'static str {
        "op-batcher"
    }

    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service> {
        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(format!("{}/op-batcher", OP_IMAGES))
            .with_tag(OP_BATCHER_TAG)
            .with_entrypoint("op-batcher")
            .with_args([
                "--l1-eth-rpc".to_string(),
                service_url(&self.l1, "http"),
                "--l2-eth-rpc".to_string(),
                service_url(&self.l2, "http"),
                "--rollup-rpc".to_string(),
                service_url(&self.rollup, "http"),
                "--max-channel-duration".to_string(),
                "2".to_string(),
                "--sub-safety-margin".to_string(),
                "4".to_string(),
                "--poll-interval".to_string(),
                "1s".to_string(),
                "--num-confirmations".to_string(),
                "1".to_string(),
                "--private-key".to_string(),
                account_key(ctx, BATCHER_ACCOUNT),
            ])
            .depends_on_healthy(&self.rollup))
    }
}

/// Rollup-boost multiplexing the engine API between op-geth and an
/// external block builder
#[derive(Debug, Clone)]
pub struct RollupBoost {
    /// Local L2 execution client
    pub l2: String,
    /// URL of the external builder's engine API
    pub builder_url: String,
}

impl Default for RollupBoost {
    fn default() -> Self {
        Self { l2: "op-geth".to_string(), builder_url: "http://host.docker.internal:8551".to_string() }
    }
}

impl ComponentFactory for RollupBoost {
    fn kind(&self) -> &'static str {
        "rollup-boost"
    }

    fn build(&self, name: &str, _ctx: &mut RecipeContext<'_>) -> Result<Service> {
        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(ROLLUP_BOOST_IMAGE)
            .with_tag(ROLLUP_BOOST_TAG)
            .with_entrypoint("/usr/local/bin/rollup-boost")
            .with_args([
                "--rpc-host".to_string(),
                "0.0.0.0".to_string(),
                "--rpc-port".to_string(),
                r#"{{Port "authrpc" 8551}}"#.to_string(),
                "--l2-jwt-path".to_string(),
                "/data/jwtsecret".to_string(),
                "--l2-url".to_string(),
                service_url(&self.l2, "authrpc"),
                "--builder-jwt-path".to_string(),
                "/data/jwtsecret".to_string(),
                "--builder-url".to_string(),
                self.builder_url.clone(),
            ])
            .with_env("RUST_LOG", "info")
            .with_artifact("/data/jwtsecret", JWT_FILE)
            .depends_on_healthy(&self.l2)
            .with_ready_check(ReadyCheck::nc("http://localhost:8551")))
    }
}
