//! Block builder and the builder hub with its database.

use crate::{ComponentFactory, RecipeContext, Result};
use playground_artifacts::GENESIS_FILE;
use playground_manifest::{Protocol, ReadyCheck, Service, Volume};

/// rbuilder image
pub const RBUILDER_IMAGE: &str = "docker.io/flashbots/rbuilder";
/// Builder hub image
pub const BUILDER_HUB_IMAGE: &str = "docker.io/flashbots/builder-hub";
/// Postgres image backing the builder hub
pub const POSTGRES_IMAGE: &str = "docker.io/library/postgres";

/// Artifact holding the generated rbuilder configuration
pub const RBUILDER_CONFIG: &str = "rbuilder.toml";

/// Dev account receiving builder payments
const COINBASE_ACCOUNT: usize = 3;
/// Dev account signing relay submissions
const RELAY_ACCOUNT: usize = 4;

/// rbuilder attached to the datadir of a reth node
#[derive(Debug, Clone)]
pub struct Rbuilder {
    /// Reth service whose datadir and IPC socket are shared
    pub execution: String,
    /// Beacon node feeding payload attributes
    pub beacon: String,
    /// Relay receiving blocks
    pub relay: String,
}

impl Default for Rbuilder {
    fn default() -> Self {
        Self {
            execution: "el".to_string(),
            beacon: "beacon".to_string(),
            relay: "mev-boost-relay".to_string(),
        }
    }
}

impl Rbuilder {
    fn config(&self, ctx: &RecipeContext<'_>) -> String {
        let key = |index: usize| {
            ctx.artifacts
                .accounts
                .get(index)
                .map(|account| account.key.to_string())
                .unwrap_or_default()
        };
        format!(
            r#"log_json = false
log_level = "info,rbuilder=debug"
chain = "/data/genesis.json"
reth_datadir = "/data_reth"
el_node_ipc_path = "/data_reth/reth.ipc"
coinbase_secret_key = "{coinbase}"
relay_secret_key = "{relay_key}"
cl_node_url = ["env:CL_NODE_URL"]
jsonrpc_server_ip = "0.0.0.0"
jsonrpc_server_port = 8645
full_telemetry_server_ip = "0.0.0.0"
full_telemetry_server_port = 6060
root_hash_use_sparse_trie = true
root_hash_compare_sparse_trie = false
live_builders = ["mgp-ordering"]

[[relays]]
name = "playground"
url = "http://{relay}:5555"
priority = 0
use_ssz_for_submit = false
use_gzip_for_submit = false

[[builders]]
name = "mgp-ordering"
algo = "ordering-builder"
discard_txs = true
sorting = "mev-gas-price"
failed_order_retries = 1
drop_failed_orders = true
"#,
            coinbase = key(COINBASE_ACCOUNT),
            relay_key = key(RELAY_ACCOUNT),
            relay = self.relay,
        )
    }
}

impl ComponentFactory for Rbuilder {
    fn kind(&self) -> &'static str {
        "rbuilder"
    }

    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service> {
        ctx.artifacts.output.write_file(RBUILDER_CONFIG, self.config(ctx))?;

        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(RBUILDER_IMAGE)
            .with_tag("latest")
            .with_entrypoint("/app/rbuilder")
            .with_args(["run", "/data/rbuilder.toml"])
            .with_env(
                "CL_NODE_URL",
                format!(r#"{{{{Service "{}" "http" "http" ""}}}}"#, self.beacon),
            )
            .with_port("rpc", 8645, Protocol::Tcp)
            .with_port("metrics", 6060, Protocol::Tcp)
            .with_artifact("/data/rbuilder.toml", RBUILDER_CONFIG)
            .with_artifact("/data/genesis.json", GENESIS_FILE)
            .with_volume("/data_reth", Volume::local_bind(format!("{}-data", self.execution)))
            .depends_on_healthy(&self.execution)
            .depends_on_healthy(&self.relay))
    }
}

/// Postgres database of the builder hub
#[derive(Debug, Clone, Default)]
pub struct BuilderHubDb;

impl ComponentFactory for BuilderHubDb {
    fn kind(&self) -> &'static str {
        "builder-hub-db"
    }

    fn build(&self, name: &str, _ctx: &mut RecipeContext<'_>) -> Result<Service> {
        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(POSTGRES_IMAGE)
            .with_tag("16-alpine")
            .with_env("POSTGRES_USER", "postgres")
            .with_env("POSTGRES_PASSWORD", "postgres")
            .with_env("POSTGRES_DB", "postgres")
            .with_port("postgres", 5432, Protocol::Tcp)
            .with_volume("/var/lib/postgresql/data", Volume::shared(format!("{}-data", name)))
            .with_ready_check(
                ReadyCheck::command(["CMD-SHELL", "pg_isready -U postgres -d postgres"])
                    .with_retries(30),
            ))
    }
}

/// Builder hub serving builder identities and configuration
#[derive(Debug, Clone)]
pub struct BuilderHub {
    /// Database service
    pub db: String,
}

impl Default for BuilderHub {
    fn default() -> Self {
        Self { db: "builder-hub-db".to_string() }
    }
}

impl ComponentFactory for BuilderHub {
    fn kind(&self) -> &'static str {
        "builder-hub"
    }

    fn build(&self, name: &str, _ctx: &mut RecipeContext<'_>) -> Result<Service> {
        Ok(Service::new(name)
            .with_component(self.kind())
            .with_image(BUILDER_HUB_IMAGE)
            .with_tag("latest")
            .with_env(
                "POSTGRES_DSN",
                format!(
                    r#"{{{{Service "{}" "postgres" "postgres" "postgres:postgres"}}}}/postgres?sslmode=disable"#,
                    self.db
                ),
            )
            .with_env("LISTEN_ADDR", r#"0.0.0.0:{{Port "http" 8080}}"#)
            .with_env("ADMIN_ADDR", r#"0.0.0.0:{{Port "admin" 8081}}"#)
            .with_env("INTERNAL_ADDR", r#"0.0.0.0:{{Port "internal" 8082}}"#)
            .with_env("METRICS_ADDR", r#"0.0.0.0:{{Port "metrics" 8090}}"#)
            .with_env("MOCK_SECRETS", "true")
            .with_env("LOG_JSON", "false")
            .depends_on_healthy(&self.db)
            .with_ready_check(ReadyCheck::nc("http://localhost:8080")))
    }
}

