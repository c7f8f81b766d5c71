//! # Playground artifacts
//!
//! Genesis material for a playground session: the L1 execution genesis, the
//! consensus config and pre-mined beacon state, validator keystores, the
//! shared JWT secret and, when an L2 is configured, the OP-stack genesis and
//! rollup config.
//!
//! ```rust,no_run
//! use playground_artifacts::ArtifactsBuilder;
//! use playground_manifest::Output;
//!
//! # fn example() -> playground_artifacts::Result<()> {
//! let output = Output::new("/tmp/session")?;
//! let artifacts = ArtifactsBuilder::new()
//!     .with_block_time(2)
//!     .with_genesis_time(1_700_000_000)
//!     .build(&output)?;
//! println!("L1 genesis {}", artifacts.l1_genesis_hash);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod accounts;
pub mod cl;
pub mod el;
mod enode;
mod error;
pub mod keystore;
pub mod l2;

pub use accounts::{PrefundedAccount, prefunded_accounts};
pub use enode::{Enode, EnodeManager};
pub use error::{Error, Result};
pub use l2::{L2Config, L2ForkMode, L2Info};

use alloy::primitives::{B256, b256, hex};
use alloy_trie::EMPTY_ROOT_HASH;
use cl::config::ChainSpec;
use cl::keys::interop_keys;
use cl::state::{GenesisInput, genesis_state};
use keystore::{KEYSTORE_PASSWORD, Keystore};
use playground_manifest::Output;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Shared engine API secret
pub const JWT_SECRET: B256 =
    b256!("04592280e1778419b7aa954d43871cb2cfb2ebda754fb735e8adeb293a88f9bf");

/// Engine API secret file
pub const JWT_FILE: &str = "jwtsecret";
/// Execution genesis file
pub const GENESIS_FILE: &str = "genesis.json";
/// Directory of consensus testnet files
pub const TESTNET_DIR: &str = "testnet";
/// Directory of validator keystores and secrets
pub const VALIDATOR_DATA_DIR: &str = "data_validator";

/// Smallest accepted genesis delay in seconds
pub const MIN_GENESIS_DELAY: u64 = 10;
/// Default L1 block time in seconds
pub const DEFAULT_BLOCK_TIME: u64 = 12;

/// Configures and generates the genesis artifacts of a session
#[derive(Debug, Clone)]
pub struct ArtifactsBuilder {
    genesis_delay: u64,
    genesis_time: Option<u64>,
    block_time: u64,
    latest_fork: bool,
    prefunded_keys: Vec<String>,
    l1_alloc_template: Option<PathBuf>,
    l2: Option<L2Config>,
}

impl Default for ArtifactsBuilder {
    fn default() -> Self {
        Self {
            genesis_delay: MIN_GENESIS_DELAY,
            genesis_time: None,
            block_time: DEFAULT_BLOCK_TIME,
            latest_fork: false,
            prefunded_keys: Vec::new(),
            l1_alloc_template: None,
            l2: None,
        }
    }
}

impl ArtifactsBuilder {
    /// Builder with defaults: 10 s delay, 12 s blocks, no L2
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds between now and genesis, at least [`MIN_GENESIS_DELAY`]
    pub fn with_genesis_delay(mut self, delay: u64) -> Self {
        if delay < MIN_GENESIS_DELAY {
            warn!("Genesis delay {}s raised to {}s", delay, MIN_GENESIS_DELAY);
        }
        self.genesis_delay = delay.max(MIN_GENESIS_DELAY);
        self
    }

    /// Pin the genesis time, making the output reproducible
    pub fn with_genesis_time(mut self, genesis_time: u64) -> Self {
        self.genesis_time = Some(genesis_time);
        self
    }

    /// L1 seconds per slot
    pub fn with_block_time(mut self, block_time: u64) -> Self {
        self.block_time = block_time;
        self
    }

    /// Activate the newest L1 forks (Osaka/Fulu) at genesis
    pub fn with_latest_fork(mut self, latest_fork: bool) -> Self {
        self.latest_fork = latest_fork;
        self
    }

    /// Prefund an additional account
    pub fn with_prefunded_key(mut self, key: impl Into<String>) -> Self {
        self.prefunded_keys.push(key.into());
        self
    }

    /// Seed the L1 allocation from a JSON file (system contracts, deployments)
    pub fn with_l1_alloc_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.l1_alloc_template = Some(path.into());
        self
    }

    /// Generate an L2 chain as well
    pub fn with_l2(mut self, l2: L2Config) -> Self {
        self.l2 = Some(l2);
        self
    }

    /// Effective genesis delay
    pub fn genesis_delay(&self) -> u64 {
        self.genesis_delay
    }

    /// L1 block time
    pub fn block_time(&self) -> u64 {
        self.block_time
    }

    /// Whether the latest L1 forks are active
    pub fn latest_fork(&self) -> bool {
        self.latest_fork
    }

    /// The L2 settings, if an L2 is configured
    pub fn l2(&self) -> Option<&L2Config> {
        self.l2.as_ref()
    }

    fn resolve_genesis_time(&self) -> u64 {
        self.genesis_time.unwrap_or_else(|| {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            now + self.genesis_delay
        })
    }

    /// Generate every artifact into `output`
    pub fn build(&self, output: &Output) -> Result<Artifacts> {
        let genesis_time = self.resolve_genesis_time();
        let accounts = prefunded_accounts(&self.prefunded_keys)?;
        info!(
            "Building genesis at {} ({} prefunded accounts, latest fork {})",
            genesis_time,
            accounts.len(),
            self.latest_fork
        );

        let genesis = el::l1_genesis(
            genesis_time,
            &accounts,
            self.latest_fork,
            self.l1_alloc_template.as_deref(),
        )?;
        let header = el::genesis_header(&genesis, EMPTY_ROOT_HASH);
        let l1_genesis_hash = header.hash_slow();
        output.write_json(GENESIS_FILE, &genesis)?;
        output.write_file(JWT_FILE, hex::encode_prefixed(JWT_SECRET))?;

        let keys = interop_keys(cl::VALIDATOR_COUNT)?;
        let state = genesis_state(&GenesisInput {
            genesis_time,
            keys: &keys,
            withdrawal_address: accounts[0].address,
            execution_header: &header,
            fulu: self.latest_fork,
        })?;
        let chain_spec = ChainSpec {
            genesis_time,
            seconds_per_slot: self.block_time,
            latest_fork: self.latest_fork,
        };

        let testnet = |name: &str| format!("{}/{}", TESTNET_DIR, name);
        output.write_file(testnet("config.yaml"), chain_spec.to_yaml())?;
        output.write_file(testnet("genesis.ssz"), &state.ssz)?;
        output.write_file(testnet("boot_enr.yaml"), "[]")?;
        output.write_file(testnet("deploy_block.txt"), "0")?;
        output.write_file(testnet("deposit_contract_block.txt"), "0")?;
        output.write_file(
            testnet("genesis_validators_root.txt"),
            hex::encode_prefixed(state.genesis_validators_root),
        )?;
        debug!("Beacon genesis state root {}", state.state_root);

        for key in &keys {
            let pubkey = key.pubkey_hex();
            let path = format!("m/12381/3600/{}/0/0", key.index);
            let keystore = Keystore::encrypt(&key.secret, &key.pubkey, KEYSTORE_PASSWORD, path)?;
            output.write_json(
                format!("{}/validators/{}/voting-keystore.json", VALIDATOR_DATA_DIR, pubkey),
                &keystore,
            )?;
            output.write_file(
                format!("{}/secrets/{}", VALIDATOR_DATA_DIR, pubkey),
                KEYSTORE_PASSWORD,
            )?;
        }
        info!("Wrote {} validator keystores", keys.len());

        let l2 = match &self.l2 {
            Some(config) => Some(l2::build_l2(config, genesis_time, l1_genesis_hash, &accounts, output)?),
            None => None,
        };

        Ok(Artifacts {
            output: output.clone(),
            genesis_time,
            block_time: self.block_time,
            l1_genesis_hash,
            genesis_validators_root: state.genesis_validators_root,
            l2,
            accounts,
            enodes: EnodeManager::new(),
        })
    }
}

/// Generated genesis material, handed to recipes when they build services
#[derive(Debug)]
pub struct Artifacts {
    /// Session directory holding the files
    pub output: Output,
    /// L1 genesis time
    pub genesis_time: u64,
    /// L1 seconds per slot
    pub block_time: u64,
    /// L1 genesis block hash
    pub l1_genesis_hash: B256,
    /// Root of the genesis validator registry
    pub genesis_validators_root: B256,
    /// L2 chain, when generated
    pub l2: Option<L2Info>,
    /// Prefunded accounts
    pub accounts: Vec<PrefundedAccount>,
    /// Node identities issued to services
    pub enodes: EnodeManager,
}

impl Artifacts {
    /// Issue the next node identity and write its key file
    pub fn next_enode(&mut self) -> Result<Enode> {
        self.enodes.next_enode(&self.output)
    }
}
