//! OP-stack L2 genesis and rollup config.
//!
//! Both documents start from a template (embedded, or a user-supplied path)
//! and are patched in place as JSON so fields this crate does not model
//! survive untouched. The typed [`Genesis`] view is only used to compute the
//! genesis block hash.

use crate::accounts::PrefundedAccount;
use crate::el::{account_storage_root, genesis_header, prefunded_balance};
use crate::{Error, Result};
use alloy::primitives::{Address, B256, address};
use alloy_genesis::Genesis;
use playground_manifest::Output;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

const L2_GENESIS_TEMPLATE: &str = include_str!("../templates/l2-genesis.json");
const ROLLUP_TEMPLATE: &str = include_str!("../templates/rollup.json");

/// L2 genesis file name
pub const L2_GENESIS_FILE: &str = "l2-genesis.json";
/// Rollup config file name
pub const ROLLUP_FILE: &str = "rollup.json";

/// Seconds between the L1 and the L2 genesis
pub const L2_GENESIS_OFFSET: u64 = 2;

/// Default L2 block time in seconds
pub const DEFAULT_L2_BLOCK_TIME: u64 = 2;

/// The message passer whose storage root becomes the genesis withdrawals root
pub const L2_TO_L1_MESSAGE_PASSER: Address = address!("4200000000000000000000000000000000000016");

const EIP1559_ELASTICITY: u64 = 6;
const EIP1559_DENOMINATOR: u64 = 50;
const EIP1559_DENOMINATOR_CANYON: u64 = 250;

/// Which OP forks are active and when
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum L2ForkMode {
    /// Isthmus at genesis, Jovian disabled
    Isthmus,
    /// Jovian at genesis
    JovianAtGenesis,
    /// Isthmus at genesis, Jovian after this many L2 blocks
    JovianAfter(u64),
}

impl L2ForkMode {
    /// Map the optional "latest fork" block count onto a mode
    pub fn from_latest_fork(latest_fork: Option<u64>) -> Self {
        match latest_fork {
            None => Self::Isthmus,
            Some(0) => Self::JovianAtGenesis,
            Some(n) => Self::JovianAfter(n),
        }
    }

    /// Jovian activation timestamp, if any
    pub fn jovian_time(&self, l2_genesis_time: u64, block_time: u64) -> Option<u64> {
        match self {
            Self::Isthmus => None,
            Self::JovianAtGenesis => Some(0),
            Self::JovianAfter(n) => Some(l2_genesis_time + block_time * n),
        }
    }

    /// Genesis `extraData`: the Holocene layout, or the Jovian one carrying
    /// a zero minimum base fee
    fn extra_data(&self) -> String {
        let mut data = vec![if *self == Self::JovianAtGenesis { 1u8 } else { 0u8 }];
        data.extend_from_slice(&(EIP1559_DENOMINATOR_CANYON as u32).to_be_bytes());
        data.extend_from_slice(&(EIP1559_ELASTICITY as u32).to_be_bytes());
        if *self == Self::JovianAtGenesis {
            data.extend_from_slice(&0u64.to_be_bytes());
        }
        alloy::primitives::hex::encode_prefixed(data)
    }
}

/// L2 chain settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Config {
    /// Seconds per L2 block
    pub block_time: u64,
    /// Fork mode
    pub fork_mode: L2ForkMode,
    /// JSON file mapping addresses to extra genesis accounts
    pub predeploys: Option<PathBuf>,
    /// Replacement for the embedded L2 genesis template
    pub genesis_template: Option<PathBuf>,
    /// Replacement for the embedded rollup config template
    pub rollup_template: Option<PathBuf>,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            block_time: DEFAULT_L2_BLOCK_TIME,
            fork_mode: L2ForkMode::Isthmus,
            predeploys: None,
            genesis_template: None,
            rollup_template: None,
        }
    }
}

impl L2Config {
    /// Set the block time
    pub fn with_block_time(mut self, block_time: u64) -> Self {
        self.block_time = block_time;
        self
    }

    /// Set the fork mode from the optional "latest fork" block count
    pub fn with_latest_fork(mut self, latest_fork: Option<u64>) -> Self {
        self.fork_mode = L2ForkMode::from_latest_fork(latest_fork);
        self
    }

    /// Merge predeploys from a JSON file
    pub fn with_predeploys(mut self, path: impl Into<PathBuf>) -> Self {
        self.predeploys = Some(path.into());
        self
    }

    /// Use a custom L2 genesis template
    pub fn with_genesis_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.genesis_template = Some(path.into());
        self
    }

    /// Use a custom rollup config template
    pub fn with_rollup_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.rollup_template = Some(path.into());
        self
    }
}

/// Facts about the generated L2 chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Info {
    /// Chain id from the template
    pub chain_id: u64,
    /// L2 genesis timestamp
    pub genesis_time: u64,
    /// L2 genesis block hash
    pub genesis_hash: B256,
    /// Seconds per block
    pub block_time: u64,
    /// Isthmus activation timestamp
    pub isthmus_time: u64,
    /// Jovian activation timestamp
    pub jovian_time: Option<u64>,
}

fn load_template(path: Option<&Path>, embedded: &str) -> Result<Value> {
    match path {
        Some(path) => {
            let data = std::fs::read(path)?;
            serde_json::from_slice(&data)
                .map_err(|e| Error::Genesis(format!("invalid template {}: {}", path.display(), e)))
        }
        None => Ok(serde_json::from_str(embedded)?),
    }
}

fn object_mut<'a>(value: &'a mut Value, what: &str) -> Result<&'a mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| Error::Genesis(format!("{} is not a JSON object", what)))
}

fn parse_alloc(value: Value, what: &str) -> Result<BTreeMap<Address, Value>> {
    let Value::Object(entries) = value else {
        return Err(Error::Genesis(format!("{} is not a JSON object", what)));
    };
    entries
        .into_iter()
        .map(|(key, account)| {
            let address = Address::from_str(&key)
                .map_err(|_| Error::Genesis(format!("invalid address '{}' in {}", key, what)))?;
            Ok((address, account))
        })
        .collect()
}

/// Merge prefunded accounts and predeploys into the template allocation.
///
/// A predeploy may not replace a template account.
pub fn merge_allocs(
    template: BTreeMap<Address, Value>,
    accounts: &[PrefundedAccount],
    predeploys: BTreeMap<Address, Value>,
) -> Result<BTreeMap<Address, Value>> {
    let mut alloc = template;
    for (address, account) in predeploys {
        if alloc.contains_key(&address) {
            return Err(Error::PredeployConflict(address.to_string()));
        }
        alloc.insert(address, account);
    }
    for account in accounts {
        alloc.insert(
            account.address,
            json!({ "balance": format!("{:#x}", prefunded_balance()) }),
        );
    }
    Ok(alloc)
}

/// Generate `l2-genesis.json` and `rollup.json`
pub fn build_l2(
    config: &L2Config,
    l1_genesis_time: u64,
    l1_genesis_hash: B256,
    accounts: &[PrefundedAccount],
    output: &Output,
) -> Result<L2Info> {
    let genesis_time = l1_genesis_time + L2_GENESIS_OFFSET;
    let jovian_time = config.fork_mode.jovian_time(genesis_time, config.block_time);

    let mut genesis = load_template(config.genesis_template.as_deref(), L2_GENESIS_TEMPLATE)?;
    let doc = object_mut(&mut genesis, "L2 genesis")?;
    let template_alloc = parse_alloc(doc.remove("alloc").unwrap_or(json!({})), "L2 genesis alloc")?;
    let predeploys = match &config.predeploys {
        Some(path) => {
            let data = std::fs::read(path)?;
            let value: Value = serde_json::from_slice(&data).map_err(|e| {
                Error::Genesis(format!("invalid predeploys file {}: {}", path.display(), e))
            })?;
            parse_alloc(value, "predeploys")?
        }
        None => BTreeMap::new(),
    };
    let alloc = merge_allocs(template_alloc, accounts, predeploys)?;

    doc.insert("timestamp".to_string(), json!(format!("{:#x}", genesis_time)));
    doc.insert("extraData".to_string(), json!(config.fork_mode.extra_data()));
    doc.insert("alloc".to_string(), serde_json::to_value(&alloc)?);

    let chain = object_mut(
        doc.get_mut("config")
            .ok_or_else(|| Error::Genesis("L2 genesis template has no config".to_string()))?,
        "L2 genesis config",
    )?;
    chain.insert("isthmusTime".to_string(), json!(0));
    match jovian_time {
        Some(t) => chain.insert("jovianTime".to_string(), json!(t)),
        None => chain.remove("jovianTime"),
    };
    chain.insert(
        "optimism".to_string(),
        json!({
            "eip1559Elasticity": EIP1559_ELASTICITY,
            "eip1559Denominator": EIP1559_DENOMINATOR,
            "eip1559DenominatorCanyon": EIP1559_DENOMINATOR_CANYON,
        }),
    );

    let typed: Genesis = serde_json::from_value(genesis.clone())
        .map_err(|e| Error::Genesis(format!("L2 genesis does not parse: {}", e)))?;
    let withdrawals_root = account_storage_root(typed.alloc.get(&L2_TO_L1_MESSAGE_PASSER));
    let genesis_hash = genesis_header(&typed, withdrawals_root).hash_slow();
    debug!("L2 genesis hash {} with {} accounts", genesis_hash, typed.alloc.len());

    let mut rollup = load_template(config.rollup_template.as_deref(), ROLLUP_TEMPLATE)?;
    let doc = object_mut(&mut rollup, "rollup config")?;
    let template_genesis = doc.remove("genesis");
    doc.insert(
        "genesis".to_string(),
        rollup_genesis(template_genesis, l1_genesis_hash, genesis_hash, genesis_time),
    );
    doc.insert("block_time".to_string(), json!(config.block_time));
    doc.insert("l1_chain_id".to_string(), json!(crate::el::L1_CHAIN_ID));
    doc.insert("l2_chain_id".to_string(), json!(typed.config.chain_id));
    doc.insert("isthmus_time".to_string(), json!(0));
    match jovian_time {
        Some(t) => doc.insert("jovian_time".to_string(), json!(t)),
        None => doc.remove("jovian_time"),
    };
    doc.insert(
        "chain_op_config".to_string(),
        json!({
            "eip1559Elasticity": EIP1559_ELASTICITY,
            "eip1559Denominator": EIP1559_DENOMINATOR,
            "eip1559DenominatorCanyon": EIP1559_DENOMINATOR_CANYON,
        }),
    );

    output.write_json(L2_GENESIS_FILE, &genesis)?;
    output.write_json(ROLLUP_FILE, &rollup)?;

    info!(
        "L2 genesis at {} (chain {}, jovian {})",
        genesis_time,
        typed.config.chain_id,
        jovian_time.map(|t| t.to_string()).unwrap_or_else(|| "disabled".to_string())
    );

    Ok(L2Info {
        chain_id: typed.config.chain_id,
        genesis_time,
        genesis_hash,
        block_time: config.block_time,
        isthmus_time: 0,
        jovian_time,
    })
}

fn rollup_genesis(existing: Option<Value>, l1_hash: B256, l2_hash: B256, l2_time: u64) -> Value {
    let mut genesis = match existing {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    genesis.insert("l1".to_string(), json!({ "hash": l1_hash, "number": 0 }));
    genesis.insert("l2".to_string(), json!({ "hash": l2_hash, "number": 0 }));
    genesis.insert("l2_time".to_string(), json!(l2_time));
    Value::Object(genesis)
}
