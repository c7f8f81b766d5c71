//! Execution-layer genesis.

use crate::accounts::PrefundedAccount;
use crate::{Error, Result};
use alloy::consensus::Header;
use alloy::eips::eip7685::EMPTY_REQUESTS_HASH;
use alloy::primitives::{Address, B256, KECCAK256_EMPTY, U256, address, b256, keccak256};
use alloy_genesis::{ChainConfig, Genesis, GenesisAccount};
use alloy_trie::root::{state_root_unhashed, storage_root_unhashed};
use alloy_trie::{EMPTY_ROOT_HASH, TrieAccount};
use std::collections::BTreeMap;
use std::path::Path;

/// Chain id of the L1 devnet
pub const L1_CHAIN_ID: u64 = 1337;

/// Address of the beacon deposit contract
pub const DEPOSIT_CONTRACT_ADDRESS: Address = address!("4242424242424242424242424242424242424242");

/// Genesis gas limit
pub const GENESIS_GAS_LIMIT: u64 = 30_000_000;

/// Genesis base fee (1 gwei)
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// Keccak of the RLP empty list, the ommers hash of every post-merge block
pub const EMPTY_OMMERS_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// Balance credited to every prefunded account (10^27 wei)
pub fn prefunded_balance() -> U256 {
    U256::from(10u64).pow(U256::from(27u64))
}

/// Build the L1 genesis document.
///
/// Every fork up to Prague is active from genesis; Osaka joins when
/// `latest_fork` is set.
pub fn l1_genesis(
    genesis_time: u64,
    accounts: &[PrefundedAccount],
    latest_fork: bool,
    alloc_template: Option<&Path>,
) -> Result<Genesis> {
    let mut alloc: BTreeMap<Address, GenesisAccount> = match alloc_template {
        Some(path) => {
            let data = std::fs::read(path)?;
            serde_json::from_slice(&data).map_err(|e| {
                Error::Genesis(format!("invalid alloc template {}: {}", path.display(), e))
            })?
        }
        None => BTreeMap::new(),
    };

    for account in accounts {
        alloc.insert(
            account.address,
            GenesisAccount {
                balance: prefunded_balance(),
                nonce: Some(1),
                ..Default::default()
            },
        );
    }

    let config = ChainConfig {
        chain_id: L1_CHAIN_ID,
        homestead_block: Some(0),
        eip150_block: Some(0),
        eip155_block: Some(0),
        eip158_block: Some(0),
        byzantium_block: Some(0),
        constantinople_block: Some(0),
        petersburg_block: Some(0),
        istanbul_block: Some(0),
        berlin_block: Some(0),
        london_block: Some(0),
        shanghai_time: Some(0),
        cancun_time: Some(0),
        prague_time: Some(0),
        osaka_time: latest_fork.then_some(0),
        terminal_total_difficulty: Some(U256::ZERO),
        terminal_total_difficulty_passed: true,
        deposit_contract_address: Some(DEPOSIT_CONTRACT_ADDRESS),
        ..Default::default()
    };

    Ok(Genesis {
        config,
        nonce: 0,
        timestamp: genesis_time,
        gas_limit: GENESIS_GAS_LIMIT,
        difficulty: U256::ZERO,
        base_fee_per_gas: Some(INITIAL_BASE_FEE as u128),
        excess_blob_gas: Some(0),
        blob_gas_used: Some(0),
        alloc,
        ..Default::default()
    })
}

fn trie_account(account: &GenesisAccount) -> TrieAccount {
    let storage_root = match &account.storage {
        Some(storage) => storage_root_unhashed(
            storage
                .iter()
                .filter(|(_, value)| !value.is_zero())
                .map(|(slot, value)| (*slot, U256::from_be_bytes(value.0))),
        ),
        None => EMPTY_ROOT_HASH,
    };
    TrieAccount {
        nonce: account.nonce.unwrap_or_default(),
        balance: account.balance,
        storage_root,
        code_hash: account.code.as_ref().map(keccak256).unwrap_or(KECCAK256_EMPTY),
    }
}

/// State root of a genesis allocation
pub fn state_root(alloc: &BTreeMap<Address, GenesisAccount>) -> B256 {
    state_root_unhashed(alloc.iter().map(|(address, account)| (*address, trie_account(account))))
}

/// Storage root of a single genesis account
pub fn account_storage_root(account: Option<&GenesisAccount>) -> B256 {
    account.map(|a| trie_account(a).storage_root).unwrap_or(EMPTY_ROOT_HASH)
}

/// Genesis block header for a Prague-era chain.
///
/// `withdrawals_root` is the empty root on L1; OP chains from Isthmus on
/// commit to the message passer's storage root instead.
pub fn genesis_header(genesis: &Genesis, withdrawals_root: B256) -> Header {
    Header {
        parent_hash: B256::ZERO,
        ommers_hash: EMPTY_OMMERS_HASH,
        beneficiary: genesis.coinbase,
        state_root: state_root(&genesis.alloc),
        transactions_root: EMPTY_ROOT_HASH,
        receipts_root: EMPTY_ROOT_HASH,
        difficulty: genesis.difficulty,
        number: genesis.number.unwrap_or_default(),
        gas_limit: genesis.gas_limit,
        gas_used: 0,
        timestamp: genesis.timestamp,
        extra_data: genesis.extra_data.clone(),
        mix_hash: genesis.mix_hash,
        nonce: genesis.nonce.into(),
        base_fee_per_gas: Some(
            genesis
                .base_fee_per_gas
                .map(|fee| fee as u64)
                .unwrap_or(INITIAL_BASE_FEE),
        ),
        withdrawals_root: Some(withdrawals_root),
        blob_gas_used: Some(genesis.blob_gas_used.unwrap_or_default()),
        excess_blob_gas: Some(genesis.excess_blob_gas.unwrap_or_default()),
        parent_beacon_block_root: Some(B256::ZERO),
        requests_hash: Some(EMPTY_REQUESTS_HASH),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::prefunded_accounts;

    #[test]
    fn test_prefunded_allocs() {
        let accounts = prefunded_accounts(&[]).unwrap();
        let genesis = l1_genesis(1_700_000_000, &accounts, false, None).unwrap();
        assert_eq!(genesis.alloc.len(), 10);
        let account = &genesis.alloc[&accounts[0].address];
        assert_eq!(account.nonce, Some(1));
        assert_eq!(account.balance, prefunded_balance());
        assert_eq!(genesis.config.osaka_time, None);

        let latest = l1_genesis(1_700_000_000, &accounts, true, None).unwrap();
        assert_eq!(latest.config.osaka_time, Some(0));
    }

    #[test]
    fn test_empty_state_root() {
        assert_eq!(state_root(&BTreeMap::new()), EMPTY_ROOT_HASH);
    }

    #[test]
    fn test_header_tracks_timestamp() {
        let accounts = prefunded_accounts(&[]).unwrap();
        let a = l1_genesis(100, &accounts, false, None).unwrap();
        let b = l1_genesis(101, &accounts, false, None).unwrap();
        let ha = genesis_header(&a, EMPTY_ROOT_HASH);
        assert_eq!(ha.hash_slow(), genesis_header(&a, EMPTY_ROOT_HASH).hash_slow());
        assert_ne!(ha.hash_slow(), genesis_header(&b, EMPTY_ROOT_HASH).hash_slow());
        assert_eq!(ha.state_root, genesis_header(&b, EMPTY_ROOT_HASH).state_root);
    }
}
