//! Genesis beacon state.
//!
//! Builds an Electra (or Fulu) `BeaconState` with every interop validator
//! active from epoch 0, anchored to the execution genesis block. Only the
//! mainnet preset is supported.

use super::keys::{ValidatorKey, aggregate_pubkeys};
use super::shuffle::{
    DOMAIN_BEACON_PROPOSER, DOMAIN_SYNC_COMMITTEE, proposer_index, seed, sync_committee_indices,
};
use super::ssz::{
    Chunk, ContainerEncoder, bytes_root, container_root, empty_list_root, hash2, list_root,
    merkleize, mix_in_length, pack_bytes, sha256, u64_root, zero_hash,
};
use super::{
    ELECTRA_FORK_VERSION, FAR_FUTURE_EPOCH, FULU_FORK_VERSION, GENESIS_FORK_VERSION,
    SLOTS_PER_EPOCH, VALIDATOR_BALANCE,
};
use crate::Result;
use alloy::consensus::Header;
use alloy::primitives::{Address, B256};
use tracing::debug;

const SLOTS_PER_HISTORICAL_ROOT: usize = 8192;
const EPOCHS_PER_HISTORICAL_VECTOR: usize = 65536;
const EPOCHS_PER_SLASHINGS_VECTOR: usize = 8192;
const HISTORICAL_ROOTS_LIMIT: usize = 1 << 24;
const ETH1_DATA_VOTES_LIMIT: usize = 64 * SLOTS_PER_EPOCH as usize;
const VALIDATOR_REGISTRY_LIMIT: usize = 1 << 40;
const DEPOSIT_TREE_LIMIT: usize = 1 << 32;
const SYNC_COMMITTEE_SIZE: usize = 512;
const PENDING_DEPOSITS_LIMIT: usize = 1 << 27;
const PENDING_PARTIAL_WITHDRAWALS_LIMIT: usize = 1 << 27;
const PENDING_CONSOLIDATIONS_LIMIT: usize = 1 << 18;
const MAX_TRANSACTIONS_PER_PAYLOAD: usize = 1 << 20;
const MAX_WITHDRAWALS_PER_PAYLOAD: usize = 16;
const MIN_SEED_LOOKAHEAD: u64 = 1;
const UNSET_DEPOSIT_REQUESTS_START_INDEX: u64 = u64::MAX;

/// Domain of deposit signatures
pub const DOMAIN_DEPOSIT: [u8; 4] = [0x03, 0x00, 0x00, 0x00];

/// Inputs of the genesis state
#[derive(Debug)]
pub struct GenesisInput<'a> {
    /// Genesis time, equal to the execution genesis timestamp
    pub genesis_time: u64,
    /// Validator keys, in index order
    pub keys: &'a [ValidatorKey],
    /// Execution address receiving withdrawals of every validator
    pub withdrawal_address: Address,
    /// Execution genesis block header
    pub execution_header: &'a Header,
    /// Start in Fulu rather than Electra
    pub fulu: bool,
}

/// A serialized genesis state and its roots
#[derive(Debug, Clone)]
pub struct GenesisState {
    /// SSZ bytes of the state
    pub ssz: Vec<u8>,
    /// Root of the validator registry
    pub genesis_validators_root: B256,
    /// Root of the state
    pub state_root: B256,
}

fn fixed_chunk(bytes: &[u8]) -> Chunk {
    let mut chunk = [0u8; 32];
    chunk[..bytes.len()].copy_from_slice(bytes);
    chunk
}

/// Root of a vector of `2^depth` identical chunks
fn uniform_vector_root(leaf: Chunk, depth: usize) -> Chunk {
    (0..depth).fold(leaf, |node, _| hash2(&node, &node))
}

fn u64_list_root(values: &[u64], limit: usize) -> Chunk {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    mix_in_length(&merkleize(&pack_bytes(&bytes), limit * 8 / 32), values.len())
}

fn u64_vector_root(values: &[u64]) -> Chunk {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    bytes_root(&bytes)
}

fn compute_domain(domain_type: [u8; 4], fork_version: [u8; 4], genesis_validators_root: Chunk) -> Chunk {
    let fork_data_root = hash2(&fixed_chunk(&fork_version), &genesis_validators_root);
    let mut domain = [0u8; 32];
    domain[..4].copy_from_slice(&domain_type);
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    domain
}

fn signing_root(object_root: Chunk, domain: Chunk) -> Chunk {
    hash2(&object_root, &domain)
}

fn checkpoint_root(epoch: u64, root: Chunk) -> Chunk {
    hash2(&u64_root(epoch), &root)
}

struct Validator {
    pubkey: [u8; 48],
    withdrawal_credentials: Chunk,
    effective_balance: u64,
}

impl Validator {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.pubkey);
        out.extend_from_slice(&self.withdrawal_credentials);
        out.extend_from_slice(&self.effective_balance.to_le_bytes());
        out.push(0);
        for epoch in [0, 0, FAR_FUTURE_EPOCH, FAR_FUTURE_EPOCH] {
            out.extend_from_slice(&u64::to_le_bytes(epoch));
        }
    }

    fn root(&self) -> Chunk {
        container_root(&[
            bytes_root(&self.pubkey),
            self.withdrawal_credentials,
            u64_root(self.effective_balance),
            [0u8; 32],
            u64_root(0),
            u64_root(0),
            u64_root(FAR_FUTURE_EPOCH),
            u64_root(FAR_FUTURE_EPOCH),
        ])
    }
}

/// Root of a signed deposit for `key`
fn deposit_data_root(key: &ValidatorKey, withdrawal_credentials: Chunk, amount: u64) -> Chunk {
    let pubkey_root = bytes_root(&key.pubkey);
    let message_root = container_root(&[pubkey_root, withdrawal_credentials, u64_root(amount)]);
    let domain = compute_domain(DOMAIN_DEPOSIT, GENESIS_FORK_VERSION, [0u8; 32]);
    let signature = key.sign(&signing_root(message_root, domain));
    container_root(&[
        pubkey_root,
        withdrawal_credentials,
        u64_root(amount),
        bytes_root(&signature),
    ])
}

/// Root of a default `ExecutionPayload`
fn empty_payload_root() -> Chunk {
    container_root(&[
        [0u8; 32],
        [0u8; 32],
        [0u8; 32],
        [0u8; 32],
        zero_hash(3),
        [0u8; 32],
        u64_root(0),
        u64_root(0),
        u64_root(0),
        u64_root(0),
        empty_list_root(1),
        [0u8; 32],
        [0u8; 32],
        empty_list_root(MAX_TRANSACTIONS_PER_PAYLOAD),
        empty_list_root(MAX_WITHDRAWALS_PER_PAYLOAD),
        u64_root(0),
        u64_root(0),
    ])
}

/// Root of a default Electra `BeaconBlockBody`
fn empty_body_root() -> Chunk {
    let execution_requests =
        container_root(&[empty_list_root(8192), empty_list_root(16), empty_list_root(2)]);
    container_root(&[
        zero_hash(2),
        zero_hash(2),
        [0u8; 32],
        empty_list_root(16),
        empty_list_root(1),
        empty_list_root(8),
        empty_list_root(16),
        empty_list_root(16),
        hash2(&zero_hash(1), &zero_hash(2)),
        empty_payload_root(),
        empty_list_root(16),
        empty_list_root(4096),
        execution_requests,
    ])
}

struct PayloadHeader {
    bytes: Vec<u8>,
    root: Chunk,
}

fn payload_header(header: &Header) -> PayloadHeader {
    let base_fee = alloy::primitives::U256::from(header.base_fee_per_gas.unwrap_or_default());
    let base_fee: [u8; 32] = base_fee.to_le_bytes();
    let block_hash = header.hash_slow();
    let transactions_root = empty_list_root(MAX_TRANSACTIONS_PER_PAYLOAD);
    let withdrawals_root = empty_list_root(MAX_WITHDRAWALS_PER_PAYLOAD);
    let extra_data = header.extra_data.as_ref();
    let blob_gas_used = header.blob_gas_used.unwrap_or_default();
    let excess_blob_gas = header.excess_blob_gas.unwrap_or_default();

    let mut enc = ContainerEncoder::new();
    enc.fixed(header.parent_hash)
        .fixed(header.beneficiary)
        .fixed(header.state_root)
        .fixed(header.receipts_root)
        .fixed(header.logs_bloom)
        .fixed(header.mix_hash)
        .u64(header.number)
        .u64(header.gas_limit)
        .u64(header.gas_used)
        .u64(header.timestamp)
        .variable(extra_data.to_vec())
        .fixed(base_fee)
        .fixed(block_hash)
        .fixed(transactions_root)
        .fixed(withdrawals_root)
        .u64(blob_gas_used)
        .u64(excess_blob_gas);

    let root = container_root(&[
        header.parent_hash.0,
        fixed_chunk(header.beneficiary.as_slice()),
        header.state_root.0,
        header.receipts_root.0,
        bytes_root(header.logs_bloom.as_slice()),
        header.mix_hash.0,
        u64_root(header.number),
        u64_root(header.gas_limit),
        u64_root(header.gas_used),
        u64_root(header.timestamp),
        mix_in_length(&merkleize(&pack_bytes(extra_data), 1), extra_data.len()),
        base_fee,
        block_hash.0,
        transactions_root,
        withdrawals_root,
        u64_root(blob_gas_used),
        u64_root(excess_blob_gas),
    ]);
    PayloadHeader { bytes: enc.finish(), root }
}

struct SyncCommittee {
    pubkeys: Vec<[u8; 48]>,
    aggregate: [u8; 48],
}

impl SyncCommittee {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(48 * (self.pubkeys.len() + 1));
        for pk in &self.pubkeys {
            out.extend_from_slice(pk);
        }
        out.extend_from_slice(&self.aggregate);
        out
    }

    fn root(&self) -> Chunk {
        let roots: Vec<Chunk> = self.pubkeys.iter().map(|pk| bytes_root(pk)).collect();
        container_root(&[merkleize(&roots, SYNC_COMMITTEE_SIZE), bytes_root(&self.aggregate)])
    }
}

/// Build the genesis state
pub fn genesis_state(input: &GenesisInput<'_>) -> Result<GenesisState> {
    let count = input.keys.len();
    let mut withdrawal_credentials = [0u8; 32];
    withdrawal_credentials[0] = 0x01;
    withdrawal_credentials[12..].copy_from_slice(input.withdrawal_address.as_slice());

    let validators: Vec<Validator> = input
        .keys
        .iter()
        .map(|key| Validator {
            pubkey: key.pubkey,
            withdrawal_credentials,
            effective_balance: VALIDATOR_BALANCE,
        })
        .collect();
    let validator_roots: Vec<Chunk> = validators.iter().map(Validator::root).collect();
    let genesis_validators_root = list_root(&validator_roots, VALIDATOR_REGISTRY_LIMIT);

    let deposit_roots: Vec<Chunk> = input
        .keys
        .iter()
        .map(|key| deposit_data_root(key, withdrawal_credentials, VALIDATOR_BALANCE))
        .collect();
    let deposit_root = list_root(&deposit_roots, DEPOSIT_TREE_LIMIT);

    let payload = payload_header(input.execution_header);
    let eth1_block_hash = input.execution_header.hash_slow().0;
    let eth1_data_root = container_root(&[deposit_root, u64_root(count as u64), eth1_block_hash]);

    let fork_version = if input.fulu { FULU_FORK_VERSION } else { ELECTRA_FORK_VERSION };
    let fork_root = container_root(&[fixed_chunk(&fork_version), fixed_chunk(&fork_version), u64_root(0)]);

    let body_root = empty_body_root();
    let block_header_root = container_root(&[u64_root(0), u64_root(0), [0u8; 32], [0u8; 32], body_root]);

    let active: Vec<u64> = (0..count as u64).collect();
    let balance_of = |_: u64| VALIDATOR_BALANCE;
    let members = sync_committee_indices(
        &seed(&eth1_block_hash, 1, DOMAIN_SYNC_COMMITTEE),
        &active,
        balance_of,
        SYNC_COMMITTEE_SIZE,
    );
    let pubkeys: Vec<[u8; 48]> = members.iter().map(|i| input.keys[*i as usize].pubkey).collect();
    let sync_committee = SyncCommittee { aggregate: aggregate_pubkeys(&pubkeys)?, pubkeys };

    let balances = vec![VALIDATOR_BALANCE; count];
    let zeros = vec![0u64; count];
    let participation = vec![0u8; count];

    let mut enc = ContainerEncoder::new();
    let mut roots: Vec<Chunk> = Vec::with_capacity(38);

    // genesis_time, genesis_validators_root, slot
    enc.u64(input.genesis_time).fixed(genesis_validators_root).u64(0);
    roots.extend([u64_root(input.genesis_time), genesis_validators_root, u64_root(0)]);

    // fork
    enc.fixed(fork_version).fixed(fork_version).u64(0);
    roots.push(fork_root);

    // latest_block_header
    enc.u64(0).u64(0).fixed([0u8; 32]).fixed([0u8; 32]).fixed(body_root);
    roots.push(block_header_root);

    // block_roots, state_roots, historical_roots
    let history_depth = SLOTS_PER_HISTORICAL_ROOT.trailing_zeros() as usize;
    enc.fixed(vec![0u8; 32 * SLOTS_PER_HISTORICAL_ROOT]);
    enc.fixed(vec![0u8; 32 * SLOTS_PER_HISTORICAL_ROOT]);
    enc.variable(Vec::new());
    roots.extend([
        zero_hash(history_depth),
        zero_hash(history_depth),
        empty_list_root(HISTORICAL_ROOTS_LIMIT),
    ]);

    // eth1_data, eth1_data_votes, eth1_deposit_index
    enc.fixed(deposit_root).u64(count as u64).fixed(eth1_block_hash);
    enc.variable(Vec::new());
    enc.u64(count as u64);
    roots.extend([eth1_data_root, empty_list_root(ETH1_DATA_VOTES_LIMIT), u64_root(count as u64)]);

    // validators, balances
    let mut validator_bytes = Vec::with_capacity(121 * count);
    for v in &validators {
        v.encode(&mut validator_bytes);
    }
    enc.variable(validator_bytes);
    enc.variable(balances.iter().flat_map(|b| b.to_le_bytes()).collect());
    roots.extend([genesis_validators_root, u64_list_root(&balances, VALIDATOR_REGISTRY_LIMIT)]);

    // randao_mixes, slashings
    let mixes_depth = EPOCHS_PER_HISTORICAL_VECTOR.trailing_zeros() as usize;
    let mut mixes = Vec::with_capacity(32 * EPOCHS_PER_HISTORICAL_VECTOR);
    for _ in 0..EPOCHS_PER_HISTORICAL_VECTOR {
        mixes.extend_from_slice(&eth1_block_hash);
    }
    enc.fixed(mixes);
    enc.fixed(vec![0u8; 8 * EPOCHS_PER_SLASHINGS_VECTOR]);
    roots.extend([
        uniform_vector_root(eth1_block_hash, mixes_depth),
        zero_hash((EPOCHS_PER_SLASHINGS_VECTOR * 8 / 32).trailing_zeros() as usize),
    ]);

    // previous/current epoch participation
    let participation_root = mix_in_length(
        &merkleize(&pack_bytes(&participation), VALIDATOR_REGISTRY_LIMIT / 32),
        count,
    );
    enc.variable(participation.clone()).variable(participation);
    roots.extend([participation_root, participation_root]);

    // justification_bits, previous/current/finalized checkpoints
    enc.fixed([0u8]);
    for _ in 0..3 {
        enc.u64(0).fixed([0u8; 32]);
    }
    roots.push([0u8; 32]);
    roots.extend([checkpoint_root(0, [0u8; 32]); 3]);

    // inactivity_scores
    enc.variable(zeros.iter().flat_map(|z| z.to_le_bytes()).collect());
    roots.push(u64_list_root(&zeros, VALIDATOR_REGISTRY_LIMIT));

    // current/next sync committee
    let committee_bytes = sync_committee.encode();
    let committee_root = sync_committee.root();
    enc.fixed(&committee_bytes).fixed(&committee_bytes);
    roots.extend([committee_root, committee_root]);

    // latest_execution_payload_header
    enc.variable(payload.bytes);
    roots.push(payload.root);

    // next_withdrawal_index, next_withdrawal_validator_index, historical_summaries
    enc.u64(0).u64(0).variable(Vec::new());
    roots.extend([u64_root(0), u64_root(0), empty_list_root(HISTORICAL_ROOTS_LIMIT)]);

    // deposit_requests_start_index and churn accounting
    enc.u64(UNSET_DEPOSIT_REQUESTS_START_INDEX);
    roots.push(u64_root(UNSET_DEPOSIT_REQUESTS_START_INDEX));
    for _ in 0..5 {
        enc.u64(0);
        roots.push(u64_root(0));
    }

    // pending_deposits, pending_partial_withdrawals, pending_consolidations
    enc.variable(Vec::new()).variable(Vec::new()).variable(Vec::new());
    roots.extend([
        empty_list_root(PENDING_DEPOSITS_LIMIT),
        empty_list_root(PENDING_PARTIAL_WITHDRAWALS_LIMIT),
        empty_list_root(PENDING_CONSOLIDATIONS_LIMIT),
    ]);

    if input.fulu {
        let lookahead = proposer_lookahead(&eth1_block_hash, &active, balance_of);
        enc.fixed(lookahead.iter().flat_map(|p| p.to_le_bytes()).collect::<Vec<u8>>());
        roots.push(u64_vector_root(&lookahead));
    }

    let state_root = container_root(&roots);
    debug!(
        "Genesis state: {} validators, {} fields, validators root 0x{}",
        count,
        roots.len(),
        alloy::primitives::hex::encode(genesis_validators_root)
    );

    Ok(GenesisState {
        ssz: enc.finish(),
        genesis_validators_root: B256::from(genesis_validators_root),
        state_root: B256::from(state_root),
    })
}

/// Proposers of the first `MIN_SEED_LOOKAHEAD + 1` epochs
fn proposer_lookahead(mix: &Chunk, active: &[u64], balance_of: impl Fn(u64) -> u64 + Copy) -> Vec<u64> {
    let mut proposers = Vec::with_capacity(((MIN_SEED_LOOKAHEAD + 1) * SLOTS_PER_EPOCH) as usize);
    for epoch in 0..=MIN_SEED_LOOKAHEAD {
        let epoch_seed = seed(mix, epoch, DOMAIN_BEACON_PROPOSER);
        for slot in epoch * SLOTS_PER_EPOCH..(epoch + 1) * SLOTS_PER_EPOCH {
            let mut buf = [0u8; 40];
            buf[..32].copy_from_slice(&epoch_seed);
            buf[32..].copy_from_slice(&slot.to_le_bytes());
            proposers.push(proposer_index(&sha256(&buf), active, balance_of).unwrap_or_default());
        }
    }
    proposers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cl::keys::interop_keys;

    fn header() -> Header {
        Header { timestamp: 1_700_000_000, gas_limit: 30_000_000, ..Default::default() }
    }

    // Electra: 37 fields. Fixed part plus the variable payloads of an empty chain.
    fn electra_len(count: usize, extra_data: usize) -> usize {
        let fixed = 8 + 32 + 8 // time, gvr, slot
            + 16 + 112 // fork, latest header
            + 2 * 32 * 8192 + 4 // block/state roots, historical roots offset
            + 72 + 4 + 8 // eth1 data, votes offset, deposit index
            + 4 + 4 // validators, balances offsets
            + 32 * 65536 + 8 * 8192 // randao, slashings
            + 4 + 4 + 1 + 3 * 40 // participation offsets, bits, checkpoints
            + 4 // inactivity offset
            + 2 * 48 * 513 // sync committees
            + 4 // payload header offset
            + 8 + 8 + 4 // withdrawal indices, summaries offset
            + 8 * 6 // deposit requests start, churn fields
            + 3 * 4; // pending lists
        let header_len = 32 + 20 + 32 + 32 + 256 + 32 + 4 * 8 + 4 + 32 + 32 + 32 + 32 + 8 + 8;
        fixed + 121 * count + 8 * count + 2 * count + 8 * count + header_len + extra_data
    }

    #[test]
    fn test_electra_state_layout() {
        let keys = interop_keys(4).unwrap();
        let header = header();
        let input = GenesisInput {
            genesis_time: header.timestamp,
            keys: &keys,
            withdrawal_address: Address::repeat_byte(0x11),
            execution_header: &header,
            fulu: false,
        };
        let state = genesis_state(&input).unwrap();
        assert_eq!(state.ssz.len(), electra_len(4, 0));
        assert_eq!(&state.ssz[..8], &header.timestamp.to_le_bytes());
        assert_eq!(&state.ssz[8..40], state.genesis_validators_root.as_slice());
        // current fork version
        assert_eq!(&state.ssz[52..56], &ELECTRA_FORK_VERSION);
    }

    #[test]
    fn test_fulu_appends_lookahead() {
        let keys = interop_keys(4).unwrap();
        let header = header();
        let mut input = GenesisInput {
            genesis_time: header.timestamp,
            keys: &keys,
            withdrawal_address: Address::ZERO,
            execution_header: &header,
            fulu: false,
        };
        let electra = genesis_state(&input).unwrap();
        input.fulu = true;
        let fulu = genesis_state(&input).unwrap();
        assert_eq!(fulu.ssz.len(), electra.ssz.len() + 64 * 8);
        assert_eq!(fulu.genesis_validators_root, electra.genesis_validators_root);
        assert_ne!(fulu.state_root, electra.state_root);
    }

    #[test]
    fn test_state_is_deterministic() {
        let keys = interop_keys(2).unwrap();
        let header = header();
        let input = GenesisInput {
            genesis_time: header.timestamp,
            keys: &keys,
            withdrawal_address: Address::ZERO,
            execution_header: &header,
            fulu: false,
        };
        let a = genesis_state(&input).unwrap();
        let b = genesis_state(&input).unwrap();
        assert_eq!(a.ssz, b.ssz);
        assert_eq!(a.state_root, b.state_root);
    }

    #[test]
    fn test_uniform_vector_root_matches_merkleize() {
        let leaf = [9u8; 32];
        assert_eq!(uniform_vector_root(leaf, 3), merkleize(&[leaf; 8], 8));
    }

    #[test]
    fn test_deposit_domain() {
        let domain = compute_domain(DOMAIN_DEPOSIT, GENESIS_FORK_VERSION, [0u8; 32]);
        assert_eq!(&domain[..4], &DOMAIN_DEPOSIT);
        let fork_data = hash2(&fixed_chunk(&GENESIS_FORK_VERSION), &[0u8; 32]);
        assert_eq!(&domain[4..], &fork_data[..28]);
    }
}
