//! Validator shuffling, sync committee and proposer selection at genesis.

use super::ssz::{Chunk, sha256};

/// Rounds of the swap-or-not shuffle
pub const SHUFFLE_ROUND_COUNT: u8 = 90;

/// Upper bound of the 16-bit random value used in balance-weighted sampling
const MAX_RANDOM_VALUE: u64 = (1 << 16) - 1;

/// Maximum effective balance since Electra, in gwei
pub const MAX_EFFECTIVE_BALANCE_ELECTRA: u64 = 2048 * 1_000_000_000;

/// Domain of proposer selection
pub const DOMAIN_BEACON_PROPOSER: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// Domain of sync committee selection
pub const DOMAIN_SYNC_COMMITTEE: [u8; 4] = [0x07, 0x00, 0x00, 0x00];

/// Swap-or-not shuffle of a single index
pub fn compute_shuffled_index(mut index: u64, count: u64, seed: &Chunk) -> u64 {
    debug_assert!(index < count);
    let mut buf = [0u8; 37];
    buf[..32].copy_from_slice(seed);

    for round in 0..SHUFFLE_ROUND_COUNT {
        buf[32] = round;
        let pivot_hash = sha256(&buf[..33]);
        let mut pivot_bytes = [0u8; 8];
        pivot_bytes.copy_from_slice(&pivot_hash[..8]);
        let pivot = u64::from_le_bytes(pivot_bytes) % count;

        let flip = (pivot + count - index) % count;
        let position = index.max(flip);
        buf[33..37].copy_from_slice(&((position / 256) as u32).to_le_bytes());
        let source = sha256(&buf);
        let byte = source[((position % 256) / 8) as usize];
        if (byte >> (position % 8)) & 1 == 1 {
            index = flip;
        }
    }
    index
}

/// Seed for an epoch and domain, given the randao mix it draws from
pub fn seed(mix: &Chunk, epoch: u64, domain: [u8; 4]) -> Chunk {
    let mut buf = [0u8; 44];
    buf[..4].copy_from_slice(&domain);
    buf[4..12].copy_from_slice(&epoch.to_le_bytes());
    buf[12..].copy_from_slice(mix);
    sha256(&buf)
}

fn random_value(seed: &Chunk, i: u64) -> u64 {
    let mut buf = [0u8; 40];
    buf[..32].copy_from_slice(seed);
    buf[32..].copy_from_slice(&(i / 16).to_le_bytes());
    let random_bytes = sha256(&buf);
    let offset = ((i % 16) * 2) as usize;
    u16::from_le_bytes([random_bytes[offset], random_bytes[offset + 1]]) as u64
}

fn accepts(effective_balance: u64, random_value: u64) -> bool {
    effective_balance * MAX_RANDOM_VALUE >= MAX_EFFECTIVE_BALANCE_ELECTRA * random_value
}

/// Balance-weighted sample of `size` sync committee members
pub fn sync_committee_indices(
    seed: &Chunk,
    active: &[u64],
    effective_balance: impl Fn(u64) -> u64,
    size: usize,
) -> Vec<u64> {
    let count = active.len() as u64;
    if count == 0 {
        return Vec::new();
    }
    let shuffled: Vec<u64> = (0..count)
        .map(|i| compute_shuffled_index(i, count, seed))
        .collect();

    let mut members = Vec::with_capacity(size);
    let mut i = 0u64;
    while members.len() < size {
        let candidate = active[shuffled[(i % count) as usize] as usize];
        if accepts(effective_balance(candidate), random_value(seed, i)) {
            members.push(candidate);
        }
        i += 1;
    }
    members
}

/// Balance-weighted proposer for a slot seed
pub fn proposer_index(seed: &Chunk, active: &[u64], effective_balance: impl Fn(u64) -> u64) -> Option<u64> {
    let count = active.len() as u64;
    if count == 0 {
        return None;
    }
    let mut i = 0u64;
    loop {
        let candidate = active[compute_shuffled_index(i % count, count, seed) as usize];
        if accepts(effective_balance(candidate), random_value(seed, i)) {
            return Some(candidate);
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_shuffle_is_a_permutation() {
        let seed = sha256(b"playground");
        let shuffled: HashSet<u64> = (0..100).map(|i| compute_shuffled_index(i, 100, &seed)).collect();
        assert_eq!(shuffled.len(), 100);
        assert!(shuffled.iter().all(|i| *i < 100));
    }

    #[test]
    fn test_sync_committee_is_deterministic() {
        let seed = sha256(b"seed");
        let active: Vec<u64> = (0..100).collect();
        let a = sync_committee_indices(&seed, &active, |_| 32_000_000_000, 512);
        let b = sync_committee_indices(&seed, &active, |_| 32_000_000_000, 512);
        assert_eq!(a.len(), 512);
        assert_eq!(a, b);
        assert!(a.iter().all(|i| *i < 100));
    }

    #[test]
    fn test_max_balance_always_accepted() {
        let seed = sha256(b"seed");
        let active: Vec<u64> = (0..10).collect();
        let expected = active[compute_shuffled_index(0, 10, &seed) as usize];
        assert_eq!(proposer_index(&seed, &active, |_| MAX_EFFECTIVE_BALANCE_ELECTRA), Some(expected));
    }
}
