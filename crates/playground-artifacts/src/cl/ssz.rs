//! Minimal SSZ serialization and merkleization.
//!
//! Only what the genesis state needs: fixed/variable container encoding and
//! hash-tree-root over chunk lists with zero-hash padding.

use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// A 32-byte merkle chunk
pub type Chunk = [u8; 32];

const MAX_DEPTH: usize = 64;

static ZERO_HASHES: LazyLock<Vec<Chunk>> = LazyLock::new(|| {
    let mut hashes = vec![[0u8; 32]; MAX_DEPTH + 1];
    for depth in 0..MAX_DEPTH {
        hashes[depth + 1] = hash2(&hashes[depth], &hashes[depth]);
    }
    hashes
});

/// sha256 of arbitrary data
pub fn sha256(data: &[u8]) -> Chunk {
    Sha256::digest(data).into()
}

/// sha256 of two concatenated chunks
pub fn hash2(a: &Chunk, b: &Chunk) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Root of an all-zero subtree of the given depth
pub fn zero_hash(depth: usize) -> Chunk {
    ZERO_HASHES[depth.min(MAX_DEPTH)]
}

fn depth_for(limit: usize) -> usize {
    if limit <= 1 {
        0
    } else {
        (usize::BITS - (limit - 1).leading_zeros()) as usize
    }
}

/// Merkleize chunks into a tree sized for `limit` leaves
pub fn merkleize(chunks: &[Chunk], limit: usize) -> Chunk {
    let depth = depth_for(limit.max(chunks.len()));
    if chunks.is_empty() {
        return zero_hash(depth);
    }
    let mut layer = chunks.to_vec();
    for d in 0..depth {
        if layer.len() % 2 == 1 {
            layer.push(zero_hash(d));
        }
        layer = layer.chunks_exact(2).map(|pair| hash2(&pair[0], &pair[1])).collect();
    }
    layer[0]
}

/// Mix a list length into its root
pub fn mix_in_length(root: &Chunk, len: usize) -> Chunk {
    let mut length = [0u8; 32];
    length[..8].copy_from_slice(&(len as u64).to_le_bytes());
    hash2(root, &length)
}

/// Root of a container given its field roots
pub fn container_root(fields: &[Chunk]) -> Chunk {
    merkleize(fields, fields.len())
}

/// Split bytes into right-padded chunks
pub fn pack_bytes(bytes: &[u8]) -> Vec<Chunk> {
    bytes
        .chunks(32)
        .map(|c| {
            let mut chunk = [0u8; 32];
            chunk[..c.len()].copy_from_slice(c);
            chunk
        })
        .collect()
}

/// Root of a fixed-length byte vector
pub fn bytes_root(bytes: &[u8]) -> Chunk {
    let chunks = pack_bytes(bytes);
    merkleize(&chunks, bytes.len().div_ceil(32))
}

/// Root of a `uint64`
pub fn u64_root(value: u64) -> Chunk {
    let mut chunk = [0u8; 32];
    chunk[..8].copy_from_slice(&value.to_le_bytes());
    chunk
}

/// Root of a `boolean`
pub fn bool_root(value: bool) -> Chunk {
    let mut chunk = [0u8; 32];
    chunk[0] = value as u8;
    chunk
}

/// Root of an empty list with room for `limit_chunks` chunks
pub fn empty_list_root(limit_chunks: usize) -> Chunk {
    mix_in_length(&merkleize(&[], limit_chunks), 0)
}

/// Root of a list of composite elements given their roots
pub fn list_root(roots: &[Chunk], limit: usize) -> Chunk {
    mix_in_length(&merkleize(roots, limit), roots.len())
}

enum Part {
    Fixed(Vec<u8>),
    Variable(Vec<u8>),
}

/// Encoder for SSZ containers with variable-size fields
#[derive(Default)]
pub struct ContainerEncoder {
    parts: Vec<Part>,
}

impl ContainerEncoder {
    /// Create an empty encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fixed-size field
    pub fn fixed(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        self.parts.push(Part::Fixed(bytes.as_ref().to_vec()));
        self
    }

    /// Append a `uint64` field
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.fixed(value.to_le_bytes())
    }

    /// Append a variable-size field
    pub fn variable(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.parts.push(Part::Variable(bytes));
        self
    }

    /// Lay out the fixed part with offsets followed by the variable part
    pub fn finish(self) -> Vec<u8> {
        let fixed_len: usize = self
            .parts
            .iter()
            .map(|p| match p {
                Part::Fixed(b) => b.len(),
                Part::Variable(_) => 4,
            })
            .sum();
        let variable_len: usize = self
            .parts
            .iter()
            .map(|p| match p {
                Part::Fixed(_) => 0,
                Part::Variable(b) => b.len(),
            })
            .sum();

        let mut out = Vec::with_capacity(fixed_len + variable_len);
        let mut offset = fixed_len;
        for part in &self.parts {
            match part {
                Part::Fixed(b) => out.extend_from_slice(b),
                Part::Variable(b) => {
                    out.extend_from_slice(&(offset as u32).to_le_bytes());
                    offset += b.len();
                }
            }
        }
        for part in self.parts {
            if let Part::Variable(b) = part {
                out.extend_from_slice(&b);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_hashes_chain() {
        assert_eq!(zero_hash(0), [0u8; 32]);
        assert_eq!(zero_hash(1), hash2(&[0u8; 32], &[0u8; 32]));
        assert_eq!(zero_hash(2), hash2(&zero_hash(1), &zero_hash(1)));
    }

    #[test]
    fn test_merkleize_padding() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(merkleize(&[a], 1), a);
        assert_eq!(merkleize(&[a, b], 2), hash2(&a, &b));
        assert_eq!(merkleize(&[a], 4), hash2(&hash2(&a, &zero_hash(0)), &zero_hash(1)));
        assert_eq!(merkleize(&[], 8), zero_hash(3));
        assert_eq!(merkleize(&[a, b, a], 3), hash2(&hash2(&a, &b), &hash2(&a, &zero_hash(0))));
    }

    #[test]
    fn test_container_offsets() {
        let mut enc = ContainerEncoder::new();
        enc.u64(7).variable(vec![0xaa, 0xbb]).fixed([1u8, 2]).variable(vec![0xcc]);
        let out = enc.finish();
        // 8 + 4 + 2 + 4 fixed bytes, then the two variable payloads
        assert_eq!(out.len(), 18 + 3);
        assert_eq!(&out[8..12], &18u32.to_le_bytes());
        assert_eq!(&out[14..18], &20u32.to_le_bytes());
        assert_eq!(&out[18..], &[0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_bytes_root_of_pubkey_sized_vector() {
        let bytes = [3u8; 48];
        let chunks = pack_bytes(&bytes);
        assert_eq!(chunks.len(), 2);
        assert_eq!(bytes_root(&bytes), hash2(&chunks[0], &chunks[1]));
    }
}
