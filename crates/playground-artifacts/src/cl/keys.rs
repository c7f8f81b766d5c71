//! Deterministic interop validator keys.

use super::ssz::sha256;
use crate::{Error, Result};
use alloy::primitives::{U256, hex};
use blst::min_pk::{AggregatePublicKey, PublicKey, SecretKey};

/// Domain separation tag for proof-of-possession BLS signatures
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Order of the BLS12-381 scalar field
const CURVE_ORDER: [u8; 32] =
    hex!("73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001");

/// A validator key pair
pub struct ValidatorKey {
    /// Index in the interop sequence
    pub index: u64,
    /// Big-endian secret scalar
    pub secret: [u8; 32],
    /// Compressed public key
    pub pubkey: [u8; 48],
    sk: SecretKey,
}

impl std::fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorKey")
            .field("index", &self.index)
            .field("pubkey", &hex::encode_prefixed(self.pubkey))
            .finish()
    }
}

impl ValidatorKey {
    /// Interop key `index`: `sha256(le32(index))` read little-endian, reduced mod r
    pub fn interop(index: u64) -> Result<Self> {
        let mut preimage = [0u8; 32];
        preimage[..8].copy_from_slice(&index.to_le_bytes());
        let digest = sha256(&preimage);

        let scalar = U256::from_le_bytes(digest).reduce_mod(U256::from_be_bytes(CURVE_ORDER));
        let secret: [u8; 32] = scalar.to_be_bytes();

        let sk = SecretKey::from_bytes(&secret)
            .map_err(|e| Error::Crypto(format!("interop key {}: {:?}", index, e)))?;
        let pubkey = sk.sk_to_pk().compress();
        Ok(Self { index, secret, pubkey, sk })
    }

    /// Sign a message with the proof-of-possession ciphersuite
    pub fn sign(&self, message: &[u8]) -> [u8; 96] {
        self.sk.sign(message, BLS_DST, &[]).compress()
    }

    /// Hex public key with `0x` prefix
    pub fn pubkey_hex(&self) -> String {
        hex::encode_prefixed(self.pubkey)
    }
}

/// The first `count` interop keys
pub fn interop_keys(count: u64) -> Result<Vec<ValidatorKey>> {
    (0..count).map(ValidatorKey::interop).collect()
}

/// Aggregate compressed public keys
pub fn aggregate_pubkeys(pubkeys: &[[u8; 48]]) -> Result<[u8; 48]> {
    let keys = pubkeys
        .iter()
        .map(|pk| PublicKey::uncompress(pk).map_err(|e| Error::Crypto(format!("{:?}", e))))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&PublicKey> = keys.iter().collect();
    let aggregate = AggregatePublicKey::aggregate(&refs, false)
        .map_err(|e| Error::Crypto(format!("aggregate public keys: {:?}", e)))?;
    Ok(aggregate.to_public_key().compress())
}
