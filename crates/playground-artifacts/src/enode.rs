//! Deterministic devp2p node identities.

use crate::{Error, Result};
use alloy::primitives::hex;
use k256::ecdsa::SigningKey;
use playground_manifest::Output;
use serde::{Deserialize, Serialize};

/// A node key written into the session directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enode {
    /// Sequence number, starting at 1
    pub index: u64,
    /// Artifact holding the hex private key
    pub key_file: String,
    /// Hex node id (uncompressed public key without the `04` prefix)
    pub id: String,
}

impl Enode {
    /// Derive the identity for a sequence number
    pub fn derive(index: u64) -> Result<Self> {
        let key = Self::secret(index);
        let signing = SigningKey::from_slice(&key)
            .map_err(|e| Error::Crypto(format!("enode key {}: {}", index, e)))?;
        let point = signing.verifying_key().to_encoded_point(false);
        Ok(Self {
            index,
            key_file: format!("enode-key-{}.txt", index),
            id: hex::encode(&point.as_bytes()[1..]),
        })
    }

    /// The private key: the sequence number as a big-endian scalar
    pub fn secret(index: u64) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[24..].copy_from_slice(&index.to_be_bytes());
        key
    }

    /// `enode://<id>@<address>`
    pub fn url(&self, address: &str) -> String {
        format!("enode://{}@{}", self.id, address)
    }
}

/// Hands out node identities in order and writes their keys
#[derive(Debug, Default)]
pub struct EnodeManager {
    next: u64,
    issued: Vec<Enode>,
}

impl EnodeManager {
    /// Create a manager whose first identity is number 1
    pub fn new() -> Self {
        Self { next: 1, issued: Vec::new() }
    }

    /// Issue the next identity, writing its key file into `output`
    pub fn next_enode(&mut self, output: &Output) -> Result<Enode> {
        let index = self.next.max(1);
        let enode = Enode::derive(index)?;
        output.write_file(&enode.key_file, hex::encode(Enode::secret(index)))?;
        self.next = index + 1;
        self.issued.push(enode.clone());
        Ok(enode)
    }

    /// Identities issued so far
    pub fn issued(&self) -> &[Enode] {
        &self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_identity_is_the_generator() {
        let enode = Enode::derive(1).unwrap();
        assert_eq!(
            enode.id,
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
        );
        assert_eq!(enode.url("el:30303"), format!("enode://{}@el:30303", enode.id));
    }

    #[test]
    fn test_manager_writes_sequential_keys() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path()).unwrap();
        let mut manager = EnodeManager::new();
        let first = manager.next_enode(&output).unwrap();
        let second = manager.next_enode(&output).unwrap();
        assert_eq!((first.index, second.index), (1, 2));
        assert_ne!(first.id, second.id);

        let key = std::fs::read_to_string(dir.path().join("enode-key-2.txt")).unwrap();
        assert_eq!(key, format!("{:064x}", 2));
        assert_eq!(manager.issued().len(), 2);
    }
}
