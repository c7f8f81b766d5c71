//! Prefunded accounts.

use crate::{Error, Result};
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use std::str::FromStr;

/// Built-in development keys, the same set every local dev chain ships with
pub const DEFAULT_PREFUNDED_KEYS: [&str; 10] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    "7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6",
    "47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a",
    "8b3a350cf5c34c9194ca85829a2df0ec3153be0318b5e2d3348e872092edffba",
    "92db14e403b83dfe3df233f83dfa3a0d7096f21ca9b0d6d6b8d88b2b4ec1564e",
    "4bbbf85ce3377467afe5d46f804f221813b2bb87f24d81f60f1fcdbf7cbf4356",
    "dbda1821b80551c9d65939329250298aa3472ba22feea921c0cf5d620ea67b97",
    "2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6",
];

/// An account credited in genesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefundedAccount {
    /// Private key
    pub key: B256,
    /// Derived address
    pub address: Address,
}

impl PrefundedAccount {
    /// Parse a hex private key, with or without `0x`
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = B256::from_str(key.trim()).map_err(|_| Error::InvalidKey(key.to_string()))?;
        let signer =
            PrivateKeySigner::from_bytes(&bytes).map_err(|_| Error::InvalidKey(key.to_string()))?;
        Ok(Self { key: bytes, address: signer.address() })
    }
}

/// Built-in accounts followed by `extra`, deduplicated by address
pub fn prefunded_accounts(extra: &[String]) -> Result<Vec<PrefundedAccount>> {
    let mut accounts: Vec<PrefundedAccount> = Vec::with_capacity(DEFAULT_PREFUNDED_KEYS.len() + extra.len());
    for key in DEFAULT_PREFUNDED_KEYS.iter().copied().chain(extra.iter().map(String::as_str)) {
        let account = PrefundedAccount::from_hex(key)?;
        if !accounts.iter().any(|a| a.address == account.address) {
            accounts.push(account);
        }
    }
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_default_accounts() {
        let accounts = prefunded_accounts(&[]).unwrap();
        assert_eq!(accounts.len(), 10);
        assert_eq!(accounts[0].address, address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert_eq!(accounts[1].address, address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"));
    }

    #[test]
    fn test_extra_keys_dedup_and_validation() {
        let extra = vec![format!("0x{}", DEFAULT_PREFUNDED_KEYS[0])];
        assert_eq!(prefunded_accounts(&extra).unwrap().len(), 10);
        assert!(matches!(prefunded_accounts(&["zz".to_string()]), Err(Error::InvalidKey(_))));
    }
}
