//! EIP-2335 validator keystores.
//!
//! PBKDF2-HMAC-SHA256 key derivation, AES-128-CTR encryption and a SHA-256
//! checksum over the second half of the derived key and the ciphertext.

use crate::{Error, Result};
use aes::Aes128;
use alloy::primitives::hex;
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Passphrase protecting every generated keystore
pub const KEYSTORE_PASSWORD: &str = "secret";

/// PBKDF2 rounds; the keys only guard a local testbed
pub const KDF_ROUNDS: u32 = 1 << 13;

type Aes128Ctr = Ctr128BE<Aes128>;

/// A named crypto module with its parameters and message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module<P> {
    /// Algorithm name
    pub function: String,
    /// Algorithm parameters
    pub params: P,
    /// Hex payload
    pub message: String,
}

/// PBKDF2 parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Derived key length
    pub dklen: u32,
    /// Iteration count
    pub c: u32,
    /// Pseudo-random function
    pub prf: String,
    /// Hex salt
    pub salt: String,
}

/// Empty parameter object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoParams {}

/// Cipher parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CipherParams {
    /// Hex IV
    pub iv: String,
}

/// Crypto section of a keystore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crypto {
    /// Key derivation
    pub kdf: Module<KdfParams>,
    /// Integrity check
    pub checksum: Module<NoParams>,
    /// Encryption
    pub cipher: Module<CipherParams>,
}

/// Version 4 keystore document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keystore {
    /// Crypto section
    pub crypto: Crypto,
    /// Free-form description
    pub description: String,
    /// Hex public key without prefix
    pub pubkey: String,
    /// EIP-2334 derivation path
    pub path: String,
    /// Random id
    pub uuid: uuid::Uuid,
    /// Format version
    pub version: u32,
}

fn derive_key(password: &str, salt: &[u8], rounds: u32) -> [u8; 32] {
    let mut dk = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut dk);
    dk
}

fn apply_cipher(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let mut cipher = Aes128Ctr::new_from_slices(key, iv)
        .map_err(|e| Error::Crypto(format!("aes-128-ctr: {}", e)))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn checksum(dk: &[u8; 32], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&dk[16..]);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

impl Keystore {
    /// Encrypt a BLS secret
    pub fn encrypt(secret: &[u8; 32], pubkey: &[u8; 48], password: &str, path: String) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; 32];
        let mut iv = [0u8; 16];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let dk = derive_key(password, &salt, KDF_ROUNDS);
        let mut ciphertext = secret.to_vec();
        apply_cipher(&dk[..16], &iv, &mut ciphertext)?;

        Ok(Self {
            crypto: Crypto {
                kdf: Module {
                    function: "pbkdf2".to_string(),
                    params: KdfParams {
                        dklen: 32,
                        c: KDF_ROUNDS,
                        prf: "hmac-sha256".to_string(),
                        salt: hex::encode(salt),
                    },
                    message: String::new(),
                },
                checksum: Module {
                    function: "sha256".to_string(),
                    params: NoParams {},
                    message: hex::encode(checksum(&dk, &ciphertext)),
                },
                cipher: Module {
                    function: "aes-128-ctr".to_string(),
                    params: CipherParams { iv: hex::encode(iv) },
                    message: hex::encode(&ciphertext),
                },
            },
            description: String::new(),
            pubkey: hex::encode(pubkey),
            path,
            uuid: uuid::Uuid::new_v4(),
            version: 4,
        })
    }

    /// Decrypt the secret, verifying the checksum
    pub fn decrypt(&self, password: &str) -> Result<Vec<u8>> {
        let decode = |s: &str| hex::decode(s).map_err(|e| Error::Crypto(format!("keystore hex: {}", e)));
        let salt = decode(&self.crypto.kdf.params.salt)?;
        let iv = decode(&self.crypto.cipher.params.iv)?;
        let mut data = decode(&self.crypto.cipher.message)?;

        let dk = derive_key(password, &salt, self.crypto.kdf.params.c);
        if hex::encode(checksum(&dk, &data)) != self.crypto.checksum.message {
            return Err(Error::Crypto("keystore checksum mismatch".to_string()));
        }
        apply_cipher(&dk[..16], &iv, &mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_password_fails_checksum() {
        let secret = [7u8; 32];
        let keystore = Keystore::encrypt(&secret, &[1u8; 48], KEYSTORE_PASSWORD, "m/12381/3600/0/0/0".to_string()).unwrap();
        assert_eq!(keystore.decrypt(KEYSTORE_PASSWORD).unwrap(), secret.to_vec());
        assert!(keystore.decrypt("nope").is_err());
        assert_eq!(keystore.version, 4);
        assert_eq!(keystore.pubkey.len(), 96);
    }
}
