//! Consensus chain configuration (`testnet/config.yaml`).

use super::{
    ALTAIR_FORK_VERSION, BELLATRIX_FORK_VERSION, CAPELLA_FORK_VERSION, DENEB_FORK_VERSION,
    ELECTRA_FORK_VERSION, FAR_FUTURE_EPOCH, FULU_FORK_VERSION, GENESIS_FORK_VERSION,
};
use crate::el::{DEPOSIT_CONTRACT_ADDRESS, L1_CHAIN_ID};
use alloy::primitives::hex;

/// Inputs of the consensus config document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSpec {
    /// Genesis time, also the minimum genesis time
    pub genesis_time: u64,
    /// Seconds per slot
    pub seconds_per_slot: u64,
    /// Activate Fulu at genesis
    pub latest_fork: bool,
}

impl ChainSpec {
    /// Epoch at which Fulu activates
    pub fn fulu_fork_epoch(&self) -> u64 {
        if self.latest_fork { 0 } else { FAR_FUTURE_EPOCH }
    }

    /// Render the config YAML.
    ///
    /// Hex values stay unquoted, which is what the clients expect.
    pub fn to_yaml(&self) -> String {
        let version = |v: [u8; 4]| hex::encode_prefixed(v);
        let mut lines = vec![
            "PRESET_BASE: 'mainnet'".to_string(),
            "CONFIG_NAME: 'playground'".to_string(),
            String::new(),
            "# Genesis".to_string(),
            format!("MIN_GENESIS_ACTIVE_VALIDATOR_COUNT: {}", super::VALIDATOR_COUNT),
            format!("MIN_GENESIS_TIME: {}", self.genesis_time),
            format!("GENESIS_FORK_VERSION: {}", version(GENESIS_FORK_VERSION)),
            "GENESIS_DELAY: 0".to_string(),
            String::new(),
            "# Forking".to_string(),
            format!("ALTAIR_FORK_VERSION: {}", version(ALTAIR_FORK_VERSION)),
            "ALTAIR_FORK_EPOCH: 0".to_string(),
            format!("BELLATRIX_FORK_VERSION: {}", version(BELLATRIX_FORK_VERSION)),
            "BELLATRIX_FORK_EPOCH: 0".to_string(),
            format!("CAPELLA_FORK_VERSION: {}", version(CAPELLA_FORK_VERSION)),
            "CAPELLA_FORK_EPOCH: 0".to_string(),
            format!("DENEB_FORK_VERSION: {}", version(DENEB_FORK_VERSION)),
            "DENEB_FORK_EPOCH: 0".to_string(),
            format!("ELECTRA_FORK_VERSION: {}", version(ELECTRA_FORK_VERSION)),
            "ELECTRA_FORK_EPOCH: 0".to_string(),
            format!("FULU_FORK_VERSION: {}", version(FULU_FORK_VERSION)),
            format!("FULU_FORK_EPOCH: {}", self.fulu_fork_epoch()),
            "TERMINAL_TOTAL_DIFFICULTY: 0".to_string(),
            "TERMINAL_BLOCK_HASH: 0x0000000000000000000000000000000000000000000000000000000000000000"
                .to_string(),
            "TERMINAL_BLOCK_HASH_ACTIVATION_EPOCH: 18446744073709551615".to_string(),
            String::new(),
            "# Time parameters".to_string(),
            format!("SECONDS_PER_SLOT: {}", self.seconds_per_slot),
            format!("SECONDS_PER_ETH1_BLOCK: {}", self.seconds_per_slot),
            "MIN_VALIDATOR_WITHDRAWABILITY_DELAY: 256".to_string(),
            "SHARD_COMMITTEE_PERIOD: 256".to_string(),
            "ETH1_FOLLOW_DISTANCE: 2048".to_string(),
            String::new(),
            "# Validator cycle".to_string(),
            "INACTIVITY_SCORE_BIAS: 4".to_string(),
            "INACTIVITY_SCORE_RECOVERY_RATE: 16".to_string(),
            "EJECTION_BALANCE: 16000000000".to_string(),
            "MIN_PER_EPOCH_CHURN_LIMIT: 4".to_string(),
            "CHURN_LIMIT_QUOTIENT: 65536".to_string(),
            "MAX_PER_EPOCH_ACTIVATION_CHURN_LIMIT: 8".to_string(),
            "MIN_PER_EPOCH_CHURN_LIMIT_ELECTRA: 128000000000".to_string(),
            "MAX_PER_EPOCH_ACTIVATION_EXIT_CHURN_LIMIT: 256000000000".to_string(),
            String::new(),
            "# Deposit contract".to_string(),
            format!("DEPOSIT_CHAIN_ID: {}", L1_CHAIN_ID),
            format!("DEPOSIT_NETWORK_ID: {}", L1_CHAIN_ID),
            format!("DEPOSIT_CONTRACT_ADDRESS: {}", DEPOSIT_CONTRACT_ADDRESS),
            String::new(),
            "# Blobs".to_string(),
            "MAX_BLOBS_PER_BLOCK_ELECTRA: 9".to_string(),
            "TARGET_BLOBS_PER_BLOCK_ELECTRA: 6".to_string(),
            "MAX_REQUEST_BLOB_SIDECARS_ELECTRA: 1152".to_string(),
        ];
        lines.push(String::new());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(yaml: &'a str, key: &str) -> &'a str {
        yaml.lines()
            .find_map(|l| l.strip_prefix(&format!("{}: ", key)))
            .unwrap()
    }

    #[test]
    fn test_latest_fork_epoch() {
        let spec = ChainSpec { genesis_time: 1000, seconds_per_slot: 2, latest_fork: false };
        let yaml = spec.to_yaml();
        assert_eq!(value(&yaml, "FULU_FORK_EPOCH"), "18446744073709551615");
        assert_eq!(value(&yaml, "SECONDS_PER_SLOT"), "2");
        assert_eq!(value(&yaml, "MIN_GENESIS_TIME"), "1000");
        assert_eq!(value(&yaml, "GENESIS_FORK_VERSION"), "0x20000089");

        let latest = ChainSpec { latest_fork: true, ..spec }.to_yaml();
        assert_eq!(value(&latest, "FULU_FORK_EPOCH"), "0");
    }

    #[test]
    fn test_every_line_is_a_key_value_pair() {
        let spec = ChainSpec { genesis_time: 1, seconds_per_slot: 12, latest_fork: true };
        for line in spec.to_yaml().lines().filter(|l| !l.is_empty() && !l.starts_with('#')) {
            let (key, value) = line.split_once(": ").unwrap();
            assert!(key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
            assert!(!value.is_empty());
        }
    }
}
