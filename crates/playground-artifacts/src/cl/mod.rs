//! Consensus-layer genesis: chain config, interop keys and the pre-mined
//! beacon state.

pub mod config;
pub mod keys;
pub mod shuffle;
pub mod ssz;
pub mod state;

/// Fork version at genesis
pub const GENESIS_FORK_VERSION: [u8; 4] = [0x20, 0x00, 0x00, 0x89];
/// Altair fork version
pub const ALTAIR_FORK_VERSION: [u8; 4] = [0x20, 0x00, 0x00, 0x90];
/// Bellatrix fork version
pub const BELLATRIX_FORK_VERSION: [u8; 4] = [0x20, 0x00, 0x00, 0x91];
/// Capella fork version
pub const CAPELLA_FORK_VERSION: [u8; 4] = [0x20, 0x00, 0x00, 0x92];
/// Deneb fork version
pub const DENEB_FORK_VERSION: [u8; 4] = [0x20, 0x00, 0x00, 0x93];
/// Electra fork version
pub const ELECTRA_FORK_VERSION: [u8; 4] = [0x20, 0x00, 0x00, 0x94];
/// Fulu fork version
pub const FULU_FORK_VERSION: [u8; 4] = [0x20, 0x00, 0x00, 0x95];

/// Epoch value meaning "never"
pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;

/// Number of genesis validators
pub const VALIDATOR_COUNT: u64 = 100;

/// Slots per epoch (mainnet preset)
pub const SLOTS_PER_EPOCH: u64 = 32;

/// Stake of every genesis validator, in gwei
pub const VALIDATOR_BALANCE: u64 = 32_000_000_000;
