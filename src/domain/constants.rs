// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::{Address, address};
use lazy_static::lazy_static;
use starknet::core::types::Felt;

// =============================================================================
// NETWORK CONSTANTS
// =============================================================================

pub const CHAIN_BASE: u64 = 8453;

pub const DEFAULT_EVM_RPC_URL: &str = "https://mainnet.base.org";

/// Env keys probed (in order) for StarkNet endpoints when none are configured.
pub const STARKNET_RPC_ENV_KEYS: &[&str] = &[
    "STARKNET_RPC_URL",
    "STARKNET_MAINNET_URL",
    "STARKNET_LAVA_URL",
    "STARKNET_1RPC_URL",
    "STARKNET_ONFINALITY_URL",
    "ALCHEMY_RPC_URL",
    "INFURA_RPC_URL",
    "QUICKNODE_ENDPOINT",
];

/// Env keys probed (in order) for source-chain endpoints when none are configured.
pub const EVM_RPC_ENV_KEYS: &[&str] = &["EVM_RPC_URL", "BASE_RPC_URL", "BASE_MAINNET_URL"];

// =============================================================================
// CONTRACTS
// =============================================================================

pub const STARKGATE_BRIDGE: Address = address!("ae0Ee0A63A2cE6BaeEFFE56e7714FB4EFE48D419");

pub const STARKNET_ETH_TOKEN_HEX: &str =
    "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7";

/// Default account class used for activation (Argent v0.4.0 compatible).
pub const ACCOUNT_CLASS_HASH_HEX: &str =
    "0x03131fa018d520a034689b29a785f48d7210eae8a5e759dc432a44372e201d4f";

/// Account classes tried by discovery when none are given.
pub const KNOWN_ACCOUNT_CLASS_HASHES: &[&str] = &[
    ACCOUNT_CLASS_HASH_HEX,
    // OpenZeppelin 0.8.1
    "0x061dac032f228abef9c6626f995015233097ae253a7f72d68552db02f2971b8f",
    // Argent 0.3.0
    "0x036078334509b514626504edc9fb252328d1a240e4e948bef8d0c08dff45927f",
    // OpenZeppelin 0.9.0
    "0x0539f522860b093c83664d4c5709968853f3e828d57d740f941f1738722a4501",
    "0x03331bb0b7b955dfb643775cf5ead54378770cd0b58851eb065b5453c4f15089",
];

lazy_static! {
    pub static ref STARKNET_ETH_TOKEN: Felt = Felt::from_hex_unchecked(STARKNET_ETH_TOKEN_HEX);
    pub static ref ACCOUNT_CLASS_HASH: Felt = Felt::from_hex_unchecked(ACCOUNT_CLASS_HASH_HEX);
}

// =============================================================================
// FINANCIAL DEFAULTS (decimal ETH strings, parsed in config)
// =============================================================================

pub const DEFAULT_ACTIVATION_THRESHOLD_ETH: &str = "0.018";
pub const DEFAULT_GAS_RESERVE_ETH: &str = "0.001";
pub const DEFAULT_MIN_BRIDGE_ETH: &str = "0.001";
pub const DEFAULT_SWEEP_GAS_RESERVE_ETH: &str = "0.0005";
pub const DEFAULT_GHOST_THRESHOLD_ETH: &str = "0.005";
pub const DEFAULT_BRIDGE_FEE_ETH: &str = "0";

pub const DEFAULT_BRIDGE_GAS_LIMIT: u64 = 200_000;
pub const DEFAULT_MAX_GAS_PRICE_GWEI: u64 = 50;

// =============================================================================
// TIMING DEFAULTS (seconds)
// =============================================================================

pub const BALANCE_CHECK_INTERVAL_SECS: u64 = 30;
pub const SENTRY_INTERVAL_SECS: u64 = 300;
pub const BRIDGE_TIMEOUT_SECS: u64 = 300;
pub const MINT_TIMEOUT_SECS: u64 = 3_600;
pub const ACTIVATION_TIMEOUT_SECS: u64 = 600;
pub const GAS_WAIT_TIMEOUT_SECS: u64 = 900;
pub const RPC_TIMEOUT_SECS: u64 = 5;

pub const STATE_FILE_NAME: &str = "recovery_state.json";
