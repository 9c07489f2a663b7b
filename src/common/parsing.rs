// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::primitives::U256;
use alloy::primitives::utils::{format_ether, parse_ether};
use starknet::core::types::Felt;

pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Split a comma/space/semicolon separated list, dropping empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn parse_felt(field: &str, raw: &str) -> Result<Felt, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation {
            field: field.to_string(),
            message: "empty value".into(),
        });
    }
    let parsed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        Felt::from_hex(&format!("0x{}", strip_0x(trimmed)))
    } else {
        Felt::from_dec_str(trimmed)
    };
    parsed.map_err(|e| AppError::Validation {
        field: field.to_string(),
        message: format!("not a field element: {e}"),
    })
}

/// Parse a decimal ETH amount ("0.018") into wei.
pub fn parse_eth_amount(field: &str, raw: &str) -> Result<U256, AppError> {
    parse_ether(raw.trim()).map_err(|e| AppError::Validation {
        field: field.to_string(),
        message: format!("invalid ETH amount {raw:?}: {e}"),
    })
}

pub fn wei_to_eth_string(wei: U256) -> String {
    format_ether(wei)
}

pub fn gwei_to_wei(gwei: u64) -> u128 {
    (gwei as u128).saturating_mul(1_000_000_000)
}

pub fn felt_to_u256(value: Felt) -> U256 {
    U256::from_be_bytes(value.to_bytes_be())
}

/// `None` when the value does not fit below the field prime.
pub fn u256_to_felt(value: U256) -> Option<Felt> {
    let felt = Felt::from_bytes_be(&value.to_be_bytes::<32>());
    (felt_to_u256(felt) == value).then_some(felt)
}

/// Combine a Cairo Uint256 (`low`, `high` 128-bit halves) into one value.
pub fn uint256_from_felts(low: Felt, high: Felt) -> U256 {
    (felt_to_u256(high) << 128) | felt_to_u256(low)
}

/// Split a value into the Cairo Uint256 (`low`, `high`) calldata pair.
pub fn uint256_to_felts(value: U256) -> (Felt, Felt) {
    let mask = U256::from(u128::MAX);
    let low = value & mask;
    let high: U256 = value >> 128;
    (
        Felt::from_bytes_be(&low.to_be_bytes::<32>()),
        Felt::from_bytes_be(&high.to_be_bytes::<32>()),
    )
}
