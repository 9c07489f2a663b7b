// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use starknet::core::types::Felt;
use starknet::core::utils::get_contract_address;
use std::fmt;
use tokio_util::sync::CancellationToken;

const PROGRESS_EVERY: u64 = 5_000;

/// Address a DEPLOY_ACCOUNT with this class, salt and calldata would land at
/// (deployer is always zero for account self-deployment).
pub fn counterfactual_address(class_hash: Felt, salt: Felt, calldata: &[Felt]) -> Felt {
    get_contract_address(salt, class_hash, calldata, Felt::ZERO)
}

/// Constructor calldata shapes used by common account classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalldataPattern {
    Key,
    KeyZero,
    KeyOne,
    KeySalt,
}

impl CalldataPattern {
    pub const ALL: [CalldataPattern; 4] = [
        CalldataPattern::Key,
        CalldataPattern::KeyZero,
        CalldataPattern::KeyOne,
        CalldataPattern::KeySalt,
    ];

    pub fn calldata(self, public_key: Felt, salt: Felt) -> Vec<Felt> {
        match self {
            CalldataPattern::Key => vec![public_key],
            CalldataPattern::KeyZero => vec![public_key, Felt::ZERO],
            CalldataPattern::KeyOne => vec![public_key, Felt::ONE],
            CalldataPattern::KeySalt => vec![public_key, salt],
        }
    }
}

impl fmt::Display for CalldataPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CalldataPattern::Key => "[pk]",
            CalldataPattern::KeyZero => "[pk, 0]",
            CalldataPattern::KeyOne => "[pk, 1]",
            CalldataPattern::KeySalt => "[pk, salt]",
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchSpace {
    pub class_hashes: Vec<Felt>,
    pub salt_range: u64,
    pub public_key: Felt,
    pub patterns: Vec<CalldataPattern>,
}

impl SearchSpace {
    /// Salts `0..salt_range` plus the public key itself, every pattern.
    pub fn new(class_hashes: Vec<Felt>, salt_range: u64, public_key: Felt) -> Self {
        Self {
            class_hashes,
            salt_range,
            public_key,
            patterns: CalldataPattern::ALL.to_vec(),
        }
    }

    fn key_outside_range(&self) -> bool {
        self.public_key >= Felt::from(self.salt_range)
    }

    /// Lazily yields every salt; the range is never materialised.
    pub fn salts(&self) -> impl Iterator<Item = Felt> + '_ {
        (0..self.salt_range)
            .map(Felt::from)
            .chain(self.key_outside_range().then_some(self.public_key))
    }

    pub fn salt_count(&self) -> u64 {
        self.salt_range
            .saturating_add(u64::from(self.key_outside_range()))
    }

    pub fn size(&self) -> u64 {
        (self.class_hashes.len() as u64)
            .saturating_mul(self.salt_count())
            .saturating_mul(self.patterns.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMatch {
    pub class_hash: Felt,
    pub salt: Felt,
    pub pattern: CalldataPattern,
    pub calldata: Vec<Felt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(AccountMatch),
    NotFound { tested: u64 },
    Cancelled { tested: u64 },
}

/// Blocking scan of the space; run it off the async runtime.
pub fn search(target: Felt, space: &SearchSpace, cancel: &CancellationToken) -> SearchOutcome {
    let total = space.size();
    let public_key = space.public_key;
    tracing::info!(
        target: "discovery",
        target_address = %format!("{target:#x}"),
        classes = space.class_hashes.len(),
        salts = space.salt_count(),
        total,
        "Searching account parameters"
    );

    let mut tested = 0u64;
    for &class_hash in &space.class_hashes {
        for salt in space.salts() {
            if cancel.is_cancelled() {
                tracing::warn!(target: "discovery", tested, total, "Search cancelled");
                return SearchOutcome::Cancelled { tested };
            }
            for &pattern in &space.patterns {
                let calldata = pattern.calldata(public_key, salt);
                tested += 1;
                if counterfactual_address(class_hash, salt, &calldata) == target {
                    tracing::info!(
                        target: "discovery",
                        class_hash = %format!("{class_hash:#x}"),
                        salt = %format!("{salt:#x}"),
                        %pattern,
                        tested,
                        "Account parameters found"
                    );
                    return SearchOutcome::Found(AccountMatch {
                        class_hash,
                        salt,
                        pattern,
                        calldata,
                    });
                }
                if tested % PROGRESS_EVERY == 0 {
                    tracing::debug!(target: "discovery", tested, total, "Search progress");
                }
            }
        }
    }
    tracing::warn!(target: "discovery", tested, "No matching account parameters");
    SearchOutcome::NotFound { tested }
}
