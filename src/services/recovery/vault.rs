// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::app::config::GlobalSettings;
use crate::common::parsing::parse_felt;
use crate::domain::error::AppError;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use starknet::core::types::Felt;
use starknet::signers::SigningKey;
use std::str::FromStr;

struct VaultKeys {
    evm: PrivateKeySigner,
    starknet: SigningKey,
}

/// Session key material. Nothing is persisted; a locked vault holds no
/// mission keys. The ghost key loads on its own so the sentry can run
/// without them.
#[derive(Default)]
pub struct SignerVault {
    keys: Option<VaultKeys>,
    ghost: Option<SigningKey>,
}

impl std::fmt::Debug for SignerVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerVault")
            .field("unlocked", &self.is_unlocked())
            .field("ghost", &self.ghost.is_some())
            .finish()
    }
}

fn starknet_key(field: &str, raw: &str) -> Result<SigningKey, AppError> {
    let secret = parse_felt(field, raw)?;
    if secret == Felt::ZERO {
        return Err(AppError::Validation {
            field: field.to_string(),
            message: "private key cannot be zero".into(),
        });
    }
    Ok(SigningKey::from_secret_scalar(secret))
}

fn ghost_key(raw: Option<&str>) -> Result<Option<SigningKey>, AppError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| starknet_key("ghost_key", raw))
        .transpose()
}

impl SignerVault {
    pub fn locked() -> Self {
        Self::default()
    }

    /// Parse the configured keys. The EVM key must control `expected_source`
    /// when one is configured.
    pub fn unlock_with(
        source_key: &str,
        expected_source: Option<Address>,
        starknet_raw: &str,
        ghost_raw: Option<&str>,
    ) -> Result<Self, AppError> {
        let evm = PrivateKeySigner::from_str(source_key.trim())
            .map_err(|e| AppError::Config(format!("Invalid source key: {}", e)))?;
        if let Some(expected) = expected_source
            && evm.address() != expected
        {
            return Err(AppError::Validation {
                field: "source_key".into(),
                message: format!(
                    "key controls {:#x}, configured source is {:#x}",
                    evm.address(),
                    expected
                ),
            });
        }
        let starknet = starknet_key("starknet_key", starknet_raw)?;
        let ghost = ghost_key(ghost_raw)?;
        tracing::info!(
            target: "vault",
            source = %evm.address(),
            starknet_public_key = %format!("{:#x}", starknet.verifying_key().scalar()),
            ghost = ghost.is_some(),
            "Signer vault unlocked"
        );
        Ok(Self {
            keys: Some(VaultKeys { evm, starknet }),
            ghost,
        })
    }

    /// Vault holding only the ghost key (sentry sweeps).
    pub fn ghost_only(ghost_raw: Option<&str>) -> Result<Self, AppError> {
        Ok(Self {
            keys: None,
            ghost: ghost_key(ghost_raw)?,
        })
    }

    /// Unlock from settings; missing or invalid keys leave the vault locked.
    /// The ghost key is kept even when the mission keys are unavailable.
    pub fn from_settings(settings: &GlobalSettings) -> Self {
        let ghost_raw = settings.ghost_key.as_deref();
        let fallback = || {
            Self::ghost_only(ghost_raw).unwrap_or_else(|e| {
                tracing::warn!(target: "vault", error = %e, "Ghost key rejected");
                Self::locked()
            })
        };
        let (Some(source), Some(stark)) = (&settings.source_key, &settings.starknet_key) else {
            tracing::warn!(target: "vault", "Source or StarkNet key missing; vault stays locked");
            return fallback();
        };
        match Self::unlock_with(source, settings.source_address, stark, ghost_raw) {
            Ok(vault) => vault,
            Err(e) => {
                tracing::warn!(target: "vault", error = %e, "Vault unlock failed");
                fallback()
            }
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.keys.is_some()
    }

    fn keys(&self) -> Result<&VaultKeys, AppError> {
        self.keys.as_ref().ok_or(AppError::VaultLocked)
    }

    pub fn evm_signer(&self) -> Result<&PrivateKeySigner, AppError> {
        Ok(&self.keys()?.evm)
    }

    pub fn evm_address(&self) -> Option<Address> {
        self.keys.as_ref().map(|k| k.evm.address())
    }

    pub fn starknet_key(&self) -> Result<&SigningKey, AppError> {
        Ok(&self.keys()?.starknet)
    }

    pub fn starknet_public_key(&self) -> Result<Felt, AppError> {
        Ok(self.keys()?.starknet.verifying_key().scalar())
    }

    pub fn ghost_key(&self) -> Option<&SigningKey> {
        self.ghost.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Anvil account #0; public test vector.
    const EVM_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn unlocks_when_key_controls_source() {
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        let vault = SignerVault::unlock_with(EVM_KEY, Some(expected), "0x1234", None).unwrap();
        assert!(vault.is_unlocked());
        assert_eq!(vault.evm_address(), Some(expected));
        assert!(vault.ghost_key().is_none());
        assert_ne!(vault.starknet_public_key().unwrap(), Felt::ZERO);
    }

    #[test]
    fn rejects_key_for_another_source() {
        let err = SignerVault::unlock_with(EVM_KEY, Some(Address::repeat_byte(1)), "0x1234", None)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn zero_starknet_key_is_rejected_and_locked_vault_refuses() {
        assert!(SignerVault::unlock_with(EVM_KEY, None, "0x0", None).is_err());
        let vault = SignerVault::locked();
        assert!(matches!(vault.evm_signer(), Err(AppError::VaultLocked)));
        assert!(matches!(vault.starknet_public_key(), Err(AppError::VaultLocked)));
    }

    #[test]
    fn ghost_key_loads_without_mission_keys() {
        let vault = SignerVault::ghost_only(Some(" 0x77 ")).unwrap();
        assert!(!vault.is_unlocked());
        assert_eq!(
            vault.ghost_key().map(|k| k.secret_scalar()),
            Some(Felt::from(0x77u64))
        );
        assert!(SignerVault::ghost_only(Some("")).unwrap().ghost_key().is_none());
        assert!(SignerVault::ghost_only(Some("0x0")).is_err());
    }
}
