// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::phase::Phase;
use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    Pending,
    Confirmed,
    Minted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeTx {
    pub tx_hash: B256,
    pub amount_wei: U256,
    pub value_wei: U256,
    pub from: Address,
    pub l2_recipient: Felt,
    pub status: BridgeStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Signed bytes, kept until mined so the deposit can be rebroadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tx: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minted_at: Option<DateTime<Utc>>,
}

/// Amounts fixed by the gas-safety check, consumed by the bridge step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgePlan {
    pub amount_wei: U256,
    pub bridge_fee_wei: U256,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub planned_at: DateTime<Utc>,
}

impl BridgePlan {
    /// Value attached to the deposit call (amount plus L1->L2 message fee).
    pub fn value_wei(&self) -> U256 {
        self.amount_wei.saturating_add(self.bridge_fee_wei)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub source_wei: Option<U256>,
    pub starknet_wei: Option<U256>,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    NotDeployed,
    Deploying,
    Deployed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub at: DateTime<Utc>,
    pub from: Phase,
    pub to: Phase,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeSummary {
    pub pending: usize,
    pub confirmed: usize,
    pub minted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub mission_id: String,
    pub phase: Phase,
    pub source_address: Address,
    pub starknet_address: Felt,
    #[serde(default)]
    pub bridge_transactions: Vec<BridgeTx>,
    #[serde(default)]
    pub bridge_plan: Option<BridgePlan>,
    #[serde(default)]
    pub balances: BalanceSnapshot,
    #[serde(default)]
    pub account: AccountStatus,
    #[serde(default)]
    pub account_tx_hash: Option<Felt>,
    #[serde(default)]
    pub sweep_tx_hash: Option<Felt>,
    #[serde(default)]
    pub security_unlocked: bool,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub history: Vec<PhaseTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecoveryRecord {
    pub fn new(source_address: Address, starknet_address: Felt) -> Self {
        let now = Utc::now();
        Self {
            mission_id: format!("mission-{}", now.format("%Y%m%dT%H%M%SZ")),
            phase: Phase::Initializing,
            source_address,
            starknet_address,
            bridge_transactions: Vec::new(),
            bridge_plan: None,
            balances: BalanceSnapshot::default(),
            account: AccountStatus::NotDeployed,
            account_tx_hash: None,
            sweep_tx_hash: None,
            security_unlocked: false,
            failure_reason: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn belongs_to(&self, source_address: Address, starknet_address: Felt) -> bool {
        self.source_address == source_address && self.starknet_address == starknet_address
    }

    pub fn transition(&mut self, to: Phase, message: impl Into<String>) {
        let now = Utc::now();
        self.history.push(PhaseTransition {
            at: now,
            from: self.phase,
            to,
            message: message.into(),
        });
        self.phase = to;
        self.updated_at = now;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.failure_reason = Some(reason.clone());
        self.transition(Phase::MissionFailed, reason);
    }

    pub fn record_balances(&mut self, source_wei: Option<U256>, starknet_wei: Option<U256>) {
        if source_wei.is_some() {
            self.balances.source_wei = source_wei;
        }
        if starknet_wei.is_some() {
            self.balances.starknet_wei = starknet_wei;
        }
        self.balances.observed_at = Some(Utc::now());
    }

    /// Sum of bridged amounts, failed deposits excluded.
    pub fn total_bridged_wei(&self) -> U256 {
        self.bridge_transactions
            .iter()
            .filter(|tx| tx.status != BridgeStatus::Failed)
            .fold(U256::ZERO, |acc, tx| acc.saturating_add(tx.amount_wei))
    }

    pub fn bridge_summary(&self) -> BridgeSummary {
        let mut summary = BridgeSummary::default();
        for tx in &self.bridge_transactions {
            match tx.status {
                BridgeStatus::Pending => summary.pending += 1,
                BridgeStatus::Confirmed => summary.confirmed += 1,
                BridgeStatus::Minted => summary.minted += 1,
                BridgeStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn has_bridge_in(&self, status: BridgeStatus) -> bool {
        self.bridge_transactions.iter().any(|tx| tx.status == status)
    }
}

/// Single-file JSON persistence with atomic replace.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "recovery_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn load(&self) -> Result<Option<RecoveryRecord>, AppError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::State(format!(
                    "read {} failed: {e}",
                    self.path.display()
                )));
            }
        };
        let record = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::State(format!("{} is not a recovery record: {e}", self.path.display()))
        })?;
        Ok(Some(record))
    }

    pub fn save(&self, record: &RecoveryRecord) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::State(format!("create {} failed: {e}", parent.display())))?;
        }
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| AppError::State(format!("serialize record failed: {e}")))?;
        let tmp = self.temp_path();
        fs::write(&tmp, json)
            .map_err(|e| AppError::State(format!("write {} failed: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::State(format!("replace {} failed: {e}", self.path.display()))
        })?;
        tracing::debug!(
            target: "state",
            mission = %record.mission_id,
            phase = %record.phase,
            "Recovery record saved"
        );
        Ok(())
    }

    /// Resume the stored mission for these addresses, or start a new one.
    /// A stored record for other addresses is only replaced when `fresh` is set.
    pub fn open_mission(
        &self,
        source_address: Address,
        starknet_address: Felt,
        fresh: bool,
    ) -> Result<RecoveryRecord, AppError> {
        match self.load()? {
            Some(record) if !fresh => {
                if !record.belongs_to(source_address, starknet_address) {
                    return Err(AppError::State(format!(
                        "{} holds mission {} for {} / {:#x}; pass --fresh to replace it",
                        self.path.display(),
                        record.mission_id,
                        record.source_address,
                        record.starknet_address
                    )));
                }
                tracing::info!(
                    target: "state",
                    mission = %record.mission_id,
                    phase = %record.phase,
                    "Resuming recovery mission"
                );
                Ok(record)
            }
            previous => {
                if let Some(old) = previous {
                    tracing::warn!(
                        target: "state",
                        replaced = %old.mission_id,
                        "Starting fresh mission over existing record"
                    );
                }
                let record = RecoveryRecord::new(source_address, starknet_address);
                self.save(&record)?;
                tracing::info!(target: "state", mission = %record.mission_id, "New recovery mission");
                Ok(record)
            }
        }
    }
}
