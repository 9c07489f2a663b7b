// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::app::config::{GlobalSettings, Thresholds};
use crate::common::parsing::{gwei_to_wei, wei_to_eth_string};
use crate::domain::error::AppError;
use crate::domain::phase::Phase;
use crate::infrastructure::data::state_store::{
    AccountStatus, BridgePlan, BridgeStatus, BridgeTx, RecoveryRecord, StateStore,
};
use crate::network::evm::ReceiptOutcome;
use crate::network::starknet_client::TxState;
use crate::services::discovery::counterfactual_address;
use crate::services::recovery::gateway::ChainGateway;
use crate::services::recovery::vault::SignerVault;
use alloy::primitives::{B256, U256};
use chrono::Utc;
use starknet::core::types::Felt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct KernelSettings {
    pub thresholds: Thresholds,
    pub bridge_gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub class_hash: Felt,
    pub salt: Felt,
    pub sweep_destination: Option<Felt>,
    pub poll_interval: Duration,
    pub bridge_timeout: Duration,
    pub mint_timeout: Duration,
    pub activation_timeout: Duration,
    pub gas_wait_timeout: Duration,
    pub max_step_errors: u32,
    /// Irreversible actions are only broadcast when set.
    pub execute: bool,
}

impl KernelSettings {
    pub fn from_settings(settings: &GlobalSettings, execute: bool) -> Result<Self, AppError> {
        Ok(Self {
            thresholds: settings.thresholds()?,
            bridge_gas_limit: settings.bridge_gas_limit,
            max_fee_per_gas: gwei_to_wei(settings.max_gas_price_gwei),
            class_hash: settings.account_class_hash_value()?,
            salt: settings.account_salt_value()?,
            sweep_destination: settings.sweep_destination_value()?,
            poll_interval: settings.poll_interval(),
            bridge_timeout: Duration::from_secs(settings.bridge_timeout_secs),
            mint_timeout: Duration::from_secs(settings.mint_timeout_secs),
            activation_timeout: Duration::from_secs(settings.activation_timeout_secs),
            gas_wait_timeout: Duration::from_secs(settings.gas_wait_timeout_secs),
            max_step_errors: settings.max_step_errors.max(1),
            execute,
        })
    }

    fn deadline(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::GasCheck => Some(self.gas_wait_timeout),
            Phase::AwaitingConfirmation => Some(self.bridge_timeout),
            Phase::AwaitingMint => Some(self.mint_timeout),
            Phase::AwaitingDeployment => Some(self.activation_timeout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// Keys are not available in this session.
    Locked,
    /// An irreversible action was reached without `--confirm` (or with `--dry-run`).
    DryRun { action: String },
    /// Waiting ran out (deadline, repeated errors, cancellation); resume later.
    Pending { phase: Phase, reason: String },
    /// The record is already terminal.
    Terminal(Phase),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Advance { to: Phase, message: String },
    Wait(String),
    Halt(HaltReason),
}

/// Dropped deposits tolerated before the mission gives up re-bridging.
const MAX_FAILED_DEPOSITS: usize = 3;

fn advance(to: Phase, message: impl Into<String>) -> StepOutcome {
    StepOutcome::Advance {
        to,
        message: message.into(),
    }
}

fn eth(wei: U256) -> String {
    wei_to_eth_string(wei)
}

/// Drives one recovery mission through its phases, persisting after every step.
pub struct RecoveryKernel<G: ChainGateway> {
    gateway: G,
    vault: SignerVault,
    store: StateStore,
    record: RecoveryRecord,
    settings: KernelSettings,
    cancel: CancellationToken,
    phase_started: Instant,
    consecutive_errors: u32,
}

impl<G: ChainGateway> RecoveryKernel<G> {
    pub fn new(
        gateway: G,
        vault: SignerVault,
        store: StateStore,
        mut record: RecoveryRecord,
        settings: KernelSettings,
        cancel: CancellationToken,
    ) -> Self {
        record.security_unlocked = vault.is_unlocked();
        Self {
            gateway,
            vault,
            store,
            record,
            settings,
            cancel,
            phase_started: Instant::now(),
            consecutive_errors: 0,
        }
    }

    pub fn record(&self) -> &RecoveryRecord {
        &self.record
    }

    /// Adopt a deposit sent outside this mission (by hand or by an earlier
    /// run) and point the record at waiting for it. Returns the phase the
    /// mission will resume in.
    pub async fn adopt_deposit(&mut self, tx_hash: B256) -> Result<Phase, AppError> {
        let phase = self.record.phase;
        if phase.is_terminal() {
            return Err(AppError::State(format!(
                "mission {} is {phase}; pass --fresh to track in a new mission",
                self.record.mission_id
            )));
        }
        if self
            .record
            .bridge_transactions
            .iter()
            .any(|tx| tx.tx_hash == tx_hash)
        {
            tracing::info!(target: "kernel", tx = %tx_hash, "Deposit already tracked");
            return Ok(phase);
        }

        let invalid = |message: String| AppError::Validation {
            field: "tx_hash".into(),
            message,
        };
        let info = self
            .gateway
            .bridge_deposit(tx_hash)
            .await?
            .ok_or_else(|| invalid(format!("{tx_hash} is unknown to the source chain")))?;
        let bridge = self.gateway.bridge_address();
        if info.to != Some(bridge) {
            return Err(invalid(format!(
                "{tx_hash} was sent to {:?}, not the StarkGate bridge {bridge}",
                info.to
            )));
        }
        let (Some(amount), Some(recipient)) = (info.amount, info.l2_recipient) else {
            return Err(invalid(format!("{tx_hash} is not a StarkGate deposit call")));
        };
        let account = self.record.starknet_address;
        if recipient != account {
            return Err(invalid(format!(
                "{tx_hash} credits {recipient:#x}, not {account:#x}"
            )));
        }
        if info.from != self.record.source_address {
            tracing::warn!(
                target: "kernel",
                tx = %tx_hash,
                sender = %info.from,
                source = %self.record.source_address,
                "Deposit was sent from another wallet"
            );
        }

        let receipt = self.gateway.bridge_receipt(tx_hash).await?;
        let status = match receipt {
            None => BridgeStatus::Pending,
            Some(r) if r.success => BridgeStatus::Confirmed,
            Some(_) => BridgeStatus::Failed,
        };
        self.record.bridge_transactions.push(BridgeTx {
            tx_hash,
            amount_wei: amount,
            value_wei: info.value,
            from: info.from,
            l2_recipient: recipient,
            status,
            submitted_at: Utc::now(),
            nonce: Some(info.nonce),
            raw_tx: None,
            block_number: receipt.and_then(|r| r.block_number),
            minted_at: None,
        });
        tracing::info!(
            target: "kernel",
            tx = %tx_hash,
            amount_eth = %eth(amount),
            ?status,
            "Deposit adopted"
        );
        if status == BridgeStatus::Failed {
            self.store.save(&self.record)?;
            return Err(AppError::Transaction {
                hash: tx_hash.to_string(),
                reason: "deposit reverted on the source chain".into(),
            });
        }

        let target = if self.record.has_bridge_in(BridgeStatus::Pending) {
            Phase::AwaitingConfirmation
        } else {
            Phase::AwaitingMint
        };
        let before_mint = matches!(
            phase,
            Phase::Initializing
                | Phase::SecurityLocked
                | Phase::BalanceCheck
                | Phase::GasCheck
                | Phase::Bridging
                | Phase::AwaitingConfirmation
        );
        if before_mint && phase != target {
            self.record
                .transition(target, format!("tracking deposit {tx_hash}"));
            self.phase_started = Instant::now();
        }
        self.store.save(&self.record)?;
        Ok(self.record.phase)
    }

    /// Step until the mission is terminal or a halt is reached.
    pub async fn run(&mut self) -> Result<HaltReason, AppError> {
        loop {
            let phase = self.record.phase;
            match self.step().await? {
                StepOutcome::Advance { .. } => continue,
                StepOutcome::Halt(reason) => return Ok(reason),
                StepOutcome::Wait(reason) => {
                    if let Some(deadline) = self.settings.deadline(phase)
                        && self.phase_started.elapsed() >= deadline
                    {
                        tracing::warn!(
                            target: "kernel",
                            %phase,
                            waited_secs = self.phase_started.elapsed().as_secs(),
                            "Phase deadline reached; mission left pending"
                        );
                        return Ok(HaltReason::Pending {
                            phase,
                            reason: format!("timed out: {reason}"),
                        });
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Ok(HaltReason::Pending {
                                phase,
                                reason: "cancelled".into(),
                            });
                        }
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Execute the handler for the current phase once and persist the record.
    pub async fn step(&mut self) -> Result<StepOutcome, AppError> {
        let phase = self.record.phase;
        if phase.is_terminal() {
            return Ok(StepOutcome::Halt(HaltReason::Terminal(phase)));
        }

        let outcome = match self.handle(phase).await {
            Ok(outcome) => {
                self.consecutive_errors = 0;
                outcome
            }
            Err(AppError::VaultLocked) => StepOutcome::Halt(HaltReason::Locked),
            Err(e) if e.is_transient() => {
                self.consecutive_errors += 1;
                tracing::warn!(
                    target: "kernel",
                    %phase,
                    errors = self.consecutive_errors,
                    error = %e,
                    "Step failed; will retry"
                );
                if self.consecutive_errors >= self.settings.max_step_errors {
                    StepOutcome::Halt(HaltReason::Pending {
                        phase,
                        reason: format!("{} consecutive errors, last: {e}", self.consecutive_errors),
                    })
                } else {
                    StepOutcome::Wait(e.to_string())
                }
            }
            Err(e) => return Err(e),
        };

        match &outcome {
            StepOutcome::Advance { to, message } => {
                tracing::info!(target: "kernel", from = %phase, to = %to, "{message}");
                if *to == Phase::MissionFailed {
                    self.record.fail(message.clone());
                } else {
                    self.record.transition(*to, message.clone());
                }
                self.phase_started = Instant::now();
            }
            StepOutcome::Wait(reason) => {
                tracing::info!(target: "kernel", %phase, "Waiting: {reason}");
                self.record.updated_at = Utc::now();
            }
            StepOutcome::Halt(reason) => {
                tracing::info!(target: "kernel", %phase, ?reason, "Mission halted");
            }
        }
        self.store.save(&self.record)?;
        Ok(outcome)
    }

    async fn handle(&mut self, phase: Phase) -> Result<StepOutcome, AppError> {
        match phase {
            Phase::Initializing => Ok(advance(Phase::SecurityLocked, "mission initialised")),
            Phase::SecurityLocked => Ok(self.check_vault()),
            Phase::BalanceCheck => self.check_balances().await,
            Phase::GasCheck => self.check_gas().await,
            Phase::Bridging => self.bridge().await,
            Phase::AwaitingConfirmation => self.await_confirmation().await,
            Phase::AwaitingMint => self.await_mint().await,
            Phase::Deploying => self.deploy().await,
            Phase::AwaitingDeployment => self.await_deployment().await,
            Phase::Sweeping => self.sweep().await,
            Phase::MissionSuccess | Phase::MissionFailed => {
                Ok(StepOutcome::Halt(HaltReason::Terminal(phase)))
            }
        }
    }

    fn check_vault(&mut self) -> StepOutcome {
        self.record.security_unlocked = self.vault.is_unlocked();
        if self.vault.is_unlocked() {
            advance(Phase::BalanceCheck, "signer vault unlocked")
        } else {
            StepOutcome::Halt(HaltReason::Locked)
        }
    }

    async fn check_balances(&mut self) -> Result<StepOutcome, AppError> {
        let account = self.record.starknet_address;
        let deployed = self.gateway.is_deployed(account).await?;
        let source = self
            .gateway
            .source_balance(self.record.source_address)
            .await?;
        let stark = self.gateway.starknet_balance(account).await?;
        self.record.record_balances(Some(source), Some(stark));
        tracing::info!(
            target: "kernel",
            source_eth = %eth(source),
            starknet_eth = %eth(stark),
            deployed,
            "Balances observed"
        );

        let t = &self.settings.thresholds;
        if deployed {
            self.record.account = AccountStatus::Deployed;
            return Ok(advance(Phase::Sweeping, "account already deployed"));
        }
        if stark >= t.activation_wei {
            return Ok(advance(
                Phase::Deploying,
                format!("StarkNet balance {} ETH covers activation", eth(stark)),
            ));
        }
        if self.record.has_bridge_in(BridgeStatus::Confirmed) {
            return Ok(advance(Phase::AwaitingMint, "confirmed deposit awaiting mint"));
        }
        if self.record.has_bridge_in(BridgeStatus::Pending) {
            return Ok(advance(
                Phase::AwaitingConfirmation,
                "pending deposit awaiting confirmation",
            ));
        }
        let failed = self
            .record
            .bridge_transactions
            .iter()
            .filter(|tx| tx.status == BridgeStatus::Failed)
            .count();
        if failed >= MAX_FAILED_DEPOSITS {
            return Ok(advance(
                Phase::MissionFailed,
                format!("{failed} deposits failed or were dropped; inspect the source wallet"),
            ));
        }
        if source > t.gas_reserve_wei {
            return Ok(advance(
                Phase::GasCheck,
                format!("source holds {} ETH; bridging required", eth(source)),
            ));
        }
        Ok(advance(
            Phase::MissionFailed,
            format!(
                "insufficient balance: source {} ETH, StarkNet {} ETH",
                eth(source),
                eth(stark)
            ),
        ))
    }

    async fn check_gas(&mut self) -> Result<StepOutcome, AppError> {
        let fees = self.gateway.fee_quote().await?;
        if fees.max_fee_per_gas > self.settings.max_fee_per_gas {
            return Ok(StepOutcome::Wait(format!(
                "max fee {:.3} gwei above cap {:.3} gwei",
                fees.max_fee_gwei(),
                self.settings.max_fee_per_gas as f64 / 1e9
            )));
        }

        let balance = self
            .gateway
            .source_balance(self.record.source_address)
            .await?;
        self.record.record_balances(Some(balance), None);

        let t = &self.settings.thresholds;
        let gas_cost =
            U256::from(self.settings.bridge_gas_limit).saturating_mul(U256::from(fees.max_fee_per_gas));
        let deductions = t
            .gas_reserve_wei
            .saturating_add(gas_cost)
            .saturating_add(t.bridge_fee_wei);
        let amount = balance.checked_sub(deductions).unwrap_or(U256::ZERO);
        if amount < t.min_bridge_wei {
            return Ok(advance(
                Phase::MissionFailed,
                format!(
                    "bridge amount {} ETH below minimum {} ETH after gas",
                    eth(amount),
                    eth(t.min_bridge_wei)
                ),
            ));
        }

        let stark = self
            .gateway
            .starknet_balance(self.record.starknet_address)
            .await?;
        self.record.record_balances(None, Some(stark));
        if amount.saturating_add(stark) < t.activation_wei {
            return Ok(advance(
                Phase::MissionFailed,
                format!(
                    "bridge cannot reach activation threshold: {} ETH bridged + {} ETH on StarkNet < {} ETH",
                    eth(amount),
                    eth(stark),
                    eth(t.activation_wei)
                ),
            ));
        }

        self.record.bridge_plan = Some(BridgePlan {
            amount_wei: amount,
            bridge_fee_wei: t.bridge_fee_wei,
            gas_limit: self.settings.bridge_gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            planned_at: Utc::now(),
        });
        Ok(advance(
            Phase::Bridging,
            format!("gas safe; planned bridge of {} ETH", eth(amount)),
        ))
    }

    async fn bridge(&mut self) -> Result<StepOutcome, AppError> {
        if self.record.has_bridge_in(BridgeStatus::Pending) {
            return Ok(advance(
                Phase::AwaitingConfirmation,
                "signed deposit already recorded",
            ));
        }
        let Some(plan) = self.record.bridge_plan.clone() else {
            return Ok(advance(Phase::GasCheck, "no bridge plan recorded; re-quoting"));
        };
        let recipient = self.record.starknet_address;
        if !self.settings.execute {
            return Ok(StepOutcome::Halt(HaltReason::DryRun {
                action: format!(
                    "bridge {} ETH (value {} ETH) to {:#x}",
                    eth(plan.amount_wei),
                    eth(plan.value_wei()),
                    recipient
                ),
            }));
        }

        let signer = self.vault.evm_signer()?;
        let deposit = self.gateway.sign_bridge(signer, &plan, recipient).await?;
        let tx_hash = deposit.hash;
        self.record.bridge_transactions.push(BridgeTx {
            tx_hash,
            amount_wei: plan.amount_wei,
            value_wei: plan.value_wei(),
            from: self.record.source_address,
            l2_recipient: recipient,
            status: BridgeStatus::Pending,
            submitted_at: Utc::now(),
            nonce: Some(deposit.nonce),
            raw_tx: Some(deposit.raw.clone()),
            block_number: None,
            minted_at: None,
        });
        // The hash must be on disk before any node can see the deposit.
        self.store.save(&self.record)?;

        match self.gateway.broadcast_bridge(tx_hash, &deposit.raw).await {
            Ok(()) => Ok(advance(
                Phase::AwaitingConfirmation,
                format!("deposit {tx_hash} broadcast"),
            )),
            Err(e) => {
                tracing::warn!(
                    target: "kernel",
                    tx = %tx_hash,
                    error = %e,
                    "Deposit broadcast unacknowledged; the receipt decides"
                );
                Ok(advance(
                    Phase::AwaitingConfirmation,
                    format!("deposit {tx_hash} signed; broadcast unacknowledged: {e}"),
                ))
            }
        }
    }

    fn bridge_mut(&mut self, tx_hash: B256) -> Result<&mut BridgeTx, AppError> {
        self.record
            .bridge_transactions
            .iter_mut()
            .find(|tx| tx.tx_hash == tx_hash)
            .ok_or_else(|| AppError::State(format!("deposit {tx_hash} vanished from record")))
    }

    async fn await_confirmation(&mut self) -> Result<StepOutcome, AppError> {
        let Some(pending) = self
            .record
            .bridge_transactions
            .iter()
            .rev()
            .find(|tx| tx.status == BridgeStatus::Pending)
            .cloned()
        else {
            return Ok(advance(Phase::BalanceCheck, "no pending deposit to confirm"));
        };
        let tx_hash = pending.tx_hash;

        if let Some(receipt) = self.gateway.bridge_receipt(tx_hash).await? {
            return self.apply_receipt(tx_hash, receipt);
        }

        if let Some(nonce) = pending.nonce
            && self.gateway.source_nonce(pending.from).await? > nonce
        {
            // The nonce moved on; look once more in case it was ours.
            if let Some(receipt) = self.gateway.bridge_receipt(tx_hash).await? {
                return self.apply_receipt(tx_hash, receipt);
            }
            return self.drop_deposit(
                tx_hash,
                format!("deposit {tx_hash} dropped: nonce {nonce} used by another transaction"),
            );
        }

        if self.gateway.bridge_deposit(tx_hash).await?.is_none()
            && let Some(raw) = pending.raw_tx
            && let Err(e) = self.gateway.broadcast_bridge(tx_hash, &raw).await
        {
            return self.drop_deposit(
                tx_hash,
                format!("deposit {tx_hash} unknown to the source chain and rebroadcast failed: {e}"),
            );
        }
        Ok(StepOutcome::Wait(format!("deposit {tx_hash} not mined yet")))
    }

    fn apply_receipt(
        &mut self,
        tx_hash: B256,
        receipt: ReceiptOutcome,
    ) -> Result<StepOutcome, AppError> {
        let tx = self.bridge_mut(tx_hash)?;
        tx.block_number = receipt.block_number;
        tx.raw_tx = None;
        if !receipt.success {
            tx.status = BridgeStatus::Failed;
            return Ok(advance(
                Phase::MissionFailed,
                format!("bridge deposit {tx_hash} reverted"),
            ));
        }
        tx.status = BridgeStatus::Confirmed;
        Ok(advance(
            Phase::AwaitingMint,
            format!("deposit {tx_hash} confirmed"),
        ))
    }

    /// Mark a deposit that will never mine and re-read balances.
    fn drop_deposit(&mut self, tx_hash: B256, message: String) -> Result<StepOutcome, AppError> {
        let tx = self.bridge_mut(tx_hash)?;
        tx.status = BridgeStatus::Failed;
        tx.raw_tx = None;
        self.record.bridge_plan = None;
        Ok(advance(Phase::BalanceCheck, message))
    }

    async fn await_mint(&mut self) -> Result<StepOutcome, AppError> {
        let stark = self
            .gateway
            .starknet_balance(self.record.starknet_address)
            .await?;
        self.record.record_balances(None, Some(stark));
        let activation = self.settings.thresholds.activation_wei;
        if stark < activation {
            return Ok(StepOutcome::Wait(format!(
                "StarkNet balance {} ETH below activation {} ETH",
                eth(stark),
                eth(activation)
            )));
        }
        let now = Utc::now();
        for tx in self
            .record
            .bridge_transactions
            .iter_mut()
            .filter(|tx| tx.status == BridgeStatus::Confirmed)
        {
            tx.status = BridgeStatus::Minted;
            tx.minted_at = Some(now);
        }
        Ok(advance(
            Phase::Deploying,
            format!("funds minted; StarkNet balance {} ETH", eth(stark)),
        ))
    }

    async fn deploy(&mut self) -> Result<StepOutcome, AppError> {
        let account = self.record.starknet_address;
        if self.gateway.is_deployed(account).await? {
            self.record.account = AccountStatus::Deployed;
            return Ok(advance(Phase::Sweeping, "account already deployed"));
        }

        let public_key = self.vault.starknet_public_key()?;
        let derived = counterfactual_address(
            self.settings.class_hash,
            self.settings.salt,
            &[public_key],
        );
        if derived != account {
            return Ok(advance(
                Phase::MissionFailed,
                format!(
                    "address mismatch: key, class hash and salt derive {derived:#x}, not {account:#x}; run search"
                ),
            ));
        }
        if !self.settings.execute {
            return Ok(StepOutcome::Halt(HaltReason::DryRun {
                action: format!("deploy account {account:#x}"),
            }));
        }

        let key = self.vault.starknet_key()?;
        let deployment = self
            .gateway
            .deploy_account(key, self.settings.class_hash, self.settings.salt)
            .await?;
        self.record.account_tx_hash = Some(deployment.tx_hash);
        self.record.account = AccountStatus::Deploying;
        Ok(advance(
            Phase::AwaitingDeployment,
            format!("deploy transaction {:#x} sent", deployment.tx_hash),
        ))
    }

    async fn await_deployment(&mut self) -> Result<StepOutcome, AppError> {
        let Some(tx_hash) = self.record.account_tx_hash else {
            return Ok(advance(Phase::Deploying, "no deployment transaction recorded"));
        };
        match self.gateway.starknet_tx_status(tx_hash).await? {
            TxState::Pending => Ok(StepOutcome::Wait(format!(
                "deployment {tx_hash:#x} not accepted yet"
            ))),
            TxState::Accepted => {
                self.record.account = AccountStatus::Deployed;
                Ok(advance(Phase::Sweeping, "account deployed"))
            }
            TxState::Reverted(reason) => {
                self.record.account = AccountStatus::Failed;
                Ok(advance(
                    Phase::MissionFailed,
                    format!("deployment {tx_hash:#x} reverted: {reason}"),
                ))
            }
            TxState::Rejected => {
                self.record.account = AccountStatus::Failed;
                Ok(advance(
                    Phase::MissionFailed,
                    format!("deployment {tx_hash:#x} rejected"),
                ))
            }
        }
    }

    async fn sweep(&mut self) -> Result<StepOutcome, AppError> {
        if let Some(hash) = self.record.sweep_tx_hash {
            return Ok(advance(
                Phase::MissionSuccess,
                format!("sweep {hash:#x} already sent"),
            ));
        }
        let Some(destination) = self.settings.sweep_destination else {
            return Ok(advance(
                Phase::MissionSuccess,
                "account active; no sweep destination configured",
            ));
        };

        let account = self.record.starknet_address;
        let balance = self.gateway.starknet_balance(account).await?;
        self.record.record_balances(None, Some(balance));
        let amount = balance
            .checked_sub(self.settings.thresholds.sweep_gas_reserve_wei)
            .filter(|a| !a.is_zero());
        let Some(amount) = amount else {
            return Ok(advance(
                Phase::MissionFailed,
                format!("balance {} ETH too low to cover gas", eth(balance)),
            ));
        };
        if !self.settings.execute {
            return Ok(StepOutcome::Halt(HaltReason::DryRun {
                action: format!("sweep {} ETH to {destination:#x}", eth(amount)),
            }));
        }

        let key = self.vault.starknet_key()?;
        let tx_hash = self
            .gateway
            .transfer_eth(key, account, destination, amount)
            .await?;
        self.record.sweep_tx_hash = Some(tx_hash);
        Ok(advance(
            Phase::MissionSuccess,
            format!("swept {} ETH to {destination:#x} in {tx_hash:#x}", eth(amount)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::STARKGATE_BRIDGE;
    use crate::network::evm::{DepositInfo, SignedDeposit};
    use crate::network::gas::GasFees;
    use crate::network::starknet_client::Deployment;
    use alloy::primitives::{Address, Bytes};
    use alloy::signers::local::PrivateKeySigner;
    use async_trait::async_trait;
    use starknet::signers::SigningKey;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EVM_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const STARK_KEY: &str = "0x1234";
    const MILLI: u64 = 1_000_000_000_000_000;

    fn milli_eth(n: u64) -> U256 {
        U256::from(n) * U256::from(MILLI)
    }

    fn deposit_hash(index: usize) -> B256 {
        B256::repeat_byte(0xb0 + index as u8)
    }

    struct FakeChain {
        source: Mutex<U256>,
        starknet: Mutex<U256>,
        deployed: Mutex<bool>,
        max_fee: u128,
        bridge_success: bool,
        /// Broadcasts reach the chain but report an error to the caller.
        broadcast_errors: bool,
        /// Broadcasts never reach the chain.
        broadcast_lost: bool,
        deploy_state: TxState,
        signed: Mutex<Vec<BridgePlan>>,
        landed: Mutex<Vec<B256>>,
        broadcasts: AtomicUsize,
        mined_nonce: Mutex<u64>,
        external: Mutex<Vec<(DepositInfo, Option<ReceiptOutcome>)>>,
        deploys: AtomicUsize,
        transfers: Mutex<Vec<(Felt, U256)>>,
        balance_errors: AtomicUsize,
    }

    impl FakeChain {
        fn funded(source: U256) -> Self {
            Self {
                source: Mutex::new(source),
                starknet: Mutex::new(U256::ZERO),
                deployed: Mutex::new(false),
                max_fee: 1_000_000_000,
                bridge_success: true,
                broadcast_errors: false,
                broadcast_lost: false,
                deploy_state: TxState::Accepted,
                signed: Mutex::new(Vec::new()),
                landed: Mutex::new(Vec::new()),
                broadcasts: AtomicUsize::new(0),
                mined_nonce: Mutex::new(0),
                external: Mutex::new(Vec::new()),
                deploys: AtomicUsize::new(0),
                transfers: Mutex::new(Vec::new()),
                balance_errors: AtomicUsize::new(0),
            }
        }

        fn unavailable(operation: &str) -> AppError {
            AppError::AllProvidersFailed {
                operation: format!("evm {operation}"),
                attempts: 2,
                last_error: "timeout".into(),
            }
        }

        fn landed_info(&self, tx_hash: B256) -> Option<DepositInfo> {
            let index = self.landed.lock().unwrap().iter().position(|h| *h == tx_hash)?;
            let plan = self.signed.lock().unwrap()[index].clone();
            Some(DepositInfo {
                hash: tx_hash,
                from: Address::ZERO,
                to: Some(STARKGATE_BRIDGE),
                nonce: index as u64,
                value: plan.value_wei(),
                amount: Some(plan.amount_wei),
                l2_recipient: None,
            })
        }
    }

    #[async_trait]
    impl ChainGateway for FakeChain {
        fn bridge_address(&self) -> Address {
            STARKGATE_BRIDGE
        }

        async fn source_balance(&self, _address: Address) -> Result<U256, AppError> {
            if self.balance_errors.load(Ordering::SeqCst) > 0 {
                self.balance_errors.fetch_sub(1, Ordering::SeqCst);
                return Err(Self::unavailable("eth_getBalance"));
            }
            Ok(*self.source.lock().unwrap())
        }

        async fn source_nonce(&self, _address: Address) -> Result<u64, AppError> {
            Ok(*self.mined_nonce.lock().unwrap())
        }

        async fn starknet_balance(&self, _account: Felt) -> Result<U256, AppError> {
            Ok(*self.starknet.lock().unwrap())
        }

        async fn is_deployed(&self, _account: Felt) -> Result<bool, AppError> {
            Ok(*self.deployed.lock().unwrap())
        }

        async fn fee_quote(&self) -> Result<GasFees, AppError> {
            Ok(GasFees {
                max_fee_per_gas: self.max_fee,
                max_priority_fee_per_gas: 1_000_000,
                next_base_fee_per_gas: self.max_fee,
                base_fee_per_gas: self.max_fee,
                p50_priority_fee_per_gas: None,
                p90_priority_fee_per_gas: None,
                suggested_max_fee_per_gas: None,
            })
        }

        async fn sign_bridge(
            &self,
            _signer: &PrivateKeySigner,
            plan: &BridgePlan,
            _l2_recipient: Felt,
        ) -> Result<SignedDeposit, AppError> {
            let mut signed = self.signed.lock().unwrap();
            let index = signed.len();
            signed.push(plan.clone());
            Ok(SignedDeposit {
                hash: deposit_hash(index),
                nonce: *self.mined_nonce.lock().unwrap(),
                raw: Bytes::from(vec![index as u8]),
            })
        }

        async fn broadcast_bridge(&self, tx_hash: B256, raw: &Bytes) -> Result<(), AppError> {
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
            if self.broadcast_lost {
                return Err(Self::unavailable("eth_sendRawTransaction"));
            }
            let mut landed = self.landed.lock().unwrap();
            if !landed.contains(&tx_hash) {
                let plan = self.signed.lock().unwrap()[raw[0] as usize].clone();
                let mut source = self.source.lock().unwrap();
                *source = source.saturating_sub(plan.value_wei());
                if self.bridge_success {
                    let mut stark = self.starknet.lock().unwrap();
                    *stark = stark.saturating_add(plan.amount_wei);
                }
                *self.mined_nonce.lock().unwrap() += 1;
                landed.push(tx_hash);
            }
            if self.broadcast_errors {
                return Err(Self::unavailable("eth_sendRawTransaction"));
            }
            Ok(())
        }

        async fn bridge_deposit(&self, tx_hash: B256) -> Result<Option<DepositInfo>, AppError> {
            if let Some(info) = self.landed_info(tx_hash) {
                return Ok(Some(info));
            }
            Ok(self
                .external
                .lock()
                .unwrap()
                .iter()
                .find(|(info, _)| info.hash == tx_hash)
                .map(|(info, _)| info.clone()))
        }

        async fn bridge_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptOutcome>, AppError> {
            if self.landed.lock().unwrap().contains(&tx_hash) {
                return Ok(Some(ReceiptOutcome {
                    success: self.bridge_success,
                    block_number: Some(42),
                }));
            }
            Ok(self
                .external
                .lock()
                .unwrap()
                .iter()
                .find(|(info, _)| info.hash == tx_hash)
                .and_then(|(_, receipt)| *receipt))
        }

        async fn deploy_account(
            &self,
            _key: &SigningKey,
            _class_hash: Felt,
            _salt: Felt,
        ) -> Result<Deployment, AppError> {
            self.deploys.fetch_add(1, Ordering::SeqCst);
            if self.deploy_state == TxState::Accepted {
                *self.deployed.lock().unwrap() = true;
            }
            Ok(Deployment {
                tx_hash: Felt::from(0xdeu64),
                address: Felt::ZERO,
            })
        }

        async fn starknet_tx_status(&self, _tx_hash: Felt) -> Result<TxState, AppError> {
            Ok(self.deploy_state.clone())
        }

        async fn transfer_eth(
            &self,
            _key: &SigningKey,
            _from: Felt,
            to: Felt,
            amount: U256,
        ) -> Result<Felt, AppError> {
            self.transfers.lock().unwrap().push((to, amount));
            Ok(Felt::from(0x5eu64))
        }
    }

    fn settings(execute: bool) -> KernelSettings {
        KernelSettings {
            thresholds: Thresholds {
                activation_wei: milli_eth(18),
                gas_reserve_wei: milli_eth(1),
                min_bridge_wei: milli_eth(1),
                sweep_gas_reserve_wei: U256::from(MILLI / 2),
                ghost_wei: milli_eth(5),
                bridge_fee_wei: U256::ZERO,
            },
            bridge_gas_limit: 200_000,
            max_fee_per_gas: 50_000_000_000,
            class_hash: *crate::domain::constants::ACCOUNT_CLASS_HASH,
            salt: Felt::ZERO,
            sweep_destination: Some(Felt::from(0xfeedu64)),
            poll_interval: Duration::from_millis(1),
            bridge_timeout: Duration::from_secs(5),
            mint_timeout: Duration::from_secs(5),
            activation_timeout: Duration::from_secs(5),
            gas_wait_timeout: Duration::from_millis(20),
            max_step_errors: 3,
            execute,
        }
    }

    fn vault() -> SignerVault {
        SignerVault::unlock_with(EVM_KEY, None, STARK_KEY, None).unwrap()
    }

    fn matching_record(vault: &SignerVault, settings: &KernelSettings) -> RecoveryRecord {
        let pk = vault.starknet_public_key().unwrap();
        let account = counterfactual_address(settings.class_hash, settings.salt, &[pk]);
        RecoveryRecord::new(vault.evm_address().unwrap(), account)
    }

    fn kernel(
        chain: FakeChain,
        vault: SignerVault,
        record: RecoveryRecord,
        settings: KernelSettings,
        dir: &tempfile::TempDir,
    ) -> RecoveryKernel<FakeChain> {
        let store = StateStore::new(dir.path().join("recovery_state.json"));
        RecoveryKernel::new(chain, vault, store, record, settings, CancellationToken::new())
    }

    #[tokio::test]
    async fn happy_path_bridges_deploys_and_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut k = kernel(FakeChain::funded(milli_eth(50)), vault, record, settings, &dir);

        let halt = k.run().await.unwrap();
        assert_eq!(halt, HaltReason::Terminal(Phase::MissionSuccess));

        let record = k.record();
        assert_eq!(record.bridge_transactions.len(), 1);
        assert_eq!(record.bridge_transactions[0].status, BridgeStatus::Minted);
        assert_eq!(record.bridge_transactions[0].block_number, Some(42));
        assert_eq!(record.account, AccountStatus::Deployed);
        assert_eq!(record.sweep_tx_hash, Some(Felt::from(0x5eu64)));

        // 50 - 1 reserve - 200k gas at 1 gwei (0.2 milli) = 48.8 milli bridged.
        let bridged = milli_eth(48) + U256::from(MILLI / 10 * 8);
        assert_eq!(record.total_bridged_wei(), bridged);
        let transfers = k.gateway.transfers.lock().unwrap().clone();
        assert_eq!(
            transfers,
            vec![(Felt::from(0xfeedu64), bridged - U256::from(MILLI / 2))]
        );

        let stored = StateStore::new(dir.path().join("recovery_state.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.phase, Phase::MissionSuccess);
        assert_eq!(stored.history.last().map(|h| h.to), Some(Phase::MissionSuccess));
    }

    #[tokio::test]
    async fn insufficient_balance_fails_mission() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut k = kernel(FakeChain::funded(U256::from(MILLI / 2)), vault, record, settings, &dir);

        assert_eq!(
            k.run().await.unwrap(),
            HaltReason::Terminal(Phase::MissionFailed)
        );
        assert!(
            k.record()
                .failure_reason
                .as_deref()
                .unwrap()
                .starts_with("insufficient balance")
        );
    }

    #[tokio::test]
    async fn dust_after_gas_fails_at_gas_check() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        // 1.5 milli: above the reserve, below reserve + gas + minimum.
        let chain = FakeChain::funded(U256::from(MILLI * 3 / 2));
        let mut k = kernel(chain, vault, record, settings, &dir);

        k.run().await.unwrap();
        assert_eq!(k.record().phase, Phase::MissionFailed);
        assert!(k.record().history.iter().any(|h| h.from == Phase::GasCheck));
    }

    #[tokio::test]
    async fn dry_run_halts_before_bridging_without_recording_a_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(false);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut k = kernel(FakeChain::funded(milli_eth(50)), vault, record, settings, &dir);

        let halt = k.run().await.unwrap();
        assert!(matches!(halt, HaltReason::DryRun { .. }));
        assert_eq!(k.record().phase, Phase::Bridging);
        assert!(k.record().bridge_transactions.is_empty());
        assert!(k.record().bridge_plan.is_some());
        assert!(k.gateway.signed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deployed_account_skips_straight_to_sweeping() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let chain = FakeChain::funded(U256::ZERO);
        *chain.deployed.lock().unwrap() = true;
        *chain.starknet.lock().unwrap() = milli_eth(3);
        let mut k = kernel(chain, vault, record, settings, &dir);

        k.run().await.unwrap();
        let phases: Vec<Phase> = k.record().history.iter().map(|h| h.to).collect();
        assert_eq!(
            phases,
            vec![
                Phase::SecurityLocked,
                Phase::BalanceCheck,
                Phase::Sweeping,
                Phase::MissionSuccess
            ]
        );
        assert_eq!(k.gateway.deploys.load(Ordering::SeqCst), 0);
        assert!(k.gateway.signed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn address_mismatch_fails_before_deploying() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = RecoveryRecord::new(vault.evm_address().unwrap(), Felt::from(0xbadu64));
        let chain = FakeChain::funded(U256::ZERO);
        *chain.starknet.lock().unwrap() = milli_eth(20);
        let mut k = kernel(chain, vault, record, settings, &dir);

        k.run().await.unwrap();
        assert_eq!(k.record().phase, Phase::MissionFailed);
        assert!(k.record().failure_reason.as_deref().unwrap().contains("run search"));
        assert_eq!(k.gateway.deploys.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reverted_bridge_fails_mission() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut chain = FakeChain::funded(milli_eth(50));
        chain.bridge_success = false;
        let mut k = kernel(chain, vault, record, settings, &dir);

        k.run().await.unwrap();
        let record = k.record();
        assert_eq!(record.phase, Phase::MissionFailed);
        assert_eq!(record.bridge_transactions[0].status, BridgeStatus::Failed);
        assert_eq!(record.total_bridged_wei(), U256::ZERO);
    }

    #[tokio::test]
    async fn rejected_deployment_marks_account_failed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut chain = FakeChain::funded(U256::ZERO);
        *chain.starknet.lock().unwrap() = milli_eth(20);
        chain.deploy_state = TxState::Rejected;
        let mut k = kernel(chain, vault, record, settings, &dir);

        k.run().await.unwrap();
        assert_eq!(k.record().phase, Phase::MissionFailed);
        assert_eq!(k.record().account, AccountStatus::Failed);
    }

    #[tokio::test]
    async fn terminal_record_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let mut record = matching_record(&vault, &settings);
        record.fail("earlier failure");
        let history = record.history.len();
        let mut k = kernel(FakeChain::funded(milli_eth(50)), vault, record, settings, &dir);

        assert_eq!(
            k.step().await.unwrap(),
            StepOutcome::Halt(HaltReason::Terminal(Phase::MissionFailed))
        );
        assert_eq!(k.record().history.len(), history);
        assert!(k.gateway.signed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn locked_vault_halts_in_security_locked() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let record = RecoveryRecord::new(Address::repeat_byte(1), Felt::ONE);
        let mut k = kernel(
            FakeChain::funded(milli_eth(50)),
            SignerVault::locked(),
            record,
            settings,
            &dir,
        );

        assert_eq!(k.run().await.unwrap(), HaltReason::Locked);
        assert_eq!(k.record().phase, Phase::SecurityLocked);
        assert!(!k.record().security_unlocked);
    }

    #[tokio::test]
    async fn gas_above_cap_waits_until_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut chain = FakeChain::funded(milli_eth(50));
        chain.max_fee = 100_000_000_000;
        let mut k = kernel(chain, vault, record, settings, &dir);

        let halt = k.run().await.unwrap();
        assert!(matches!(
            halt,
            HaltReason::Pending {
                phase: Phase::GasCheck,
                ..
            }
        ));
        assert!(k.record().bridge_plan.is_none());
    }

    #[tokio::test]
    async fn provider_errors_wait_then_halt_pending() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let chain = FakeChain::funded(milli_eth(50));
        chain.balance_errors.store(10, Ordering::SeqCst);
        let mut k = kernel(chain, vault, record, settings, &dir);

        let halt = k.run().await.unwrap();
        assert!(matches!(
            halt,
            HaltReason::Pending {
                phase: Phase::BalanceCheck,
                ..
            }
        ));
        assert_eq!(k.gateway.balance_errors.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn transient_error_recovers_on_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let chain = FakeChain::funded(milli_eth(50));
        chain.balance_errors.store(1, Ordering::SeqCst);
        let mut k = kernel(chain, vault, record, settings, &dir);

        assert_eq!(
            k.run().await.unwrap(),
            HaltReason::Terminal(Phase::MissionSuccess)
        );
    }

    #[tokio::test]
    async fn unacknowledged_broadcast_is_recorded_and_confirmed_by_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut chain = FakeChain::funded(milli_eth(50));
        chain.broadcast_errors = true;
        let mut k = kernel(chain, vault, record, settings, &dir);

        while k.record().phase != Phase::Bridging {
            k.step().await.unwrap();
        }
        assert!(matches!(
            k.step().await.unwrap(),
            StepOutcome::Advance {
                to: Phase::AwaitingConfirmation,
                ..
            }
        ));
        let stored = StateStore::new(dir.path().join("recovery_state.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.bridge_transactions.len(), 1);
        assert_eq!(stored.bridge_transactions[0].tx_hash, deposit_hash(0));
        assert_eq!(stored.bridge_transactions[0].status, BridgeStatus::Pending);
        assert!(stored.bridge_transactions[0].raw_tx.is_some());

        assert_eq!(
            k.run().await.unwrap(),
            HaltReason::Terminal(Phase::MissionSuccess)
        );
        assert_eq!(k.gateway.signed.lock().unwrap().len(), 1);
        assert_eq!(k.gateway.broadcasts.load(Ordering::SeqCst), 1);
        let tx = &k.record().bridge_transactions[0];
        assert_eq!(tx.status, BridgeStatus::Minted);
        assert!(tx.raw_tx.is_none());
    }

    #[tokio::test]
    async fn lost_deposits_are_dropped_then_mission_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let mut chain = FakeChain::funded(milli_eth(50));
        chain.broadcast_lost = true;
        let mut k = kernel(chain, vault, record, settings, &dir);

        assert_eq!(
            k.run().await.unwrap(),
            HaltReason::Terminal(Phase::MissionFailed)
        );
        let record = k.record();
        assert_eq!(record.bridge_transactions.len(), MAX_FAILED_DEPOSITS);
        assert!(
            record
                .bridge_transactions
                .iter()
                .all(|tx| tx.status == BridgeStatus::Failed)
        );
        assert!(record.failure_reason.as_deref().unwrap().contains("dropped"));
        // One broadcast and one rebroadcast per deposit.
        assert_eq!(
            k.gateway.broadcasts.load(Ordering::SeqCst),
            2 * MAX_FAILED_DEPOSITS
        );
        assert_eq!(*k.gateway.source.lock().unwrap(), milli_eth(50));
    }

    #[tokio::test]
    async fn bridge_short_of_activation_fails_before_signing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        // 10 - 1 reserve - 0.2 gas = 8.8 milli, short of the 18 milli activation.
        let mut k = kernel(FakeChain::funded(milli_eth(10)), vault, record, settings, &dir);

        assert_eq!(
            k.run().await.unwrap(),
            HaltReason::Terminal(Phase::MissionFailed)
        );
        let record = k.record();
        assert!(
            record
                .failure_reason
                .as_deref()
                .unwrap()
                .starts_with("bridge cannot reach activation threshold")
        );
        assert_eq!(record.history.last().map(|h| h.from), Some(Phase::GasCheck));
        assert!(record.bridge_plan.is_none());
        assert!(k.gateway.signed.lock().unwrap().is_empty());
    }

    fn external_deposit(
        chain: &FakeChain,
        to: Address,
        recipient: Felt,
        receipt: Option<ReceiptOutcome>,
    ) -> B256 {
        let hash = B256::repeat_byte(0xe1);
        chain.external.lock().unwrap().push((
            DepositInfo {
                hash,
                from: Address::repeat_byte(0x33),
                to: Some(to),
                nonce: 12,
                value: milli_eth(20),
                amount: Some(milli_eth(20)),
                l2_recipient: Some(recipient),
            },
            receipt,
        ));
        hash
    }

    #[tokio::test]
    async fn adopted_confirmed_deposit_resumes_at_mint() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let account = record.starknet_address;
        let chain = FakeChain::funded(U256::ZERO);
        *chain.starknet.lock().unwrap() = milli_eth(20);
        let hash = external_deposit(
            &chain,
            STARKGATE_BRIDGE,
            account,
            Some(ReceiptOutcome {
                success: true,
                block_number: Some(7),
            }),
        );
        let mut k = kernel(chain, vault, record, settings, &dir);

        assert_eq!(k.adopt_deposit(hash).await.unwrap(), Phase::AwaitingMint);
        let tx = &k.record().bridge_transactions[0];
        assert_eq!(tx.status, BridgeStatus::Confirmed);
        assert_eq!(tx.block_number, Some(7));
        assert_eq!(tx.amount_wei, milli_eth(20));
        // Adopting twice is a no-op.
        assert_eq!(k.adopt_deposit(hash).await.unwrap(), Phase::AwaitingMint);
        assert_eq!(k.record().bridge_transactions.len(), 1);

        assert_eq!(
            k.run().await.unwrap(),
            HaltReason::Terminal(Phase::MissionSuccess)
        );
        assert_eq!(k.record().bridge_transactions[0].status, BridgeStatus::Minted);
        assert!(k.gateway.signed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn adopted_unmined_deposit_waits_for_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let account = record.starknet_address;
        let chain = FakeChain::funded(U256::ZERO);
        let hash = external_deposit(&chain, STARKGATE_BRIDGE, account, None);
        let mut k = kernel(chain, vault, record, settings, &dir);

        assert_eq!(
            k.adopt_deposit(hash).await.unwrap(),
            Phase::AwaitingConfirmation
        );
        assert_eq!(k.record().bridge_transactions[0].status, BridgeStatus::Pending);
        let stored = StateStore::new(dir.path().join("recovery_state.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.phase, Phase::AwaitingConfirmation);
    }

    #[tokio::test]
    async fn adopting_rejects_unknown_and_misdirected_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let account = record.starknet_address;
        let chain = FakeChain::funded(U256::ZERO);
        let wrong_contract = external_deposit(&chain, Address::repeat_byte(9), account, None);
        let mut k = kernel(chain, vault, record, settings, &dir);

        assert!(matches!(
            k.adopt_deposit(wrong_contract).await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            k.adopt_deposit(B256::repeat_byte(0x77)).await,
            Err(AppError::Validation { .. })
        ));
        assert!(k.record().bridge_transactions.is_empty());
        assert_eq!(k.record().phase, Phase::Initializing);
    }

    #[tokio::test]
    async fn adopting_into_a_finished_mission_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let mut record = matching_record(&vault, &settings);
        let account = record.starknet_address;
        record.fail("earlier failure");
        let chain = FakeChain::funded(U256::ZERO);
        let hash = external_deposit(&chain, STARKGATE_BRIDGE, account, None);
        let mut k = kernel(chain, vault, record, settings, &dir);

        assert!(matches!(
            k.adopt_deposit(hash).await,
            Err(AppError::State(_))
        ));
        assert!(k.record().bridge_transactions.is_empty());
    }

    #[tokio::test]
    async fn deposit_for_another_account_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(true);
        let vault = vault();
        let record = matching_record(&vault, &settings);
        let chain = FakeChain::funded(U256::ZERO);
        let hash = external_deposit(&chain, STARKGATE_BRIDGE, Felt::from(0xbadu64), None);
        let mut k = kernel(chain, vault, record, settings, &dir);

        let err = k.adopt_deposit(hash).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { ref message, .. } if message.contains("credits")));
        assert!(k.record().bridge_transactions.is_empty());
    }
}
