// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::{felt_to_u256, u256_to_felt};
use crate::domain::error::AppError;
use crate::infrastructure::data::state_store::BridgePlan;
use crate::network::gas::{GasFees, GasOracle};
use crate::network::provider::EvmPool;
use alloy::consensus::{SignableTransaction, Transaction as _, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::eip2930::AccessList;
use alloy::network::{TransactionResponse, TxSignerSync};
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use starknet::core::types::Felt;
use std::sync::Arc;

sol! {
    interface IStarkgateBridge {
        function deposit(uint256 amount, uint256 l2Recipient) external payable;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptOutcome {
    pub success: bool,
    pub block_number: Option<u64>,
}

/// A signed deposit that has not necessarily reached any node yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDeposit {
    pub hash: B256,
    pub nonce: u64,
    pub raw: Bytes,
}

/// What a node knows about a source-chain transaction, with the StarkGate
/// `deposit` arguments when the input decodes as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositInfo {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub amount: Option<U256>,
    pub l2_recipient: Option<Felt>,
}

/// Source-chain client: balances, nonces, fee quotes and the bridge deposit.
#[derive(Clone)]
pub struct EvmClient {
    pool: Arc<EvmPool>,
    gas: GasOracle,
    chain_id: u64,
}

impl EvmClient {
    pub fn new(pool: Arc<EvmPool>, chain_id: u64) -> Self {
        let gas = GasOracle::new(pool.clone(), chain_id);
        Self {
            pool,
            gas,
            chain_id,
        }
    }

    pub fn pool(&self) -> &EvmPool {
        &self.pool
    }

    pub async fn balance(&self, address: Address) -> Result<U256, AppError> {
        self.pool
            .call("eth_getBalance", |provider| async move {
                provider.get_balance(address).await
            })
            .await
    }

    pub async fn nonce(&self, address: Address) -> Result<u64, AppError> {
        self.pool
            .call("eth_getTransactionCount", |provider| async move {
                provider.get_transaction_count(address).pending().await
            })
            .await
    }

    /// Transactions mined from `address` (the `latest` nonce).
    pub async fn mined_nonce(&self, address: Address) -> Result<u64, AppError> {
        self.pool
            .call("eth_getTransactionCount", |provider| async move {
                provider.get_transaction_count(address).latest().await
            })
            .await
    }

    pub async fn remote_chain_id(&self) -> Result<u64, AppError> {
        self.pool
            .call("eth_chainId", |provider| async move {
                provider.get_chain_id().await
            })
            .await
    }

    pub async fn fees(&self) -> Result<GasFees, AppError> {
        self.gas.estimate_eip1559_fees().await
    }

    /// Fetch the pending nonce and sign the deposit. Nothing is broadcast.
    pub async fn sign_bridge(
        &self,
        signer: &PrivateKeySigner,
        bridge: Address,
        plan: &BridgePlan,
        l2_recipient: Felt,
    ) -> Result<SignedDeposit, AppError> {
        let nonce = self.nonce(signer.address()).await?;
        let (raw, hash) =
            sign_bridge_deposit(signer, self.chain_id, nonce, bridge, plan, l2_recipient)?;
        Ok(SignedDeposit {
            hash,
            nonce,
            raw: Bytes::from(raw),
        })
    }

    /// Broadcast already-signed bytes. Safe to repeat: the hash and nonce
    /// are fixed by the signature.
    pub async fn broadcast(&self, hash: B256, raw: &Bytes) -> Result<(), AppError> {
        tracing::info!(target: "evm", tx = %hash, bytes = raw.len(), "Broadcasting signed deposit");
        self.pool
            .call("eth_sendRawTransaction", |provider| {
                let raw = raw.clone();
                async move { provider.send_raw_transaction(&raw).await.map(|_| ()) }
            })
            .await
    }

    pub async fn deposit_info(&self, hash: B256) -> Result<Option<DepositInfo>, AppError> {
        let tx = self
            .pool
            .call("eth_getTransactionByHash", |provider| async move {
                provider.get_transaction_by_hash(hash).await
            })
            .await?;
        Ok(tx.map(|tx| {
            let call = IStarkgateBridge::depositCall::abi_decode(tx.input()).ok();
            DepositInfo {
                hash,
                from: tx.from(),
                to: tx.to(),
                nonce: tx.nonce(),
                value: tx.value(),
                amount: call.as_ref().map(|c| c.amount),
                l2_recipient: call.and_then(|c| u256_to_felt(c.l2Recipient)),
            }
        }))
    }

    /// `None` while the transaction is unmined.
    pub async fn receipt_status(&self, hash: B256) -> Result<Option<ReceiptOutcome>, AppError> {
        let receipt = self
            .pool
            .call("eth_getTransactionReceipt", |provider| async move {
                provider.get_transaction_receipt(hash).await
            })
            .await?;
        Ok(receipt.map(|r| ReceiptOutcome {
            success: r.status(),
            block_number: r.block_number,
        }))
    }
}

pub fn deposit_calldata(amount: U256, l2_recipient: Felt) -> Vec<u8> {
    IStarkgateBridge::depositCall {
        amount,
        l2Recipient: felt_to_u256(l2_recipient),
    }
    .abi_encode()
}

/// Sign the deposit locally; returns the EIP-2718 bytes and the tx hash.
pub fn sign_bridge_deposit(
    signer: &PrivateKeySigner,
    chain_id: u64,
    nonce: u64,
    bridge: Address,
    plan: &BridgePlan,
    l2_recipient: Felt,
) -> Result<(Vec<u8>, B256), AppError> {
    let mut tx = TxEip1559 {
        chain_id,
        nonce,
        max_priority_fee_per_gas: plan.max_priority_fee_per_gas,
        max_fee_per_gas: plan.max_fee_per_gas,
        gas_limit: plan.gas_limit,
        to: TxKind::Call(bridge),
        value: plan.value_wei(),
        access_list: AccessList::default(),
        input: deposit_calldata(plan.amount_wei, l2_recipient).into(),
    };

    let sig = TxSignerSync::sign_transaction_sync(signer, &mut tx)
        .map_err(|e| AppError::Transaction {
            hash: "unsigned".into(),
            reason: format!("Sign tx failed: {}", e),
        })?;
    let signed: TxEnvelope = tx.into_signed(sig).into();
    Ok((signed.encoded_2718(), *signed.tx_hash()))
}
