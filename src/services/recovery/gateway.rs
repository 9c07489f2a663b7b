// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use crate::infrastructure::data::state_store::BridgePlan;
use crate::network::evm::{DepositInfo, EvmClient, ReceiptOutcome, SignedDeposit};
use crate::network::gas::GasFees;
use crate::network::starknet_client::{Deployment, StarknetClient, TxState};
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use starknet::core::types::Felt;
use starknet::signers::SigningKey;

/// Every chain interaction the recovery kernel performs.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// StarkGate bridge deposits are sent to.
    fn bridge_address(&self) -> Address;
    async fn source_balance(&self, address: Address) -> Result<U256, AppError>;
    /// Mined transaction count of a source address.
    async fn source_nonce(&self, address: Address) -> Result<u64, AppError>;
    async fn starknet_balance(&self, account: Felt) -> Result<U256, AppError>;
    async fn is_deployed(&self, account: Felt) -> Result<bool, AppError>;
    async fn fee_quote(&self) -> Result<GasFees, AppError>;
    async fn sign_bridge(
        &self,
        signer: &PrivateKeySigner,
        plan: &BridgePlan,
        l2_recipient: Felt,
    ) -> Result<SignedDeposit, AppError>;
    async fn broadcast_bridge(&self, tx_hash: B256, raw: &Bytes) -> Result<(), AppError>;
    async fn bridge_deposit(&self, tx_hash: B256) -> Result<Option<DepositInfo>, AppError>;
    async fn bridge_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptOutcome>, AppError>;
    async fn deploy_account(
        &self,
        key: &SigningKey,
        class_hash: Felt,
        salt: Felt,
    ) -> Result<Deployment, AppError>;
    async fn starknet_tx_status(&self, tx_hash: Felt) -> Result<TxState, AppError>;
    async fn transfer_eth(
        &self,
        key: &SigningKey,
        from: Felt,
        to: Felt,
        amount: U256,
    ) -> Result<Felt, AppError>;
}

/// Live gateway over the failover-backed chain clients.
pub struct LiveGateway {
    evm: EvmClient,
    starknet: StarknetClient,
    bridge: Address,
}

impl LiveGateway {
    pub fn new(evm: EvmClient, starknet: StarknetClient, bridge: Address) -> Self {
        Self {
            evm,
            starknet,
            bridge,
        }
    }
}

#[async_trait]
impl ChainGateway for LiveGateway {
    fn bridge_address(&self) -> Address {
        self.bridge
    }

    async fn source_balance(&self, address: Address) -> Result<U256, AppError> {
        self.evm.balance(address).await
    }

    async fn source_nonce(&self, address: Address) -> Result<u64, AppError> {
        self.evm.mined_nonce(address).await
    }

    async fn starknet_balance(&self, account: Felt) -> Result<U256, AppError> {
        self.starknet.eth_balance(account).await
    }

    async fn is_deployed(&self, account: Felt) -> Result<bool, AppError> {
        self.starknet.is_deployed(account).await
    }

    async fn fee_quote(&self) -> Result<GasFees, AppError> {
        self.evm.fees().await
    }

    async fn sign_bridge(
        &self,
        signer: &PrivateKeySigner,
        plan: &BridgePlan,
        l2_recipient: Felt,
    ) -> Result<SignedDeposit, AppError> {
        self.evm
            .sign_bridge(signer, self.bridge, plan, l2_recipient)
            .await
    }

    async fn broadcast_bridge(&self, tx_hash: B256, raw: &Bytes) -> Result<(), AppError> {
        self.evm.broadcast(tx_hash, raw).await
    }

    async fn bridge_deposit(&self, tx_hash: B256) -> Result<Option<DepositInfo>, AppError> {
        self.evm.deposit_info(tx_hash).await
    }

    async fn bridge_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptOutcome>, AppError> {
        self.evm.receipt_status(tx_hash).await
    }

    async fn deploy_account(
        &self,
        key: &SigningKey,
        class_hash: Felt,
        salt: Felt,
    ) -> Result<Deployment, AppError> {
        self.starknet.deploy_account(key, class_hash, salt).await
    }

    async fn starknet_tx_status(&self, tx_hash: Felt) -> Result<TxState, AppError> {
        self.starknet.tx_status(tx_hash).await
    }

    async fn transfer_eth(
        &self,
        key: &SigningKey,
        from: Felt,
        to: Felt,
        amount: U256,
    ) -> Result<Felt, AppError> {
        self.starknet.transfer_eth(key, from, to, amount).await
    }
}
