// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::parsing::{uint256_from_felts, uint256_to_felts};
use crate::domain::error::AppError;
use crate::network::provider::StarknetPool;
use alloy::primitives::U256;
use starknet::accounts::{
    Account, AccountFactory, ExecutionEncoding, OpenZeppelinAccountFactory, SingleOwnerAccount,
};
use starknet::core::types::{
    BlockId, BlockTag, Call, Felt, FunctionCall, StarknetError, TransactionExecutionStatus,
    TransactionStatus,
};
use starknet::macros::selector;
use starknet::providers::{Provider, ProviderError};
use starknet::signers::{LocalWallet, SigningKey};
use std::sync::Arc;

/// Coarse view of a StarkNet transaction for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Accepted,
    Reverted(String),
    Rejected,
}

impl From<TransactionStatus> for TxState {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Received => TxState::Pending,
            TransactionStatus::Rejected => TxState::Rejected,
            TransactionStatus::AcceptedOnL2(exec) | TransactionStatus::AcceptedOnL1(exec) => {
                match exec {
                    TransactionExecutionStatus::Succeeded => TxState::Accepted,
                    TransactionExecutionStatus::Reverted => {
                        TxState::Reverted("execution reverted".into())
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub tx_hash: Felt,
    pub address: Felt,
}

#[derive(Clone)]
pub struct StarknetClient {
    pool: Arc<StarknetPool>,
    eth_token: Felt,
}

impl StarknetClient {
    pub fn new(pool: Arc<StarknetPool>, eth_token: Felt) -> Self {
        Self { pool, eth_token }
    }

    pub fn pool(&self) -> &StarknetPool {
        &self.pool
    }

    pub async fn eth_balance(&self, owner: Felt) -> Result<U256, AppError> {
        let token = self.eth_token;
        let words = self
            .pool
            .call("balanceOf", |rpc| async move {
                rpc.client()
                    .call(
                        FunctionCall {
                            contract_address: token,
                            entry_point_selector: selector!("balanceOf"),
                            calldata: vec![owner],
                        },
                        BlockId::Tag(BlockTag::Latest),
                    )
                    .await
            })
            .await?;
        match words.as_slice() {
            [low, high, ..] => Ok(uint256_from_felts(*low, *high)),
            [low] => Ok(uint256_from_felts(*low, Felt::ZERO)),
            [] => Err(AppError::Validation {
                field: "balanceOf".into(),
                message: "empty return data".into(),
            }),
        }
    }

    /// "Contract not found" means the counterfactual account is not deployed yet.
    pub async fn is_deployed(&self, account: Felt) -> Result<bool, AppError> {
        self.pool
            .call("getClassHashAt", |rpc| async move {
                match rpc
                    .client()
                    .get_class_hash_at(BlockId::Tag(BlockTag::Latest), account)
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(ProviderError::StarknetError(StarknetError::ContractNotFound)) => {
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    pub async fn tx_status(&self, tx_hash: Felt) -> Result<TxState, AppError> {
        self.pool
            .call("getTransactionStatus", |rpc| async move {
                match rpc.client().get_transaction_status(tx_hash).await {
                    Ok(status) => Ok(TxState::from(status)),
                    // Freshly broadcast transactions may not be indexed yet.
                    Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                        Ok(TxState::Pending)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    /// Deploy an OpenZeppelin-style account (constructor calldata `[public_key]`).
    pub async fn deploy_account(
        &self,
        key: &SigningKey,
        class_hash: Felt,
        salt: Felt,
    ) -> Result<Deployment, AppError> {
        let secret = key.secret_scalar();
        self.pool
            .call("addDeployAccountTransaction", |rpc| async move {
                let provider = rpc.owned_client();
                let chain_id = provider.chain_id().await.map_err(|e| e.to_string())?;
                let signer = LocalWallet::from(SigningKey::from_secret_scalar(secret));
                let factory = OpenZeppelinAccountFactory::new(class_hash, chain_id, signer, provider)
                    .await
                    .map_err(|e| e.to_string())?;
                let deployment = factory.deploy_v3(salt);
                let address = deployment.address();
                let result = deployment.send().await.map_err(|e| e.to_string())?;
                Ok::<_, String>(Deployment {
                    tx_hash: result.transaction_hash,
                    address,
                })
            })
            .await
    }

    /// Invoke `transfer(to, amount)` on the ETH token from a deployed account.
    pub async fn transfer_eth(
        &self,
        key: &SigningKey,
        from: Felt,
        to: Felt,
        amount: U256,
    ) -> Result<Felt, AppError> {
        let secret = key.secret_scalar();
        let token = self.eth_token;
        let (low, high) = uint256_to_felts(amount);
        self.pool
            .call("addInvokeTransaction", |rpc| async move {
                let provider = rpc.owned_client();
                let chain_id = provider.chain_id().await.map_err(|e| e.to_string())?;
                let signer = LocalWallet::from(SigningKey::from_secret_scalar(secret));
                let account =
                    SingleOwnerAccount::new(provider, signer, from, chain_id, ExecutionEncoding::New);
                let result = account
                    .execute_v3(vec![Call {
                        to: token,
                        selector: selector!("transfer"),
                        calldata: vec![to, low, high],
                    }])
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                Ok::<_, String>(result.transaction_hash)
            })
            .await
    }
}
