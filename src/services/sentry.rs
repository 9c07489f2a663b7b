// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::parsing::wei_to_eth_string;
use crate::domain::error::AppError;
use crate::services::notifier::Notifier;
use crate::services::recovery::gateway::ChainGateway;
use alloy::primitives::U256;
use starknet::core::types::Felt;
use starknet::signers::SigningKey;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub ghost: Felt,
    pub main_account: Felt,
    pub threshold: U256,
    pub sweep_reserve: U256,
    pub interval: Duration,
    pub max_polls: Option<u64>,
    pub execute: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentryOutcome {
    Cancelled { polls: u64 },
    PollLimit { polls: u64 },
    /// Threshold reached but no sweep was sent.
    Alerted { balance: U256, reason: String },
    Swept { tx_hash: Felt, amount: U256 },
}

/// Watches the ghost address and sweeps it into the main account once funded.
pub struct GhostSentry<'a, G: ChainGateway> {
    gateway: &'a G,
    notifier: &'a Notifier,
    ghost_key: Option<&'a SigningKey>,
    config: SentryConfig,
}

impl<'a, G: ChainGateway> GhostSentry<'a, G> {
    pub fn new(
        gateway: &'a G,
        notifier: &'a Notifier,
        ghost_key: Option<&'a SigningKey>,
        config: SentryConfig,
    ) -> Self {
        Self {
            gateway,
            notifier,
            ghost_key,
            config,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<SentryOutcome, AppError> {
        let ghost = self.config.ghost;
        tracing::info!(
            target: "sentry",
            ghost = %format!("{ghost:#x}"),
            threshold_eth = %wei_to_eth_string(self.config.threshold),
            interval_secs = self.config.interval.as_secs(),
            "Ghost sentry started"
        );

        let mut polls = 0u64;
        loop {
            polls += 1;
            match self.gateway.starknet_balance(ghost).await {
                Ok(balance) => {
                    tracing::info!(
                        target: "sentry",
                        poll = polls,
                        balance_eth = %wei_to_eth_string(balance),
                        "Ghost balance observed"
                    );
                    if balance >= self.config.threshold {
                        self.notifier
                            .notify(&format!(
                                "Ghost {ghost:#x} holds {} ETH (threshold {} ETH)",
                                wei_to_eth_string(balance),
                                wei_to_eth_string(self.config.threshold)
                            ))
                            .await;
                        return self.on_threshold(balance).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "sentry", poll = polls, error = %e, "Ghost balance poll failed");
                }
            }

            if self.config.max_polls.is_some_and(|max| polls >= max) {
                return Ok(SentryOutcome::PollLimit { polls });
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(target: "sentry", polls, "Ghost sentry stopped");
                    return Ok(SentryOutcome::Cancelled { polls });
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    async fn on_threshold(&self, balance: U256) -> Result<SentryOutcome, AppError> {
        let alerted = |reason: &str| -> Result<SentryOutcome, AppError> {
            tracing::warn!(target: "sentry", reason, "Sweep not sent");
            Ok(SentryOutcome::Alerted {
                balance,
                reason: reason.to_string(),
            })
        };

        let Some(amount) = balance
            .checked_sub(self.config.sweep_reserve)
            .filter(|a| !a.is_zero())
        else {
            return alerted("balance does not cover sweep gas reserve");
        };
        let plan = format!(
            "sweep {} ETH from {:#x} to {:#x}",
            wei_to_eth_string(amount),
            self.config.ghost,
            self.config.main_account
        );
        if !self.config.execute {
            tracing::info!(target: "sentry", %plan, "Dry run: pass --confirm to sweep");
            return alerted("dry run");
        }
        let Some(key) = self.ghost_key else {
            return alerted("no ghost key configured");
        };
        if !self.gateway.is_deployed(self.config.ghost).await? {
            return alerted("ghost account is not deployed");
        }

        let tx_hash = self
            .gateway
            .transfer_eth(key, self.config.ghost, self.config.main_account, amount)
            .await?;
        self.notifier
            .notify(&format!("Ghost sweep sent: {plan} ({tx_hash:#x})"))
            .await;
        Ok(SentryOutcome::Swept { tx_hash, amount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::data::state_store::BridgePlan;
    use crate::network::evm::{DepositInfo, ReceiptOutcome, SignedDeposit};
    use crate::network::gas::GasFees;
    use crate::network::starknet_client::{Deployment, TxState};
    use alloy::primitives::{Address, B256, Bytes};
    use alloy::signers::local::PrivateKeySigner;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct GhostChain {
        balances: Mutex<Vec<Result<U256, ()>>>,
        deployed: bool,
        transfers: Mutex<Vec<(Felt, Felt, U256)>>,
    }

    impl GhostChain {
        fn new(balances: Vec<Result<U256, ()>>) -> Self {
            Self {
                balances: Mutex::new(balances),
                deployed: true,
                transfers: Mutex::new(Vec::new()),
            }
        }
    }

    fn unused() -> AppError {
        AppError::Unknown(anyhow::anyhow!("not used by the sentry"))
    }

    #[async_trait]
    impl ChainGateway for GhostChain {
        fn bridge_address(&self) -> Address {
            Address::ZERO
        }

        async fn source_balance(&self, _address: Address) -> Result<U256, AppError> {
            Err(unused())
        }

        async fn source_nonce(&self, _address: Address) -> Result<u64, AppError> {
            Err(unused())
        }

        async fn starknet_balance(&self, _account: Felt) -> Result<U256, AppError> {
            let mut queue = self.balances.lock().unwrap();
            let next = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0]
            };
            next.map_err(|_| AppError::Connection("node down".into()))
        }

        async fn is_deployed(&self, _account: Felt) -> Result<bool, AppError> {
            Ok(self.deployed)
        }

        async fn fee_quote(&self) -> Result<GasFees, AppError> {
            Err(unused())
        }

        async fn sign_bridge(
            &self,
            _signer: &PrivateKeySigner,
            _plan: &BridgePlan,
            _l2_recipient: Felt,
        ) -> Result<SignedDeposit, AppError> {
            Err(unused())
        }

        async fn broadcast_bridge(&self, _tx_hash: B256, _raw: &Bytes) -> Result<(), AppError> {
            Err(unused())
        }

        async fn bridge_deposit(&self, _tx_hash: B256) -> Result<Option<DepositInfo>, AppError> {
            Err(unused())
        }

        async fn bridge_receipt(&self, _tx_hash: B256) -> Result<Option<ReceiptOutcome>, AppError> {
            Err(unused())
        }

        async fn deploy_account(
            &self,
            _key: &SigningKey,
            _class_hash: Felt,
            _salt: Felt,
        ) -> Result<Deployment, AppError> {
            Err(unused())
        }

        async fn starknet_tx_status(&self, _tx_hash: Felt) -> Result<TxState, AppError> {
            Err(unused())
        }

        async fn transfer_eth(
            &self,
            _key: &SigningKey,
            from: Felt,
            to: Felt,
            amount: U256,
        ) -> Result<Felt, AppError> {
            self.transfers.lock().unwrap().push((from, to, amount));
            Ok(Felt::from(0x51u64))
        }
    }

    fn config(execute: bool, max_polls: Option<u64>) -> SentryConfig {
        SentryConfig {
            ghost: Felt::from(0x6u64),
            main_account: Felt::from(0xau64),
            threshold: U256::from(1_000u64),
            sweep_reserve: U256::from(100u64),
            interval: Duration::from_millis(1),
            max_polls,
            execute,
        }
    }

    #[tokio::test]
    async fn sweeps_once_threshold_is_reached() {
        let chain = GhostChain::new(vec![Ok(U256::from(10u64)), Err(()), Ok(U256::from(1_500u64))]);
        let notifier = Notifier::disabled();
        let key = SigningKey::from_secret_scalar(Felt::from(77u64));
        let sentry = GhostSentry::new(&chain, &notifier, Some(&key), config(true, None));

        let outcome = sentry.run(CancellationToken::new()).await.unwrap();
        assert_eq!(
            outcome,
            SentryOutcome::Swept {
                tx_hash: Felt::from(0x51u64),
                amount: U256::from(1_400u64)
            }
        );
        assert_eq!(
            chain.transfers.lock().unwrap().clone(),
            vec![(Felt::from(0x6u64), Felt::from(0xau64), U256::from(1_400u64))]
        );
    }

    #[tokio::test]
    async fn without_confirm_only_alerts() {
        let chain = GhostChain::new(vec![Ok(U256::from(2_000u64))]);
        let notifier = Notifier::disabled();
        let key = SigningKey::from_secret_scalar(Felt::from(77u64));
        let sentry = GhostSentry::new(&chain, &notifier, Some(&key), config(false, None));

        let outcome = sentry.run(CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, SentryOutcome::Alerted { ref reason, .. } if reason == "dry run"));
        assert!(chain.transfers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undeployed_ghost_is_not_swept() {
        let mut chain = GhostChain::new(vec![Ok(U256::from(2_000u64))]);
        chain.deployed = false;
        let notifier = Notifier::disabled();
        let key = SigningKey::from_secret_scalar(Felt::from(77u64));
        let sentry = GhostSentry::new(&chain, &notifier, Some(&key), config(true, None));

        let outcome = sentry.run(CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, SentryOutcome::Alerted { .. }));
        assert!(chain.transfers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stops_at_poll_limit_and_on_cancel() {
        let chain = GhostChain::new(vec![Ok(U256::from(1u64))]);
        let notifier = Notifier::disabled();
        let sentry = GhostSentry::new(&chain, &notifier, None, config(true, Some(3)));
        assert_eq!(
            sentry.run(CancellationToken::new()).await.unwrap(),
            SentryOutcome::PollLimit { polls: 3 }
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let sentry = GhostSentry::new(&chain, &notifier, None, config(true, None));
        assert_eq!(
            sentry.run(cancel).await.unwrap(),
            SentryOutcome::Cancelled { polls: 1 }
        );
    }
}
