// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::retry::retry_async;
use crate::domain::error::AppError;
use crate::network::provider::EvmPool;
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use alloy::rpc::types::eth::FeeHistory;
use serde::Deserialize;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FALLBACK_BASE_FEE_WEI: u128 = 100_000_000; // 0.1 gwei, L2-sized
const FALLBACK_PRIORITY_FEE_WEI: u128 = 1_000_000; // 0.001 gwei

#[derive(Clone)]
pub struct GasOracle {
    pool: Arc<EvmPool>,
    chain_id: u64,
    last_good: Arc<Mutex<Option<GasFees>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GasFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub next_base_fee_per_gas: u128,
    pub base_fee_per_gas: u128,
    /// Median priority fee over the sampled blocks (when available).
    pub p50_priority_fee_per_gas: Option<u128>,
    /// 90th percentile priority fee over the sampled blocks (when available).
    pub p90_priority_fee_per_gas: Option<u128>,
    /// Max sampled base fee plus 20% headroom.
    pub suggested_max_fee_per_gas: Option<u128>,
}

impl GasFees {
    pub fn max_fee_gwei(&self) -> f64 {
        self.max_fee_per_gas as f64 / 1e9
    }
}

impl GasOracle {
    pub fn new(pool: Arc<EvmPool>, chain_id: u64) -> Self {
        Self {
            pool,
            chain_id,
            last_good: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn estimate_eip1559_fees(&self) -> Result<GasFees, AppError> {
        match self.with_retry_history().await {
            Ok(history) => {
                let fees = Self::fees_from_history(&history)?;
                if let Ok(mut guard) = self.last_good.lock() {
                    *guard = Some(fees.clone());
                }
                Ok(fees)
            }
            Err(e) => {
                tracing::debug!(target: "gas", error = %e, "feeHistory unavailable; falling back");
                if let Ok(guard) = self.last_good.lock()
                    && let Some(fees) = guard.clone()
                {
                    return Ok(fees);
                }
                self.fallback_estimate().await
            }
        }
    }

    async fn with_retry_history(&self) -> Result<FeeHistory, AppError> {
        let pool = self.pool.clone();
        retry_async(
            move |_| {
                let pool = pool.clone();
                async move {
                    pool.call("eth_feeHistory", |provider| async move {
                        provider
                            .get_fee_history(5, BlockNumberOrTag::Latest, &[50.0f64, 90.0f64])
                            .await
                    })
                    .await
                }
            },
            2,
            Duration::from_millis(100),
        )
        .await
    }

    pub(crate) fn fees_from_history(history: &FeeHistory) -> Result<GasFees, AppError> {
        let latest_base_fee = history
            .latest_block_base_fee()
            .or_else(|| history.base_fee_per_gas.last().copied())
            .ok_or(AppError::Initialization("No base fee history".into()))?;

        let raw_next_base = history.next_block_base_fee().unwrap_or(latest_base_fee);
        let next_base_fee = if raw_next_base == 0 {
            latest_base_fee.saturating_mul(1125) / 1000
        } else {
            raw_next_base
        };

        let mut p50 = Vec::new();
        let mut p90 = Vec::new();
        if let Some(rewards) = &history.reward {
            for block_reward in rewards {
                if let Some(r) = block_reward.first() {
                    p50.push(*r);
                }
                if let Some(r) = block_reward.get(1) {
                    p90.push(*r);
                }
            }
        }
        let average = |v: &[u128]| {
            if v.is_empty() {
                None
            } else {
                Some(v.iter().fold(0u128, |acc, x| acc.saturating_add(*x)) / v.len() as u128)
            }
        };
        let avg_p50 = average(&p50).unwrap_or(FALLBACK_PRIORITY_FEE_WEI);
        let avg_p90 = average(&p90).unwrap_or(avg_p50);

        let p95_base = history
            .base_fee_per_gas
            .iter()
            .copied()
            .max()
            .unwrap_or(next_base_fee);

        Ok(GasFees {
            max_fee_per_gas: next_base_fee.saturating_add(avg_p50),
            max_priority_fee_per_gas: avg_p50,
            next_base_fee_per_gas: next_base_fee,
            base_fee_per_gas: latest_base_fee,
            p50_priority_fee_per_gas: Some(avg_p50),
            p90_priority_fee_per_gas: Some(avg_p90),
            suggested_max_fee_per_gas: Some(p95_base.saturating_mul(12) / 10),
        })
    }

    async fn fallback_estimate(&self) -> Result<GasFees, AppError> {
        if let Ok(key) = env::var("ETHERSCAN_API_KEY")
            && !key.is_empty()
            && let Ok(fees) = self.etherscan_gas_oracle(&key).await
        {
            return Ok(fees);
        }

        // Some public RPCs disable feeHistory; derive from the latest header instead.
        let block = self
            .pool
            .call("eth_getBlockByNumber", |provider| async move {
                provider.get_block_by_number(BlockNumberOrTag::Latest).await
            })
            .await?;
        let base: u128 = block
            .as_ref()
            .and_then(|b| b.header.base_fee_per_gas)
            .map(|v| v as u128)
            .unwrap_or(FALLBACK_BASE_FEE_WEI);

        let priority: u128 = self
            .pool
            .call("eth_maxPriorityFeePerGas", |provider| async move {
                provider.get_max_priority_fee_per_gas().await
            })
            .await
            .unwrap_or(FALLBACK_PRIORITY_FEE_WEI);

        let next_base = base.saturating_mul(1125) / 1000;
        Ok(GasFees {
            max_fee_per_gas: next_base.saturating_add(priority),
            max_priority_fee_per_gas: priority,
            next_base_fee_per_gas: next_base,
            base_fee_per_gas: base,
            p50_priority_fee_per_gas: None,
            p90_priority_fee_per_gas: None,
            suggested_max_fee_per_gas: None,
        })
    }

    async fn etherscan_gas_oracle(&self, api_key: &str) -> Result<GasFees, AppError> {
        let url = format!(
            "https://api.etherscan.io/v2/api?chainid={}&module=gastracker&action=gasoracle&apikey={api_key}",
            self.chain_id
        );
        let resp = reqwest::get(&url)
            .await
            .map_err(|e| AppError::Connection(format!("Etherscan gasoracle failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AppError::ApiCall {
                provider: "Etherscan gasoracle".into(),
                status: resp.status().as_u16(),
            });
        }
        let parsed: EtherscanGasOracleResponse = resp.json().await.map_err(|e| {
            AppError::Initialization(format!("Etherscan gasoracle decode failed: {e}"))
        })?;
        let result = parsed
            .result
            .ok_or_else(|| AppError::Initialization("Etherscan gasoracle missing result".into()))?;

        // Values are decimal gwei strings.
        let base_gwei: f64 = result.suggest_base_fee.parse().map_err(|_| {
            AppError::Initialization("Invalid suggestBaseFee from Etherscan".into())
        })?;
        let tip_gwei: f64 = result.propose_gas_price.parse().map_err(|_| {
            AppError::Initialization("Invalid ProposeGasPrice from Etherscan".into())
        })?;
        let base = (base_gwei * 1e9_f64) as u128;
        let priority = (tip_gwei * 1e9_f64) as u128;

        Ok(GasFees {
            max_fee_per_gas: base.saturating_add(priority),
            max_priority_fee_per_gas: priority,
            next_base_fee_per_gas: base,
            base_fee_per_gas: base,
            p50_priority_fee_per_gas: None,
            p90_priority_fee_per_gas: None,
            suggested_max_fee_per_gas: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EtherscanGasOracleResponse {
    result: Option<EtherscanGasOracleResult>,
}

#[derive(Debug, Deserialize)]
struct EtherscanGasOracleResult {
    #[serde(rename = "suggestBaseFee")]
    suggest_base_fee: String,
    #[serde(rename = "ProposeGasPrice")]
    propose_gas_price: String,
}
