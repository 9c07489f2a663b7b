// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::network::provider::{EvmPool, StarknetPool};
use crate::network::rpc_pool::EndpointReport;
use alloy::providers::Provider;
use serde::Serialize;
use starknet::providers::Provider as StarknetProvider;

#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub network: String,
    pub label: String,
    pub healthy: bool,
    pub latency_ms: u128,
    pub block: Option<u64>,
    pub error: Option<String>,
}

impl EndpointHealth {
    fn from_report(network: &str, report: EndpointReport<u64>) -> Self {
        Self {
            network: network.to_string(),
            label: report.label,
            healthy: report.healthy,
            latency_ms: report.latency_ms,
            block: report.detail,
            error: report.error,
        }
    }
}

pub async fn probe_evm(pool: &EvmPool) -> Vec<EndpointHealth> {
    pool.probe(|provider| async move { provider.get_block_number().await })
        .await
        .into_iter()
        .map(|r| EndpointHealth::from_report(pool.network(), r))
        .collect()
}

pub async fn probe_starknet(pool: &StarknetPool) -> Vec<EndpointHealth> {
    pool.probe(|rpc| async move { rpc.client().block_number().await })
        .await
        .into_iter()
        .map(|r| EndpointHealth::from_report(pool.network(), r))
        .collect()
}

/// One line per endpoint, e.g. `starknet alchemy OK block=812345 120ms`.
pub fn render(reports: &[EndpointHealth]) -> String {
    reports
        .iter()
        .map(|r| match (&r.error, r.block) {
            (None, Some(block)) => format!(
                "{} {} OK block={} {}ms",
                r.network, r.label, block, r.latency_ms
            ),
            (None, None) => format!("{} {} OK {}ms", r.network, r.label, r.latency_ms),
            (Some(err), _) => format!("{} {} DOWN {}", r.network, r.label, err),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn healthy_count(reports: &[EndpointHealth]) -> usize {
    reports.iter().filter(|r| r.healthy).count()
}
