// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::parsing::wei_to_eth_string;
use crate::domain::phase::Phase;
use crate::infrastructure::data::state_store::RecoveryRecord;
use crate::network::health::{EndpointHealth, healthy_count};
use crate::services::recovery::gateway::ChainGateway;
use alloy::primitives::{Address, U256};
use serde::Serialize;
use starknet::core::types::Felt;

#[derive(Debug, Clone, Default)]
pub struct PulseTargets {
    pub source: Option<Address>,
    pub starknet: Option<Felt>,
    pub ghost: Option<Felt>,
}

/// One-shot snapshot of balances, deployment, mission phase and providers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PulseReport {
    pub source_wei: Option<U256>,
    pub starknet_wei: Option<U256>,
    pub ghost_wei: Option<U256>,
    pub deployed: Option<bool>,
    pub mission_id: Option<String>,
    pub phase: Option<Phase>,
    pub endpoints_healthy: usize,
    pub endpoints_total: usize,
}

pub async fn collect<G: ChainGateway>(
    gateway: &G,
    targets: &PulseTargets,
    record: Option<&RecoveryRecord>,
    health: &[EndpointHealth],
) -> PulseReport {
    let mut report = PulseReport {
        mission_id: record.map(|r| r.mission_id.clone()),
        phase: record.map(|r| r.phase),
        endpoints_healthy: healthy_count(health),
        endpoints_total: health.len(),
        ..Default::default()
    };

    if let Some(source) = targets.source {
        report.source_wei = gateway
            .source_balance(source)
            .await
            .inspect_err(|e| tracing::warn!(target: "pulse", error = %e, "Source balance unavailable"))
            .ok();
    }
    if let Some(account) = targets.starknet {
        report.starknet_wei = gateway
            .starknet_balance(account)
            .await
            .inspect_err(|e| tracing::warn!(target: "pulse", error = %e, "StarkNet balance unavailable"))
            .ok();
        report.deployed = gateway.is_deployed(account).await.ok();
    }
    if let Some(ghost) = targets.ghost {
        report.ghost_wei = gateway
            .starknet_balance(ghost)
            .await
            .inspect_err(|e| tracing::warn!(target: "pulse", error = %e, "Ghost balance unavailable"))
            .ok();
    }
    report
}

fn eth_or_unknown(wei: Option<U256>) -> String {
    wei.map(|w| format!("{} ETH", wei_to_eth_string(w)))
        .unwrap_or_else(|| "unavailable".to_string())
}

impl PulseReport {
    pub fn render(&self) -> String {
        let mut lines = vec![
            "stark-rescue pulse".to_string(),
            format!("source: {}", eth_or_unknown(self.source_wei)),
            format!("starknet: {}", eth_or_unknown(self.starknet_wei)),
        ];
        if self.ghost_wei.is_some() {
            lines.push(format!("ghost: {}", eth_or_unknown(self.ghost_wei)));
        }
        lines.push(format!(
            "account: {}",
            match self.deployed {
                Some(true) => "deployed",
                Some(false) => "not deployed",
                None => "unknown",
            }
        ));
        match (&self.mission_id, self.phase) {
            (Some(id), Some(phase)) => lines.push(format!("mission: {id} ({phase})")),
            _ => lines.push("mission: none".to_string()),
        }
        lines.push(format!(
            "providers: {}/{} healthy",
            self.endpoints_healthy, self.endpoints_total
        ));
        lines.join("\n")
    }
}

/// Human summary of a persisted mission for the `status` command.
pub fn render_status(record: &RecoveryRecord) -> String {
    let bridges = record.bridge_summary();
    let mut lines = vec![
        format!("mission: {}", record.mission_id),
        format!("phase: {}", record.phase),
        format!("source: {:#x}", record.source_address),
        format!("starknet: {:#x}", record.starknet_address),
        format!(
            "balances: source {}, starknet {}",
            eth_or_unknown(record.balances.source_wei),
            eth_or_unknown(record.balances.starknet_wei)
        ),
        format!(
            "bridges: {} pending, {} confirmed, {} minted, {} failed ({} ETH bridged)",
            bridges.pending,
            bridges.confirmed,
            bridges.minted,
            bridges.failed,
            wei_to_eth_string(record.total_bridged_wei())
        ),
        format!("account: {:?}", record.account),
        format!("security unlocked: {}", record.security_unlocked),
    ];
    if let Some(hash) = record.account_tx_hash {
        lines.push(format!("deploy tx: {hash:#x}"));
    }
    if let Some(hash) = record.sweep_tx_hash {
        lines.push(format!("sweep tx: {hash:#x}"));
    }
    if let Some(reason) = &record.failure_reason {
        lines.push(format!("failure: {reason}"));
    }
    let skip = record.history.len().saturating_sub(5);
    for step in record.history.iter().skip(skip) {
        lines.push(format!(
            "  {} {} -> {}: {}",
            step.at.format("%Y-%m-%d %H:%M:%S"),
            step.from,
            step.to,
            step.message
        ));
    }
    lines.join("\n")
}
