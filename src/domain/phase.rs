// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use serde::{Deserialize, Serialize};
use std::fmt;

/// Recovery mission phases, persisted as snake_case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    SecurityLocked,
    BalanceCheck,
    GasCheck,
    Bridging,
    AwaitingConfirmation,
    AwaitingMint,
    Deploying,
    AwaitingDeployment,
    Sweeping,
    MissionSuccess,
    MissionFailed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::MissionSuccess | Phase::MissionFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::SecurityLocked => "security_locked",
            Phase::BalanceCheck => "balance_check",
            Phase::GasCheck => "gas_check",
            Phase::Bridging => "bridging",
            Phase::AwaitingConfirmation => "awaiting_confirmation",
            Phase::AwaitingMint => "awaiting_mint",
            Phase::Deploying => "deploying",
            Phase::AwaitingDeployment => "awaiting_deployment",
            Phase::Sweeping => "sweeping",
            Phase::MissionSuccess => "mission_success",
            Phase::MissionFailed => "mission_failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_display() {
        for phase in [Phase::SecurityLocked, Phase::AwaitingMint, Phase::MissionFailed] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
        }
        assert!(Phase::MissionSuccess.is_terminal());
        assert!(!Phase::Sweeping.is_terminal());
    }
}
