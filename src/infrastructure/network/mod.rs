// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod evm;
pub mod gas;
pub mod health;
pub mod provider;
pub mod rpc_pool;
pub mod starknet_client;
