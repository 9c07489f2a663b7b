// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

pub mod gateway;
pub mod kernel;
pub mod vault;

pub use crate::domain::phase::Phase;
pub use gateway::{ChainGateway, LiveGateway};
pub use kernel::{HaltReason, KernelSettings, RecoveryKernel, StepOutcome};
pub use vault::SignerVault;
