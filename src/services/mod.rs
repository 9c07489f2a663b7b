// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

pub mod discovery;
pub mod notifier;
pub mod pulse;
pub mod recovery;
pub mod sentry;
