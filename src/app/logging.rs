// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Transport crates that are chatty at debug level.
const QUIET_MODULES: &[&str] = &[
    "h2",
    "hyper",
    "hyper_util",
    "reqwest",
    "rustls",
    "alloy_transport_http",
    "alloy_rpc_client",
    "starknet_providers",
];

/// Build the filter directive string. A bare level (e.g. "debug") gets quiet
/// defaults for transport crates; custom directive strings are respected as-is.
pub fn filter_directives(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.is_empty() {
        return "info".to_string();
    }
    if normalized.contains(',') || normalized.contains('=') {
        return normalized.to_string();
    }
    let mut spec = normalized.to_string();
    for module in QUIET_MODULES {
        spec.push_str(&format!(",{module}=info"));
    }
    spec
}

pub fn setup_logging(log_level: &str, json_format: bool) {
    // RUST_LOG wins over the configured level when present.
    let filter_spec = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| filter_directives(log_level));
    let filter = EnvFilter::from_str(&filter_spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        let _ = subscriber.with(json_layer).try_init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        let _ = subscriber.with(fmt_layer).try_init();
    }

    let base = filter_spec
        .split(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
        .unwrap_or("info");
    tracing::debug!(
        target: "config",
        base,
        format = if json_format { "json" } else { "compact" },
        "Logging initialized"
    );
}
