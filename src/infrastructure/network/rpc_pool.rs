// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use futures::future::join_all;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct PoolPolicy {
    pub request_timeout: Duration,
    pub max_failures: usize,
    pub cooldown: Duration,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_failures: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

struct Endpoint<P> {
    label: String,
    client: Arc<P>,
    consecutive_failures: AtomicUsize,
    tripped_at: Mutex<Option<Instant>>,
}

impl<P> Endpoint<P> {
    fn is_available(&self, cooldown: Duration) -> bool {
        match *self.tripped_at.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(at) => at.elapsed() >= cooldown,
            None => true,
        }
    }

    fn report_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.tripped_at.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Returns true when this failure tripped (or re-tripped) the breaker.
    fn report_failure(&self, max_failures: usize) -> bool {
        let count = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= max_failures.max(1) {
            *self.tripped_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
            return true;
        }
        false
    }
}

/// Health report for one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointReport<T> {
    pub label: String,
    pub healthy: bool,
    pub latency_ms: u128,
    pub detail: Option<T>,
    pub error: Option<String>,
}

/// Ordered set of interchangeable RPC endpoints for one network with sticky
/// failover and a per-endpoint circuit breaker.
pub struct RpcPool<P> {
    network: String,
    endpoints: Vec<Endpoint<P>>,
    preferred: AtomicUsize,
    policy: PoolPolicy,
}

/// Label without the `#N` suffix added to repeated providers.
fn base_label(label: &str) -> &str {
    match label.rsplit_once('#') {
        Some((base, n)) if n.parse::<usize>().is_ok() => base,
        _ => label,
    }
}

impl<P> RpcPool<P> {
    pub fn new(
        network: impl Into<String>,
        clients: Vec<(String, P)>,
        policy: PoolPolicy,
    ) -> Result<Self, AppError> {
        let network = network.into();
        if clients.is_empty() {
            return Err(AppError::Config(format!(
                "No RPC endpoints configured for {network}"
            )));
        }
        let mut labels: Vec<String> = Vec::with_capacity(clients.len());
        let endpoints = clients
            .into_iter()
            .map(|(label, client)| {
                let dupes = labels.iter().filter(|l| base_label(l) == label).count();
                let label = if dupes == 0 {
                    label
                } else {
                    format!("{label}#{}", dupes + 1)
                };
                labels.push(label.clone());
                Endpoint {
                    label,
                    client: Arc::new(client),
                    consecutive_failures: AtomicUsize::new(0),
                    tripped_at: Mutex::new(None),
                }
            })
            .collect();
        Ok(Self {
            network,
            endpoints,
            preferred: AtomicUsize::new(0),
            policy,
        })
    }

    /// Build a pool from raw URLs, labelling each endpoint by provider name.
    pub fn from_urls<B>(
        network: impl Into<String>,
        urls: &[String],
        policy: PoolPolicy,
        mut build: B,
    ) -> Result<Self, AppError>
    where
        B: FnMut(Url) -> Result<P, AppError>,
    {
        let mut clients = Vec::with_capacity(urls.len());
        for raw in urls {
            let url = Url::parse(raw)
                .map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;
            let label = provider_label(&url);
            clients.push((label, build(url)?));
        }
        Self::new(network, clients, policy)
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.label.clone()).collect()
    }

    pub fn preferred_label(&self) -> &str {
        let idx = self.preferred.load(Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[idx].label
    }

    /// Endpoint indices for one call: rotated to start at the preferred
    /// endpoint, tripped endpoints skipped unless every endpoint is tripped.
    fn attempt_order(&self) -> Vec<usize> {
        let n = self.endpoints.len();
        let start = self.preferred.load(Ordering::Relaxed) % n;
        let rotated: Vec<usize> = (0..n).map(|i| (start + i) % n).collect();
        let available: Vec<usize> = rotated
            .iter()
            .copied()
            .filter(|&i| self.endpoints[i].is_available(self.policy.cooldown))
            .collect();
        if available.is_empty() {
            tracing::warn!(
                target: "rpc",
                network = %self.network,
                "Every endpoint is cooling down; trying all of them"
            );
            rotated
        } else {
            available
        }
    }

    /// Run `f` against endpoints until one succeeds.
    pub async fn call<T, E, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, AppError>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let order = self.attempt_order();
        let attempts = order.len();
        let mut last_error = String::from("no attempt made");

        for idx in order {
            let endpoint = &self.endpoints[idx];
            let outcome =
                tokio::time::timeout(self.policy.request_timeout, f(endpoint.client.clone())).await;
            match outcome {
                Ok(Ok(value)) => {
                    endpoint.report_success();
                    let previous = self.preferred.swap(idx, Ordering::Relaxed);
                    if previous != idx {
                        tracing::info!(
                            target: "rpc",
                            network = %self.network,
                            endpoint = %endpoint.label,
                            operation,
                            "Failover: switched preferred endpoint"
                        );
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    last_error = format!("{}: {}", endpoint.label, e);
                }
                Err(_) => {
                    last_error = format!(
                        "{}: timed out after {:?}",
                        endpoint.label, self.policy.request_timeout
                    );
                }
            }
            let tripped = endpoint.report_failure(self.policy.max_failures);
            tracing::warn!(
                target: "rpc",
                network = %self.network,
                endpoint = %endpoint.label,
                operation,
                tripped,
                error = %last_error,
                "RPC call failed; rotating provider"
            );
        }

        Err(AppError::AllProvidersFailed {
            operation: format!("{} {}", self.network, operation),
            attempts,
            last_error,
        })
    }

    /// Probe every endpoint concurrently (ignores breaker state).
    pub async fn probe<T, E, F, Fut>(&self, f: F) -> Vec<EndpointReport<T>>
    where
        F: Fn(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let timeout = self.policy.request_timeout;
        let checks = self.endpoints.iter().map(|endpoint| {
            let fut = f(endpoint.client.clone());
            async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(timeout, fut).await;
                let latency_ms = started.elapsed().as_millis();
                match outcome {
                    Ok(Ok(detail)) => EndpointReport {
                        label: endpoint.label.clone(),
                        healthy: true,
                        latency_ms,
                        detail: Some(detail),
                        error: None,
                    },
                    Ok(Err(e)) => EndpointReport {
                        label: endpoint.label.clone(),
                        healthy: false,
                        latency_ms,
                        detail: None,
                        error: Some(e.to_string()),
                    },
                    Err(_) => EndpointReport {
                        label: endpoint.label.clone(),
                        healthy: false,
                        latency_ms,
                        detail: None,
                        error: Some(format!("timed out after {timeout:?}")),
                    },
                }
            }
        });
        join_all(checks).await
    }
}

/// Short provider name from a URL host ("starknet-mainnet.g.alchemy.com" -> "alchemy").
pub fn provider_label(url: &Url) -> String {
    let Some(host) = url.host_str() else {
        return url.scheme().to_string();
    };
    if host.parse::<std::net::IpAddr>().is_ok() || !host.contains('.') {
        return match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
    }
    let parts: Vec<&str> = host.split('.').collect();
    parts[parts.len() - 2].to_string()
}
