// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use crate::network::rpc_pool::{PoolPolicy, RpcPool};
use alloy::network::Ethereum;
use alloy::providers::RootProvider;
use starknet::providers::JsonRpcClient;
use starknet::providers::jsonrpc::HttpTransport;
use url::Url;

pub type HttpProvider = RootProvider<Ethereum>;
pub type EvmPool = RpcPool<HttpProvider>;
pub type StarknetPool = RpcPool<StarknetRpc>;

/// StarkNet JSON-RPC client that remembers its endpoint, so signing paths can
/// build an owned provider for account/factory types.
pub struct StarknetRpc {
    url: Url,
    client: JsonRpcClient<HttpTransport>,
}

impl StarknetRpc {
    pub fn new(url: Url) -> Self {
        let client = JsonRpcClient::new(HttpTransport::new(url.clone()));
        Self { url, client }
    }

    pub fn client(&self) -> &JsonRpcClient<HttpTransport> {
        &self.client
    }

    pub fn owned_client(&self) -> JsonRpcClient<HttpTransport> {
        JsonRpcClient::new(HttpTransport::new(self.url.clone()))
    }
}

pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;
        Ok(RootProvider::new_http(url))
    }

    pub fn starknet(rpc_url: &str) -> Result<StarknetRpc, AppError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| AppError::Config(format!("Invalid StarkNet RPC URL: {}", e)))?;
        Ok(StarknetRpc::new(url))
    }

    pub fn evm_pool(urls: &[String], policy: PoolPolicy) -> Result<EvmPool, AppError> {
        RpcPool::from_urls("evm", urls, policy, |url| Ok(RootProvider::new_http(url)))
    }

    pub fn starknet_pool(urls: &[String], policy: PoolPolicy) -> Result<StarknetPool, AppError> {
        RpcPool::from_urls("starknet", urls, policy, |url| Ok(StarknetRpc::new(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_reject_bad_urls_and_empty_lists() {
        let policy = PoolPolicy::default();
        assert!(ConnectionFactory::starknet_pool(&[], policy).is_err());
        assert!(ConnectionFactory::evm_pool(&["not a url".to_string()], policy).is_err());
        let pool = ConnectionFactory::starknet_pool(
            &["https://starknet-mainnet.public.blastapi.io/rpc/v0_7".to_string()],
            policy,
        )
        .unwrap();
        assert_eq!(pool.labels(), vec!["blastapi"]);
    }
}
