// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::data_path::resolve_data_path;
use crate::common::parsing::{parse_eth_amount, parse_felt, split_list};
use crate::domain::constants;
use crate::domain::error::AppError;
use crate::network::rpc_pool::PoolPolicy;
use alloy::primitives::{Address, U256};
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use starknet::core::types::Felt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_false")]
    pub debug: bool,
    #[serde(default = "default_false")]
    pub log_json: bool,
    pub data_dir: Option<String>,
    pub state_path: Option<String>,

    // Source chain (EVM)
    #[serde(default = "default_source_chain")]
    pub source_chain_id: u64,
    #[serde(default, deserialize_with = "deserialize_url_list")]
    pub evm_rpc_urls: Vec<String>,
    pub source_address: Option<Address>,
    pub source_key: Option<String>,
    pub bridge_contract: Option<Address>,
    #[serde(default = "default_bridge_gas_limit")]
    pub bridge_gas_limit: u64,
    #[serde(default = "default_bridge_fee")]
    pub bridge_fee_eth: String,
    #[serde(default = "default_max_gas")]
    pub max_gas_price_gwei: u64,

    // StarkNet
    #[serde(default, deserialize_with = "deserialize_url_list")]
    pub starknet_rpc_urls: Vec<String>,
    pub starknet_address: Option<String>,
    pub starknet_key: Option<String>,
    pub starknet_eth_token: Option<String>,
    pub account_class_hash: Option<String>,
    #[serde(default = "default_salt")]
    pub account_salt: String,
    pub sweep_destination: Option<String>,

    // Ghost sentry
    pub ghost_address: Option<String>,
    pub ghost_key: Option<String>,
    #[serde(default = "default_ghost_threshold")]
    pub ghost_threshold_eth: String,

    // Thresholds
    #[serde(default = "default_activation_threshold")]
    pub activation_threshold_eth: String,
    #[serde(default = "default_gas_reserve")]
    pub gas_reserve_eth: String,
    #[serde(default = "default_min_bridge")]
    pub min_bridge_eth: String,
    #[serde(default = "default_sweep_gas_reserve")]
    pub sweep_gas_reserve_eth: String,

    // Timing
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_sentry_interval_secs")]
    pub sentry_interval_secs: u64,
    #[serde(default = "default_bridge_timeout_secs")]
    pub bridge_timeout_secs: u64,
    #[serde(default = "default_mint_timeout_secs")]
    pub mint_timeout_secs: u64,
    #[serde(default = "default_activation_timeout_secs")]
    pub activation_timeout_secs: u64,
    #[serde(default = "default_gas_wait_timeout_secs")]
    pub gas_wait_timeout_secs: u64,
    #[serde(default = "default_max_step_errors")]
    pub max_step_errors: u32,

    // RPC pool
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_rpc_max_failures")]
    pub rpc_max_failures: usize,
    #[serde(default = "default_rpc_cooldown_secs")]
    pub rpc_cooldown_secs: u64,

    // Notifications
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

// Defaults
fn default_false() -> bool {
    false
}
fn default_source_chain() -> u64 {
    constants::CHAIN_BASE
}
fn default_bridge_gas_limit() -> u64 {
    constants::DEFAULT_BRIDGE_GAS_LIMIT
}
fn default_bridge_fee() -> String {
    constants::DEFAULT_BRIDGE_FEE_ETH.to_string()
}
fn default_max_gas() -> u64 {
    constants::DEFAULT_MAX_GAS_PRICE_GWEI
}
fn default_salt() -> String {
    "0x0".to_string()
}
fn default_ghost_threshold() -> String {
    constants::DEFAULT_GHOST_THRESHOLD_ETH.to_string()
}
fn default_activation_threshold() -> String {
    constants::DEFAULT_ACTIVATION_THRESHOLD_ETH.to_string()
}
fn default_gas_reserve() -> String {
    constants::DEFAULT_GAS_RESERVE_ETH.to_string()
}
fn default_min_bridge() -> String {
    constants::DEFAULT_MIN_BRIDGE_ETH.to_string()
}
fn default_sweep_gas_reserve() -> String {
    constants::DEFAULT_SWEEP_GAS_RESERVE_ETH.to_string()
}
fn default_poll_interval_secs() -> u64 {
    constants::BALANCE_CHECK_INTERVAL_SECS
}
fn default_sentry_interval_secs() -> u64 {
    constants::SENTRY_INTERVAL_SECS
}
fn default_bridge_timeout_secs() -> u64 {
    constants::BRIDGE_TIMEOUT_SECS
}
fn default_mint_timeout_secs() -> u64 {
    constants::MINT_TIMEOUT_SECS
}
fn default_activation_timeout_secs() -> u64 {
    constants::ACTIVATION_TIMEOUT_SECS
}
fn default_gas_wait_timeout_secs() -> u64 {
    constants::GAS_WAIT_TIMEOUT_SECS
}
fn default_max_step_errors() -> u32 {
    5
}
fn default_rpc_timeout_secs() -> u64 {
    constants::RPC_TIMEOUT_SECS
}
fn default_rpc_max_failures() -> usize {
    3
}
fn default_rpc_cooldown_secs() -> u64 {
    60
}

fn deserialize_url_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{Error, SeqAccess, Visitor};
    use std::fmt;

    struct UrlListVisitor;

    impl<'de> Visitor<'de> for UrlListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a sequence of URLs or a string with comma-separated URLs")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            Ok(split_list(v))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                out.extend(split_list(&elem));
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(UrlListVisitor)
}

/// Thresholds resolved to wei once so the kernel never re-parses strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    pub activation_wei: U256,
    pub gas_reserve_wei: U256,
    pub min_bridge_wei: U256,
    pub sweep_gas_reserve_wei: U256,
    pub ghost_wei: U256,
    pub bridge_fee_wei: U256,
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > selected file.
        builder = builder.add_source(Environment::default());

        let mut settings: GlobalSettings = builder.build()?.try_deserialize()?;
        settings.apply_env_fallbacks();
        settings.validate()?;
        Ok(settings)
    }

    /// Pick up the provider-specific env keys the older scripts used.
    fn apply_env_fallbacks(&mut self) {
        if self.evm_rpc_urls.is_empty() {
            self.evm_rpc_urls = urls_from_env(constants::EVM_RPC_ENV_KEYS);
        }
        if self.evm_rpc_urls.is_empty() {
            self.evm_rpc_urls = vec![constants::DEFAULT_EVM_RPC_URL.to_string()];
        }
        if self.starknet_rpc_urls.is_empty() {
            self.starknet_rpc_urls = urls_from_env(constants::STARKNET_RPC_ENV_KEYS);
        }
        if self.starknet_address.is_none() {
            self.starknet_address = env_value("STARKNET_WALLET_ADDRESS");
        }
        if self.starknet_key.is_none() {
            self.starknet_key = env_value("STARKNET_PRIVATE_KEY");
        }
        if self.ghost_address.is_none() {
            self.ghost_address = env_value("STARKNET_GHOST_ADDRESS");
        }
        if self.ghost_key.is_none() {
            self.ghost_key = env_value("STARKNET_GHOST_PRIVATE_KEY");
        }
        if self.source_key.is_none() {
            self.source_key = env_value("SOURCE_PRIVATE_KEY");
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        for url in self.evm_rpc_urls.iter().chain(self.starknet_rpc_urls.iter()) {
            Url::parse(url).map_err(|e| {
                AppError::Config(format!("Invalid RPC URL {}: {}", redact_url(url), e))
            })?;
        }
        self.thresholds()?;
        if self.sentry_interval_secs == 0 {
            return Err(AppError::Config("sentry_interval_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds, AppError> {
        Ok(Thresholds {
            activation_wei: parse_eth_amount(
                "activation_threshold_eth",
                &self.activation_threshold_eth,
            )?,
            gas_reserve_wei: parse_eth_amount("gas_reserve_eth", &self.gas_reserve_eth)?,
            min_bridge_wei: parse_eth_amount("min_bridge_eth", &self.min_bridge_eth)?,
            sweep_gas_reserve_wei: parse_eth_amount(
                "sweep_gas_reserve_eth",
                &self.sweep_gas_reserve_eth,
            )?,
            ghost_wei: parse_eth_amount("ghost_threshold_eth", &self.ghost_threshold_eth)?,
            bridge_fee_wei: parse_eth_amount("bridge_fee_eth", &self.bridge_fee_eth)?,
        })
    }

    pub fn state_path(&self) -> PathBuf {
        let raw = std::env::var("STATE_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| self.state_path.clone())
            .unwrap_or_else(|| format!("data/{}", constants::STATE_FILE_NAME));
        resolve_data_path(&raw, self.data_dir.as_deref())
    }

    pub fn starknet_address_value(&self) -> Result<Felt, AppError> {
        let raw = self
            .starknet_address
            .as_deref()
            .ok_or_else(|| AppError::Config("starknet_address is not configured".into()))?;
        parse_felt("starknet_address", raw)
    }

    pub fn ghost_address_value(&self) -> Result<Felt, AppError> {
        let raw = self
            .ghost_address
            .as_deref()
            .ok_or_else(|| AppError::Config("ghost_address is not configured".into()))?;
        parse_felt("ghost_address", raw)
    }

    pub fn sweep_destination_value(&self) -> Result<Option<Felt>, AppError> {
        self.sweep_destination
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|raw| parse_felt("sweep_destination", raw))
            .transpose()
    }

    pub fn account_class_hash_value(&self) -> Result<Felt, AppError> {
        match self.account_class_hash.as_deref() {
            Some(raw) => parse_felt("account_class_hash", raw),
            None => Ok(*constants::ACCOUNT_CLASS_HASH),
        }
    }

    pub fn account_salt_value(&self) -> Result<Felt, AppError> {
        parse_felt("account_salt", &self.account_salt)
    }

    pub fn starknet_eth_token_value(&self) -> Result<Felt, AppError> {
        match self.starknet_eth_token.as_deref() {
            Some(raw) => parse_felt("starknet_eth_token", raw),
            None => Ok(*constants::STARKNET_ETH_TOKEN),
        }
    }

    pub fn bridge_contract_value(&self) -> Address {
        self.bridge_contract.unwrap_or(constants::STARKGATE_BRIDGE)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs.max(1))
    }

    pub fn rpc_cooldown(&self) -> Duration {
        Duration::from_secs(self.rpc_cooldown_secs)
    }

    pub fn pool_policy(&self) -> PoolPolicy {
        PoolPolicy {
            request_timeout: self.rpc_timeout(),
            max_failures: self.rpc_max_failures.max(1),
            cooldown: self.rpc_cooldown(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn sentry_interval(&self) -> Duration {
        Duration::from_secs(self.sentry_interval_secs.max(1))
    }

    pub fn telegram_credentials(&self) -> Option<(String, String)> {
        let token = self
            .telegram_bot_token
            .clone()
            .or_else(|| env_value("TELEGRAM_BOT_TOKEN"))?;
        let chat = self
            .telegram_chat_id
            .clone()
            .or_else(|| env_value("TELEGRAM_CHAT_ID"))?;
        Some((token, chat))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn urls_from_env(keys: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for key in keys {
        if let Some(v) = env_value(key) {
            for url in split_list(&v) {
                if Url::parse(&url).is_ok() && !out.contains(&url) {
                    out.push(url);
                }
            }
        }
    }
    out
}

/// Keep scheme and host only; provider API keys usually live in the path or query.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{}", url.scheme(), host),
            None => url.scheme().to_string(),
        },
        Err(_) => "<invalid-url>".to_string(),
    }
}
