// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven configuration, read once at startup.

use ethers::types::Address;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Sentinel that disables an optional provider key.
pub const DISABLED: &str = "-";

const DEFAULT_DATA_PATH: &str = "./data";
const DEFAULT_NETWORK: &str = "sepolia";
const DEFAULT_CONFIRMATION_BLOCKS: u64 = 20;
const DEFAULT_STALE_PONG_TIMEOUT_MINUTES: u64 = 15;
const DEFAULT_COOLDOWN_PERIOD_MINUTES: u64 = 2;
const DEFAULT_MAX_BLOCKS_BATCH_SIZE: u64 = 1000;
const DEFAULT_PROVIDERS_RPS: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("no RPC provider enabled; set at least one of ALCHEMY_API_KEY, INFURA_API_KEY, ANKR_API_KEY")]
    NoProviders,
}

#[derive(Clone)]
pub struct BotConfig {
    pub contract_address: Address,
    /// 64 hex chars, held without the 0x prefix. Never logged.
    wallet_private_key: String,
    pub starting_block: u64,
    pub data_path: PathBuf,
    pub confirmation_blocks: u64,
    pub stale_pong_timeout_minutes: u64,
    pub cooldown_period_minutes: u64,
    pub max_blocks_batch_size: u64,
    pub providers_rps: u32,
    pub network: String,
    alchemy_api_key: Option<String>,
    infura_api_key: Option<String>,
    ankr_api_key: Option<String>,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("contract_address", &self.contract_address)
            .field("wallet_private_key", &"<redacted>")
            .field("starting_block", &self.starting_block)
            .field("data_path", &self.data_path)
            .field("confirmation_blocks", &self.confirmation_blocks)
            .field("stale_pong_timeout_minutes", &self.stale_pong_timeout_minutes)
            .field("cooldown_period_minutes", &self.cooldown_period_minutes)
            .field("max_blocks_batch_size", &self.max_blocks_batch_size)
            .field("providers_rps", &self.providers_rps)
            .field("network", &self.network)
            .field("providers", &self.provider_names())
            .finish()
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A .env next to the binary is a convenience, not a requirement
        let _ = dotenv::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let contract_address = require(&lookup, "CONTRACT_ADDRESS")?
            .parse::<Address>()
            .map_err(|e| ConfigError::InvalidValue("CONTRACT_ADDRESS", e.to_string()))?;

        let raw_key = require(&lookup, "WALLET_PRIVATE_KEY")?;
        let wallet_private_key = raw_key
            .strip_prefix("0x")
            .unwrap_or(&raw_key)
            .to_string();
        if wallet_private_key.len() != 64
            || !wallet_private_key.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ConfigError::InvalidValue(
                "WALLET_PRIVATE_KEY",
                "expected 32 bytes of hex".to_string(),
            ));
        }

        let starting_block = parse_required(&lookup, "STARTING_BLOCK")?;

        let config = Self {
            contract_address,
            wallet_private_key,
            starting_block,
            data_path: PathBuf::from(
                lookup("DATA_PATH").unwrap_or_else(|| DEFAULT_DATA_PATH.to_string()),
            ),
            confirmation_blocks: parse_optional(
                &lookup,
                "CONFIRMATION_BLOCKS",
                DEFAULT_CONFIRMATION_BLOCKS,
            )?,
            stale_pong_timeout_minutes: parse_optional(
                &lookup,
                "STALE_PONG_TIMEOUT_MINUTES",
                DEFAULT_STALE_PONG_TIMEOUT_MINUTES,
            )?,
            cooldown_period_minutes: parse_optional(
                &lookup,
                "COOLDOWN_PERIOD_MINUTES",
                DEFAULT_COOLDOWN_PERIOD_MINUTES,
            )?,
            max_blocks_batch_size: parse_optional(
                &lookup,
                "MAX_BLOCKS_BATCH_SIZE",
                DEFAULT_MAX_BLOCKS_BATCH_SIZE,
            )?,
            providers_rps: parse_optional(&lookup, "PROVIDERS_RPS", DEFAULT_PROVIDERS_RPS)?,
            network: lookup("NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            alchemy_api_key: api_key(lookup("ALCHEMY_API_KEY")),
            infura_api_key: api_key(lookup("INFURA_API_KEY")),
            ankr_api_key: api_key(lookup("ANKR_API_KEY")),
        };

        if config.provider_endpoints().is_empty() {
            return Err(ConfigError::NoProviders);
        }
        Ok(config)
    }

    pub fn wallet_private_key(&self) -> &str {
        &self.wallet_private_key
    }

    pub fn stale_pong_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_pong_timeout_minutes * 60)
    }

    pub fn cooldown_period(&self) -> Duration {
        Duration::from_secs(self.cooldown_period_minutes * 60)
    }

    /// Enabled providers in priority order. The first one is the primary:
    /// heights, logs, nonces, fee estimates and submissions go through it.
    pub fn provider_endpoints(&self) -> Vec<(String, String)> {
        let mut endpoints = Vec::new();
        if let Some(key) = &self.alchemy_api_key {
            endpoints.push((
                "alchemy".to_string(),
                format!("https://eth-{}.g.alchemy.com/v2/{}", self.network, key),
            ));
        }
        if let Some(key) = &self.infura_api_key {
            endpoints.push((
                "infura".to_string(),
                format!("https://{}.infura.io/v3/{}", self.network, key),
            ));
        }
        if let Some(key) = &self.ankr_api_key {
            let chain = if self.network == "mainnet" {
                "eth".to_string()
            } else {
                format!("eth_{}", self.network)
            };
            endpoints.push((
                "ankr".to_string(),
                format!("https://rpc.ankr.com/{}/{}", chain, key),
            ));
        }
        endpoints
    }

    fn provider_names(&self) -> Vec<String> {
        self.provider_endpoints()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingRequired(name)),
    }
}

fn parse_required<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<T, ConfigError> {
    require(lookup, name)?
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(name, lookup(name).unwrap_or_default()))
}

fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name, value)),
        _ => Ok(default),
    }
}

fn api_key(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != DISABLED)
}
