//! Service configuration
//!
//! Values come from the environment (after `.env` is loaded). An optional
//! network config file in the format the dapp uses
//! (`{"localhost": {"url": ..., "appAddress": ...}}`) supplies defaults for the
//! node URL and the app contract address.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ethabi::Address;
use serde::Deserialize;

use crate::chain::codec;
use crate::error::ConfigError;
use crate::models::OracleIndexSet;

pub mod contracts;

pub use contracts::{ContractConfig, ContractsConfig};

/// Reads one setting by name.
pub type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

pub const DEFAULT_RPC_URL: &str = "ws://127.0.0.1:8545";
pub const DEFAULT_GAS_LIMIT: u64 = 500_000;
pub const DEFAULT_SUBMIT_RETRIES: u32 = 2;
pub const DEFAULT_RPC_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_NETWORK: &str = "localhost";
pub const DEFAULT_CORS_ALLOWED_ORIGINS: &str = "http://localhost:8000";
const DEFAULT_INDEXES: &str = "1,2,3";

/// How the oracle learns which request indexes it answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexSource {
    Static(OracleIndexSet),
    /// Ask the contract's `getMyIndexes()` as the signing account.
    Contract,
}

#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub rpc_url: String,
    pub contracts: ContractsConfig,
    pub index_source: IndexSource,
    /// Signing account; the node's first account when unset.
    pub account: Option<Address>,
    pub from_block: u64,
    pub gas_limit: u64,
    pub submit_retries: u32,
    pub rpc_timeout: Duration,
    pub bind_addr: SocketAddr,
    /// Comma-separated origins allowed to call the HTTP API.
    pub cors_allowed_origins: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkEntry {
    url: Option<String>,
    app_address: Option<String>,
}

impl OracleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let network = match lookup("ORACLE_CONFIG_FILE") {
            Some(path) => {
                let name = lookup("ORACLE_NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string());
                Some(read_network(Path::new(&path), &name)?)
            }
            None => None,
        };
        let (file_url, file_app_address) = match network {
            Some(entry) => (entry.url, entry.app_address),
            None => (None, None),
        };

        let rpc_url = lookup("RPC_URL")
            .or(file_url)
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let rpc_url = websocket_url(&rpc_url)?;

        let contracts = ContractsConfig::from_lookup(lookup, file_app_address)?;

        let index_source = match lookup("ORACLE_INDEXES") {
            Some(value) if value.trim().eq_ignore_ascii_case("contract") => IndexSource::Contract,
            value => {
                let value = value.unwrap_or_else(|| DEFAULT_INDEXES.to_string());
                IndexSource::Static(value.parse().map_err(|reason| ConfigError::Invalid {
                    key: "ORACLE_INDEXES",
                    reason,
                })?)
            }
        };

        let account = lookup("ORACLE_ACCOUNT")
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                codec::parse_address(value.trim()).map_err(|err| ConfigError::Invalid {
                    key: "ORACLE_ACCOUNT",
                    reason: err.to_string(),
                })
            })
            .transpose()?;

        let host: IpAddr = parse_or(lookup, "HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port: u16 = parse_or(lookup, "PORT", DEFAULT_PORT)?;

        Ok(Self {
            rpc_url,
            contracts,
            index_source,
            account,
            from_block: parse_or(lookup, "FROM_BLOCK", 0)?,
            gas_limit: parse_or(lookup, "GAS_LIMIT", DEFAULT_GAS_LIMIT)?,
            submit_retries: parse_or(lookup, "SUBMIT_RETRIES", DEFAULT_SUBMIT_RETRIES)?,
            rpc_timeout: Duration::from_secs(parse_or(
                lookup,
                "RPC_TIMEOUT_SECONDS",
                DEFAULT_RPC_TIMEOUT_SECONDS,
            )?),
            bind_addr: SocketAddr::new(host, port),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGINS.to_string()),
        })
    }
}

fn parse_or<T>(lookup: &Lookup<'_>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

/// The dapp config stores the HTTP endpoint; subscriptions need the
/// WebSocket one on the same host.
fn websocket_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    let converted = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    };

    if !(converted.starts_with("ws://") || converted.starts_with("wss://")) {
        return Err(ConfigError::Invalid {
            key: "RPC_URL",
            reason: format!("unsupported scheme in {url:?}"),
        });
    }

    Ok(converted)
}

fn read_network(path: &Path, name: &str) -> Result<NetworkEntry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut networks: HashMap<String, NetworkEntry> =
        serde_json::from_str(&content).map_err(|err| ConfigError::Invalid {
            key: "ORACLE_CONFIG_FILE",
            reason: err.to_string(),
        })?;

    networks
        .remove(name)
        .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
}
