//! Network profiles.
//!
//! A [`NetworkProfile`] is the explicit description of the chain a run targets. It is
//! resolved once from [`crate::Settings`] and then passed by reference to every step
//! that needs to know where it is deploying.

use std::fmt;

use alloy_core::primitives::{Address, address};
use serde::{Deserialize, Serialize};
use url::Url;

/// Chain id shared by the local development networks.
pub const DEV_CHAIN_ID: u64 = 31337;

/// Default RPC endpoint of a local development node.
pub const DEV_RPC_URL: &str = "http://127.0.0.1:8545";

/// Chainlink ETH/USD aggregator on Goerli.
pub const GOERLI_ETH_USD_PRICE_FEED: Address = address!("D4a33860578De61DBAbDc8BFdb98FD742fA7028e");

/// Chainlink ETH/USD aggregator on Sepolia.
pub const SEPOLIA_ETH_USD_PRICE_FEED: Address =
    address!("694AA1769357215DE4FAC081bf1f309aDC325306");

/// Name of the network used when none is selected.
pub const DEFAULT_NETWORK: &str = "hardhat";

fn default_block_confirmations() -> u64 {
    1
}

/// A hex-encoded private key. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key with a `0x` prefix, whatever the input looked like.
    pub fn expose(&self) -> String {
        let key = self.0.trim();
        if key.starts_with("0x") {
            key.to_string()
        } else {
            format!("0x{key}")
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().trim_start_matches("0x").is_empty()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Per-network entry of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// The chain id the RPC endpoint must report.
    pub chain_id: u64,
    /// The RPC endpoint. Filled from `<NETWORK>_RPC_URL` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    /// Signing key. Filled from `<NETWORK>_PRIVATE_KEY` when absent.
    /// Without a key, transactions are sent from the node's first unlocked account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
    /// Address of the ETH/USD price feed on this chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_usd_price_feed: Option<Address>,
    /// Blocks to wait for after a deployment transaction is mined.
    #[serde(default = "default_block_confirmations")]
    pub block_confirmations: u64,
    /// Development network: mocks are deployed and nothing is verified.
    #[serde(default)]
    pub local: bool,
}

impl NetworkConfig {
    /// A local development network served at [`DEV_RPC_URL`].
    pub fn development() -> Self {
        Self {
            chain_id: DEV_CHAIN_ID,
            rpc_url: Url::parse(DEV_RPC_URL).ok(),
            private_key: None,
            eth_usd_price_feed: None,
            block_confirmations: 1,
            local: true,
        }
    }

    /// A public network with a known price feed.
    pub fn remote(chain_id: u64, eth_usd_price_feed: Address, block_confirmations: u64) -> Self {
        Self {
            chain_id,
            rpc_url: None,
            private_key: None,
            eth_usd_price_feed: Some(eth_usd_price_feed),
            block_confirmations,
            local: false,
        }
    }
}

/// Networks known out of the box.
pub fn builtin_networks() -> Vec<(&'static str, NetworkConfig)> {
    vec![
        ("hardhat", NetworkConfig::development()),
        ("localhost", NetworkConfig::development()),
        (
            "goerli",
            NetworkConfig::remote(5, GOERLI_ETH_USD_PRICE_FEED, 6),
        ),
        (
            "sepolia",
            NetworkConfig::remote(11155111, SEPOLIA_ETH_USD_PRICE_FEED, 6),
        ),
    ]
}

/// The network a run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    /// Human name, also the name of the deployments sub-directory.
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Url,
    pub private_key: Option<PrivateKey>,
    /// Known oracle address. `None` on local networks.
    pub eth_usd_price_feed: Option<Address>,
    /// Confirmation count, at least 1.
    pub block_confirmations: u64,
    pub is_local: bool,
}

impl NetworkProfile {
    /// Build a profile from its configuration entry.
    pub fn from_config(name: &str, config: &NetworkConfig) -> anyhow::Result<Self> {
        let rpc_url = config.rpc_url.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "No RPC URL configured for network '{}', set {} or networks.{}.rpc_url",
                name,
                env_var_name(name, "RPC_URL"),
                name
            )
        })?;

        Ok(Self {
            name: name.to_string(),
            chain_id: config.chain_id,
            rpc_url,
            private_key: config.private_key.clone().filter(|key| !key.is_empty()),
            eth_usd_price_feed: config.eth_usd_price_feed,
            block_confirmations: config.block_confirmations.max(1),
            is_local: config.local,
        })
    }
}

/// Environment variable carrying a per-network value, e.g. `GOERLI_RPC_URL`.
pub fn env_var_name(network: &str, suffix: &str) -> String {
    format!(
        "{}_{}",
        network.to_ascii_uppercase().replace(['-', '.'], "_"),
        suffix
    )
}
