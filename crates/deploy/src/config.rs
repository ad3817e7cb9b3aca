//! Layered configuration.
//!
//! Settings are merged from, in increasing priority:
//! 1. built-in defaults (known networks, mock parameters, artifact paths)
//! 2. the `Fundme.toml` file
//! 3. `FUNDME_`-prefixed environment variables, nested with `__`
//!    (e.g. `FUNDME_NETWORKS__GOERLI__BLOCK_CONFIRMATIONS=3`)
//!
//! Values that are conventionally kept in the environment (`API_KEY`,
//! `<NETWORK>_RPC_URL`, `<NETWORK>_PRIVATE_KEY`) are applied last, only where the
//! merged configuration left them empty.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::network::{
    DEFAULT_NETWORK, NetworkConfig, NetworkProfile, PrivateKey, builtin_networks, env_var_name,
};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Fundme.toml";

/// Prefix of the environment variables merged into the settings.
pub const ENV_PREFIX: &str = "FUNDME_";

/// Environment variable holding the block explorer API key.
pub const API_KEY_ENV: &str = "API_KEY";

/// Default Etherscan v2 endpoint. The chain is selected with the `chainid` query parameter.
pub const DEFAULT_EXPLORER_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Decimals of the mock ETH/USD aggregator.
pub const DEFAULT_MOCK_DECIMALS: u8 = 8;

/// Initial answer of the mock aggregator: 2000 USD with 8 decimals.
pub const DEFAULT_MOCK_INITIAL_ANSWER: i64 = 2000_0000_0000;

const REDACTED: &str = "<redacted>";

/// Constructor parameters of the mock aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockConfig {
    pub decimals: u8,
    pub initial_answer: i64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            decimals: DEFAULT_MOCK_DECIMALS,
            initial_answer: DEFAULT_MOCK_INITIAL_ANSWER,
        }
    }
}

/// Paths to the compiled contract artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub fund_me: PathBuf,
    pub mock_aggregator: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            fund_me: PathBuf::from("artifacts/contracts/FundMe.sol/FundMe.json"),
            mock_aggregator: PathBuf::from(
                "artifacts/contracts/test/MockV3Aggregator.sol/MockV3Aggregator.json",
            ),
        }
    }
}

/// Block explorer used for source verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub api_url: Url,
    /// Verification is skipped when no key is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Seconds between two verification status checks.
    pub poll_interval_secs: u64,
    /// Maximum number of status checks before giving up.
    pub max_status_checks: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_EXPLORER_API_URL).expect("default explorer URL is valid"),
            api_key: None,
            poll_interval_secs: 5,
            max_status_checks: 12,
        }
    }
}

impl ExplorerConfig {
    /// The API key, if one is set and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Fully merged harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Network used when none is selected on the command line.
    pub default_network: String,
    /// Root of the persisted deployment records.
    pub deployments_dir: PathBuf,
    /// Milliseconds between two receipt or block number polls.
    pub poll_interval_ms: u64,
    /// Give up waiting for a receipt, and then for its confirmations, after this many
    /// seconds. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_timeout_secs: Option<u64>,
    /// Known networks by name.
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Mock aggregator constructor parameters.
    pub mocks: MockConfig,
    /// Compiled artifacts.
    pub artifacts: ArtifactPaths,
    /// Block explorer settings.
    pub explorer: ExplorerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_network: DEFAULT_NETWORK.to_string(),
            deployments_dir: PathBuf::from("deployments"),
            poll_interval_ms: 1000,
            receipt_timeout_secs: None,
            networks: builtin_networks()
                .into_iter()
                .map(|(name, config)| (name.to_string(), config))
                .collect(),
            mocks: MockConfig::default(),
            artifacts: ArtifactPaths::default(),
            explorer: ExplorerConfig::default(),
        }
    }
}

impl Settings {
    /// The figment layering defaults, the config file and `FUNDME_` variables.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract settings from a figment, then apply the plain environment variables.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut settings: Self = figment
            .extract()
            .context("Failed to load the harness configuration")?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from `config_path` (missing file is fine) and the environment.
    pub fn load(config_path: &Path) -> Result<Self> {
        let settings = Self::from_figment(Self::figment(config_path))?;
        tracing::debug!(
            path = %config_path.display(),
            networks = settings.networks.len(),
            "Configuration loaded"
        );
        Ok(settings)
    }

    /// Fill unset secrets and endpoints from conventional environment variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.explorer.credential().is_none() {
            self.explorer.api_key = lookup(API_KEY_ENV).filter(|key| !key.trim().is_empty());
        }

        for (name, network) in self.networks.iter_mut() {
            if network.rpc_url.is_none() {
                let var = env_var_name(name, "RPC_URL");
                if let Some(raw) = lookup(&var).filter(|raw| !raw.trim().is_empty()) {
                    match Url::parse(raw.trim()) {
                        Ok(url) => network.rpc_url = Some(url),
                        Err(err) => {
                            tracing::warn!(var = %var, error = %err, "Ignoring malformed RPC URL")
                        }
                    }
                }
            }

            if network.private_key.is_none() {
                network.private_key = lookup(&env_var_name(name, "PRIVATE_KEY"))
                    .map(PrivateKey::new)
                    .filter(|key| !key.is_empty());
            }
        }
    }

    /// The configuration of `name`, or of the default network when `None`.
    pub fn network(&self, name: Option<&str>) -> Result<(&str, &NetworkConfig)> {
        let name = name.unwrap_or(&self.default_network);
        let (name, config) = self.networks.get_key_value(name).with_context(|| {
            format!(
                "Unknown network '{}', known networks: {}",
                name,
                self.networks
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;
        Ok((name.as_str(), config))
    }

    /// Resolve the profile of `name`, or of the default network when `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<NetworkProfile> {
        let (name, config) = self.network(name)?;
        NetworkProfile::from_config(name, config)
    }

    /// The merged settings as TOML, with keys and credentials masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if redacted.explorer.api_key.is_some() {
            redacted.explorer.api_key = Some(REDACTED.to_string());
        }
        for network in redacted.networks.values_mut() {
            if network.private_key.is_some() {
                network.private_key = Some(PrivateKey::new(REDACTED));
            }
        }
        toml::to_string_pretty(&redacted).context("Failed to serialize settings to TOML")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Option<Duration> {
        self.receipt_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::network::GOERLI_ETH_USD_PRICE_FEED;

    fn from_toml(content: &str) -> Settings {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(content))
            .extract()
            .expect("settings should extract")
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.default_network, "hardhat");
        assert_eq!(settings.mocks.decimals, 8);
        assert_eq!(settings.mocks.initial_answer, 200_000_000_000);
        assert!(settings.explorer.credential().is_none());

        let localhost = settings.profile(Some("localhost")).unwrap();
        assert!(localhost.is_local);
        assert_eq!(localhost.rpc_url.as_str(), "http://127.0.0.1:8545/");
    }

    #[test]
    fn test_toml_overrides_and_adds_networks() {
        let settings = from_toml(
            r#"
            default_network = "localhost"

            [mocks]
            decimals = 18
            initial_answer = 3000

            [networks.goerli]
            chain_id = 5
            rpc_url = "https://goerli.example.org/"
            eth_usd_price_feed = "0xD4a33860578De61DBAbDc8BFdb98FD742fA7028e"
            block_confirmations = 3

            [networks.polygon]
            chain_id = 137
            rpc_url = "https://polygon.example.org/"
            "#,
        );

        assert_eq!(settings.default_network, "localhost");
        assert_eq!(settings.mocks.decimals, 18);
        assert_eq!(settings.mocks.initial_answer, 3000);

        let goerli = settings.profile(Some("goerli")).unwrap();
        assert_eq!(goerli.block_confirmations, 3);
        assert_eq!(goerli.eth_usd_price_feed, Some(GOERLI_ETH_USD_PRICE_FEED));

        let polygon = settings.profile(Some("polygon")).unwrap();
        assert_eq!(polygon.chain_id, 137);
        assert_eq!(polygon.block_confirmations, 1);
        assert_eq!(polygon.eth_usd_price_feed, None);
        assert!(!polygon.is_local);

        // Built-in networks not mentioned in the file are kept.
        assert!(settings.networks.contains_key("sepolia"));
    }

    #[test]
    fn test_apply_env_fills_missing_values_only() {
        let mut settings = Settings::default();
        settings.networks.get_mut("sepolia").unwrap().rpc_url =
            Some(Url::parse("https://configured.example.org/").unwrap());

        let env: HashMap<&str, &str> = HashMap::from([
            ("API_KEY", "explorer-key"),
            ("GOERLI_RPC_URL", "https://goerli.example.org"),
            ("GOERLI_PRIVATE_KEY", "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"),
            ("SEPOLIA_RPC_URL", "https://ignored.example.org"),
        ]);
        settings.apply_env(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(settings.explorer.credential(), Some("explorer-key"));

        let goerli = settings.profile(Some("goerli")).unwrap();
        assert_eq!(goerli.rpc_url.as_str(), "https://goerli.example.org/");
        assert!(goerli.private_key.is_some());

        let sepolia = settings.profile(Some("sepolia")).unwrap();
        assert_eq!(sepolia.rpc_url.as_str(), "https://configured.example.org/");
    }

    #[test]
    fn test_blank_api_key_is_no_credential() {
        let mut settings = Settings::default();
        settings.apply_env(|key| (key == API_KEY_ENV).then(|| "  ".to_string()));
        assert!(settings.explorer.credential().is_none());
    }

    #[test]
    fn test_redacted_toml_hides_secrets() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            "API_KEY" => Some("explorer-key".to_string()),
            "GOERLI_PRIVATE_KEY" => Some("59c6995e998f97a5a0044966f0945389".to_string()),
            _ => None,
        });

        let toml = settings.to_redacted_toml().unwrap();
        assert!(!toml.contains("explorer-key"));
        assert!(!toml.contains("59c6995e"));
        assert!(toml.contains("<redacted>"));

        // The dump is itself a valid configuration file.
        let reparsed = from_toml(&toml);
        assert_eq!(reparsed.networks.len(), settings.networks.len());
        assert_eq!(reparsed.mocks, settings.mocks);
    }

    #[test]
    fn test_unknown_network() {
        let err = Settings::default().profile(Some("mainnet")).unwrap_err();
        assert!(err.to_string().contains("Unknown network 'mainnet'"));
        assert!(Settings::default().network(Some("mainnet")).is_err());
    }

    #[test]
    fn test_network_lookup_needs_no_rpc_url() {
        let settings = Settings::default();
        let (name, config) = settings.network(Some("goerli")).unwrap();
        assert_eq!(name, "goerli");
        assert_eq!(config.chain_id, 5);
        assert!(config.rpc_url.is_none());
        assert!(settings.profile(Some("goerli")).is_err());

        let (name, _) = settings.network(None).unwrap();
        assert_eq!(name, "hardhat");
    }
}
