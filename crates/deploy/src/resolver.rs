//! Price feed resolution.

use alloy_core::primitives::Address;

use crate::{
    artifact::MOCK_AGGREGATOR, deployments::DeploymentSet, error::DeployError,
    network::NetworkProfile,
};

/// The ETH/USD price feed FundMe must be constructed with on `network`.
///
/// Local networks use the mock aggregator deployed in the current run; every other
/// network uses the address registered for its chain id. The lookup has no side
/// effects and never deploys anything.
pub fn resolve_price_feed(
    network: &NetworkProfile,
    deployments: &DeploymentSet,
) -> Result<Address, DeployError> {
    if network.is_local {
        return deployments
            .address_of(MOCK_AGGREGATOR)
            .ok_or_else(|| DeployError::MissingMock {
                network: network.name.clone(),
            });
    }

    network
        .eth_usd_price_feed
        .ok_or_else(|| DeployError::UnknownNetwork {
            network: network.name.clone(),
            chain_id: network.chain_id,
        })
}

#[cfg(test)]
mod tests {
    use alloy_core::{
        json_abi::JsonAbi,
        primitives::{B256, address},
    };
    use url::Url;

    use super::*;
    use crate::{
        deployments::DeploymentRecord,
        network::{
            GOERLI_ETH_USD_PRICE_FEED, NetworkConfig, SEPOLIA_ETH_USD_PRICE_FEED,
        },
    };

    const MOCK_ADDRESS: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

    fn profile(name: &str, config: NetworkConfig) -> NetworkProfile {
        let config = NetworkConfig {
            rpc_url: Some(Url::parse("http://127.0.0.1:8545").unwrap()),
            ..config
        };
        NetworkProfile::from_config(name, &config).unwrap()
    }

    fn with_mock() -> DeploymentSet {
        let mut set = DeploymentSet::new();
        set.insert(DeploymentRecord {
            contract_name: MOCK_AGGREGATOR.to_string(),
            address: MOCK_ADDRESS,
            deployer: Address::ZERO,
            transaction_hash: B256::ZERO,
            abi: JsonAbi::default(),
            args: vec![],
            block_number: 1,
            gas_used: 0,
            fingerprint: String::new(),
            deployed_at: 0,
        });
        set
    }

    #[test]
    fn test_local_network_uses_mock() {
        let hardhat = profile("hardhat", NetworkConfig::development());
        assert_eq!(resolve_price_feed(&hardhat, &with_mock()), Ok(MOCK_ADDRESS));
    }

    #[test]
    fn test_local_network_ignores_static_feed() {
        // A configured feed on a local network must not shadow the mock.
        let config = NetworkConfig {
            eth_usd_price_feed: Some(GOERLI_ETH_USD_PRICE_FEED),
            ..NetworkConfig::development()
        };
        let localhost = profile("localhost", config);
        assert_eq!(resolve_price_feed(&localhost, &with_mock()), Ok(MOCK_ADDRESS));
    }

    #[test]
    fn test_local_network_without_mock() {
        let hardhat = profile("hardhat", NetworkConfig::development());
        assert_eq!(
            resolve_price_feed(&hardhat, &DeploymentSet::new()),
            Err(DeployError::MissingMock {
                network: "hardhat".to_string()
            })
        );
    }

    #[test]
    fn test_remote_networks_use_registered_feed() {
        let goerli = profile("goerli", NetworkConfig::remote(5, GOERLI_ETH_USD_PRICE_FEED, 6));
        let sepolia = profile(
            "sepolia",
            NetworkConfig::remote(11155111, SEPOLIA_ETH_USD_PRICE_FEED, 6),
        );

        // A mock in the set is irrelevant on remote networks.
        assert_eq!(
            resolve_price_feed(&goerli, &with_mock()),
            Ok(GOERLI_ETH_USD_PRICE_FEED)
        );
        assert_eq!(
            resolve_price_feed(&sepolia, &DeploymentSet::new()),
            Ok(SEPOLIA_ETH_USD_PRICE_FEED)
        );
    }

    #[test]
    fn test_remote_network_without_feed() {
        let polygon = profile(
            "polygon",
            NetworkConfig {
                eth_usd_price_feed: None,
                ..NetworkConfig::remote(137, Address::ZERO, 1)
            },
        );
        assert_eq!(
            resolve_price_feed(&polygon, &DeploymentSet::new()),
            Err(DeployError::UnknownNetwork {
                network: "polygon".to_string(),
                chain_id: 137
            })
        );
    }
}
