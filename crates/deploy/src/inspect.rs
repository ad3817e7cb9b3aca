//! Post-deployment checks against the chain.

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::{Context, Result};

use crate::{
    artifact::{FUND_ME, MOCK_AGGREGATOR},
    chain::ChainClient,
    deployments::{DeploymentSet, DeploymentStore},
    network::NetworkProfile,
    resolver::resolve_price_feed,
};

/// What a deployed FundMe reports about its price feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub fund_me: Address,
    /// Value returned by `priceFeed()`.
    pub price_feed: Address,
    /// Feed the network resolves to, if it can be resolved from persisted records.
    pub expected: Option<Address>,
}

impl Inspection {
    pub fn is_consistent(&self) -> bool {
        self.expected == Some(self.price_feed)
    }
}

/// Call `priceFeed()` on `fund_me`.
pub async fn read_price_feed<C: ChainClient>(chain: &C, fund_me: Address) -> Result<Address> {
    let data = Bytes::copy_from_slice(&alloy_core::primitives::keccak256("priceFeed()")[..4]);
    let output = chain.call(fund_me, data).await?;
    if output.len() < 32 {
        anyhow::bail!(
            "priceFeed() on {} returned {} bytes, is it a FundMe contract?",
            fund_me,
            output.len()
        );
    }
    Ok(Address::from_word(B256::from_slice(&output[..32])))
}

/// Compare the price feed of the recorded FundMe with the one the network resolves to.
pub async fn inspect<C: ChainClient>(
    chain: &C,
    network: &NetworkProfile,
    store: &DeploymentStore,
) -> Result<Inspection> {
    let fund_me = store
        .load(FUND_ME)?
        .with_context(|| format!("{} is not deployed on network '{}'", FUND_ME, network.name))?;

    let mut recorded = DeploymentSet::new();
    if let Some(mock) = store.load(MOCK_AGGREGATOR)? {
        recorded.insert(mock);
    }

    let price_feed = read_price_feed(chain, fund_me.address).await?;
    let expected = match resolve_price_feed(network, &recorded) {
        Ok(address) => Some(address),
        Err(err) => {
            tracing::warn!(error = %err, "Cannot resolve the expected price feed");
            None
        }
    };

    tracing::info!(
        fund_me = %fund_me.address,
        price_feed = %price_feed,
        expected = ?expected,
        "FundMe inspected"
    );

    Ok(Inspection {
        fund_me: fund_me.address,
        price_feed,
        expected,
    })
}
