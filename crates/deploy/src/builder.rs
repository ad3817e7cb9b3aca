//! Builder module for creating a [`Deployer`] from [`Settings`].
//!
//! [`DeployerBuilder`] resolves the network profile, loads the compiled artifacts,
//! connects to the node and sets up the explorer client when a credential is
//! configured.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    Deployer,
    artifact::ContractArtifacts,
    chain::{JsonRpcChain, TxSender},
    config::Settings,
    deployments::DeploymentStore,
    network::NetworkProfile,
    verify::EtherscanVerifier,
};

/// The deployer used by the command line: JSON-RPC node and Etherscan explorer.
pub type DefaultDeployer = Deployer<JsonRpcChain, EtherscanVerifier>;

/// Builder for creating a [`Deployer`].
///
/// # Example
///
/// ```no_run
/// use fundme_deploy::{DeployerBuilder, Settings, Tag};
///
/// # async fn example() -> anyhow::Result<()> {
/// let settings = Settings::load("Fundme.toml".as_ref())?;
/// let mut deployer = DeployerBuilder::new(settings)
///     .network("localhost")
///     .build()?;
/// deployer.run(&[Tag::All]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeployerBuilder {
    settings: Settings,
    /// Network name, the configured default when not provided.
    network: Option<String>,
    /// Ignore deployments recorded by previous runs.
    reset: bool,
    /// Directory relative paths of the settings are resolved against.
    root: PathBuf,
}

impl DeployerBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            network: None,
            reset: false,
            root: PathBuf::from("."),
        }
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Set the network if one is given, keep the default otherwise.
    pub fn maybe_network(mut self, network: Option<String>) -> Self {
        if network.is_some() {
            self.network = network;
        }
        self
    }

    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// The profile of the selected network.
    pub fn profile(&self) -> Result<NetworkProfile> {
        self.settings.profile(self.network.as_deref())
    }

    /// Name of the selected network, checked against the configured networks.
    pub fn network_name(&self) -> Result<&str> {
        let (name, _) = self.settings.network(self.network.as_deref())?;
        Ok(name)
    }

    /// The record store of the selected network.
    ///
    /// Only reads the filesystem, so the network needs no RPC URL.
    pub fn store(&self) -> Result<DeploymentStore> {
        Ok(DeploymentStore::new(
            &self.root.join(&self.settings.deployments_dir),
            self.network_name()?,
        ))
    }

    /// A client of the selected network's node.
    pub fn chain(&self) -> Result<JsonRpcChain> {
        let profile = self.profile()?;
        let sender = TxSender::for_network(&profile)?;
        Ok(JsonRpcChain::new(profile.rpc_url.as_str(), sender)?
            .poll_interval(self.settings.poll_interval())
            .receipt_timeout(self.settings.receipt_timeout()))
    }

    /// Build the [`Deployer`].
    pub fn build(self) -> Result<DefaultDeployer> {
        let profile = self.profile()?;
        let artifacts = ContractArtifacts::load(&self.root, &self.settings.artifacts)
            .context("Failed to load contract artifacts, are the contracts compiled?")?;
        let verifier = EtherscanVerifier::from_config(&self.settings.explorer)?;

        tracing::debug!(
            network = %profile.name,
            rpc_url = %profile.rpc_url,
            local = profile.is_local,
            signer = profile.private_key.is_some(),
            verifier = verifier.is_some(),
            "Deployer configured"
        );

        Ok(Deployer::new(
            profile,
            self.chain()?,
            verifier,
            self.store()?,
            artifacts,
        )
        .mocks(self.settings.mocks)
        .reuse(!self.reset))
    }
}
