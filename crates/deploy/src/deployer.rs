use std::collections::BTreeMap;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, I256, U256},
};
use anyhow::{Context, Result};

use crate::{
    artifact::{ContractArtifact, ContractArtifacts, format_value},
    chain::ChainClient,
    config::MockConfig,
    deployments::{DeploymentRecord, DeploymentSet, DeploymentStore, fingerprint},
    error::DeployError,
    network::NetworkProfile,
    resolver::resolve_price_feed,
    steps::{DEFAULT_STEPS, Step, StepId, Tag, plan},
    verify::{VerificationOutcome, VerificationRequest, Verifier},
};

/// Whether a contract was sent in this run or taken from a previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeploymentStatus {
    Deployed,
    Reused,
}

/// A contract made available by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDeployment {
    pub name: String,
    pub address: Address,
    pub transaction_hash: B256,
    pub args: Vec<String>,
    pub status: DeploymentStatus,
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub network: String,
    pub steps: Vec<StepId>,
    pub contracts: Vec<ContractDeployment>,
    /// `None` when verification was not attempted.
    pub verification: Option<VerificationOutcome>,
}

impl RunReport {
    pub fn contract(&self, name: &str) -> Option<&ContractDeployment> {
        self.contracts.iter().find(|contract| contract.name == name)
    }
}

/// Runs the deployment steps against one network.
///
/// The deployer owns the run's [`DeploymentSet`]: every contract deployed or reused
/// by a step is added to it, and later steps read from it.
pub struct Deployer<C, V> {
    network: NetworkProfile,
    chain: C,
    verifier: Option<V>,
    store: DeploymentStore,
    artifacts: ContractArtifacts,
    mocks: MockConfig,
    steps: &'static [Step],
    reuse: bool,
    /// Persisted records whose code is still on chain.
    previous: BTreeMap<String, DeploymentRecord>,
    deployments: DeploymentSet,
}

impl<C: ChainClient, V: Verifier> Deployer<C, V> {
    pub fn new(
        network: NetworkProfile,
        chain: C,
        verifier: Option<V>,
        store: DeploymentStore,
        artifacts: ContractArtifacts,
    ) -> Self {
        Self {
            network,
            chain,
            verifier,
            store,
            artifacts,
            mocks: MockConfig::default(),
            steps: DEFAULT_STEPS,
            reuse: true,
            previous: BTreeMap::new(),
            deployments: DeploymentSet::new(),
        }
    }

    /// Constructor parameters of the mock aggregator.
    pub fn mocks(mut self, mocks: MockConfig) -> Self {
        self.mocks = mocks;
        self
    }

    /// Reuse live deployments recorded by previous runs. Enabled by default.
    pub fn reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    /// Contracts deployed or reused so far.
    pub fn deployments(&self) -> &DeploymentSet {
        &self.deployments
    }

    /// Run the steps selected by `tags`. An empty slice selects every step.
    pub async fn run(&mut self, tags: &[Tag]) -> Result<RunReport> {
        tracing::info!(
            network = %self.network.name,
            chain_id = self.network.chain_id,
            tags = ?tags,
            "Starting deployment..."
        );

        let chain_id = self.chain.chain_id().await?;
        if chain_id != self.network.chain_id {
            anyhow::bail!(
                "Network '{}' expects chain id {} but the node at {} reports {}",
                self.network.name,
                self.network.chain_id,
                self.network.rpc_url,
                chain_id
            );
        }
        self.store.ensure_chain_id(chain_id)?;

        if self.reuse {
            self.load_previous().await?;
        }

        let steps = plan(self.steps, tags)?;
        let mut report = RunReport {
            network: self.network.name.clone(),
            steps: steps.clone(),
            contracts: Vec::new(),
            verification: None,
        };

        for step in steps {
            tracing::debug!(step = %step, "Running step");
            match step {
                StepId::Mocks => {
                    if let Some(mock) = self.deploy_mocks().await? {
                        report.contracts.push(mock);
                    }
                }
                StepId::FundMe => {
                    let (fund_me, verification) = self.deploy_fund_me().await?;
                    report.contracts.push(fund_me);
                    report.verification = verification;
                }
            }
        }

        tracing::info!(network = %self.network.name, "✓ Deployment complete!");
        Ok(report)
    }

    async fn load_previous(&mut self) -> Result<()> {
        for record in self.store.load_all()? {
            let code = self.chain.get_code(record.address).await?;
            if code.is_empty() {
                tracing::debug!(
                    contract = %record.contract_name,
                    address = %record.address,
                    "Recorded deployment has no code on chain, ignoring it"
                );
                continue;
            }
            self.previous.insert(record.contract_name.clone(), record);
        }
        Ok(())
    }

    async fn deploy_mocks(&mut self) -> Result<Option<ContractDeployment>> {
        if !self.network.is_local {
            tracing::debug!(network = %self.network.name, "Not a local network, no mocks needed");
            return Ok(None);
        }

        tracing::info!("Local network detected, deploying mocks...");
        let initial_answer = I256::try_from(self.mocks.initial_answer)
            .context("Mock initial answer does not fit an int256")?;
        let args = vec![
            DynSolValue::Uint(U256::from(self.mocks.decimals), 8),
            DynSolValue::Int(initial_answer, 256),
        ];

        let artifact = self.artifacts.mock_aggregator.clone();
        let mock = self.deploy_contract(&artifact, args).await?;
        tracing::info!(address = %mock.address, "Mocks deployed");
        Ok(Some(mock))
    }

    async fn deploy_fund_me(
        &mut self,
    ) -> Result<(ContractDeployment, Option<VerificationOutcome>)> {
        let price_feed = resolve_price_feed(&self.network, &self.deployments)?;
        tracing::info!(
            network = %self.network.name,
            price_feed = %price_feed,
            "Price feed resolved"
        );

        let args = vec![DynSolValue::Address(price_feed)];
        let artifact = self.artifacts.fund_me.clone();
        let fund_me = self.deploy_contract(&artifact, args.clone()).await?;

        if self.network.is_local {
            return Ok((fund_me, None));
        }
        let Some(verifier) = &self.verifier else {
            tracing::debug!("No explorer API key configured, skipping verification");
            return Ok((fund_me, None));
        };

        let outcome = verify_deployment(
            verifier,
            self.network.chain_id,
            &artifact,
            fund_me.address,
            args,
        )
        .await;
        Ok((fund_me, Some(outcome)))
    }

    /// Deploy `artifact` with `args`, or reuse a live deployment with the same code
    /// sent from the same account.
    ///
    /// A record is persisted only once the transaction is mined with the configured
    /// number of confirmations.
    async fn deploy_contract(
        &mut self,
        artifact: &ContractArtifact,
        args: Vec<DynSolValue>,
    ) -> Result<ContractDeployment> {
        let name = artifact.contract_name.clone();
        let encoded_args = artifact.encode_constructor_args(&args)?;
        let code = artifact.creation_code(&encoded_args);
        let code_fingerprint = fingerprint(&code);
        let display_args: Vec<String> = args.iter().map(format_value).collect();

        let deployer = self
            .chain
            .deployer()
            .await
            .map_err(|err| DeployError::deployment(&name, format!("{err:#}")))?;

        if let Some(previous) = self.previous.get(&name) {
            if previous.fingerprint == code_fingerprint && previous.deployer == deployer {
                tracing::info!(
                    contract = %name,
                    address = %previous.address,
                    "Reusing {} at {}",
                    name,
                    previous.address
                );
                let deployment = ContractDeployment {
                    name: name.clone(),
                    address: previous.address,
                    transaction_hash: previous.transaction_hash,
                    args: display_args,
                    status: DeploymentStatus::Reused,
                };
                self.deployments.insert(previous.clone());
                return Ok(deployment);
            }
            tracing::debug!(
                contract = %name,
                recorded_deployer = %previous.deployer,
                deployer = %deployer,
                "Recorded deployment differs in code or sender, redeploying"
            );
        }

        tracing::info!(contract = %name, from = %deployer, args = ?display_args, "Deploying {}...", name);

        let tx_hash = self
            .chain
            .send_create(code)
            .await
            .map_err(|err| DeployError::deployment(&name, format!("{err:#}")))?;
        tracing::info!(
            contract = %name,
            tx_hash = %tx_hash,
            confirmations = self.network.block_confirmations,
            "Deployment transaction sent"
        );

        let receipt = self
            .chain
            .wait_for_receipt(tx_hash, self.network.block_confirmations)
            .await
            .map_err(|err| DeployError::deployment(&name, format!("{err:#}")))?;
        if !receipt.success {
            return Err(DeployError::deployment(
                &name,
                format!("transaction {tx_hash} reverted"),
            )
            .into());
        }
        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::deployment(&name, format!("receipt of {tx_hash} has no contract address"))
        })?;

        let record = DeploymentRecord {
            contract_name: name.clone(),
            address,
            deployer,
            transaction_hash: tx_hash,
            abi: artifact.abi.clone(),
            args: display_args.clone(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            fingerprint: code_fingerprint,
            deployed_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(&record)?;
        self.deployments.insert(record);

        tracing::info!(
            contract = %name,
            address = %address,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "Deployed {} at {}",
            name,
            address
        );

        Ok(ContractDeployment {
            name,
            address,
            transaction_hash: tx_hash,
            args: display_args,
            status: DeploymentStatus::Deployed,
        })
    }
}

/// Submit a verification and fold every error into [`VerificationOutcome::Failed`].
async fn verify_deployment<V: Verifier>(
    verifier: &V,
    chain_id: u64,
    artifact: &ContractArtifact,
    address: Address,
    args: Vec<DynSolValue>,
) -> VerificationOutcome {
    let request = match VerificationRequest::new(artifact, address, args) {
        Ok(request) => request,
        Err(err) => {
            let outcome = VerificationOutcome::Failed(format!("{err:#}"));
            tracing::warn!(address = %address, outcome = %outcome, "Verification skipped");
            return outcome;
        }
    };
    tracing::info!(
        contract = %request.contract_name,
        address = %address,
        args = ?request.display_args(),
        "Verifying contract..."
    );

    let outcome = verifier
        .verify(chain_id, &request)
        .await
        .unwrap_or_else(|err| VerificationOutcome::Failed(err.to_string()));

    if outcome.is_failure() {
        tracing::warn!(address = %address, outcome = %outcome, "Verification failed");
    } else {
        tracing::info!(address = %address, outcome = %outcome, "Verification done");
    }
    outcome
}
