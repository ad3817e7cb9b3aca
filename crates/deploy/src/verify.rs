//! Source verification on an Etherscan-compatible block explorer.
//!
//! Verification is a two step exchange: the standard JSON input is submitted with
//! `verifysourcecode`, which returns a GUID, then `checkverifystatus` is polled until
//! the explorer leaves the pending state.

use std::{fmt, future::Future, time::Duration};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes},
};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{
    artifact::{ContractArtifact, format_value},
    config::ExplorerConfig,
    error::DeployError,
};

/// Everything the explorer needs to match a deployed contract against its sources.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub address: Address,
    /// `<source>:<name>`.
    pub contract_name: String,
    /// Long compiler version, e.g. `0.8.8+commit.dddeac2f`.
    pub compiler_version: String,
    /// Standard JSON compiler input.
    pub source: Value,
    pub constructor_args: Vec<DynSolValue>,
    /// ABI encoding of `constructor_args`.
    pub encoded_args: Bytes,
}

impl VerificationRequest {
    /// Build the request of `artifact` deployed at `address`.
    pub fn new(
        artifact: &ContractArtifact,
        address: Address,
        constructor_args: Vec<DynSolValue>,
    ) -> anyhow::Result<Self> {
        let build_info = artifact.build_info()?;
        let encoded_args = artifact.encode_constructor_args(&constructor_args)?;
        Ok(Self {
            address,
            contract_name: artifact.fully_qualified_name(),
            compiler_version: build_info.solc_long_version,
            source: build_info.input,
            constructor_args,
            encoded_args,
        })
    }

    /// Constructor arguments rendered for logs.
    pub fn display_args(&self) -> Vec<String> {
        self.constructor_args.iter().map(format_value).collect()
    }
}

/// Result of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
    Failed(String),
}

impl VerificationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => f.write_str("verified"),
            Self::AlreadyVerified => f.write_str("already verified"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A block explorer able to verify contract sources.
pub trait Verifier {
    fn verify(
        &self,
        chain_id: u64,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationOutcome, DeployError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

impl ExplorerResponse {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }

    fn result_text(&self) -> String {
        match &self.result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Retryable states of the explorer.
#[derive(Debug, thiserror::Error)]
enum Transient {
    #[error("explorer has not indexed the contract yet")]
    NotIndexed,
    #[error("verification still pending")]
    Pending,
}

/// Interpret a `checkverifystatus` result. `None` means still pending.
fn parse_status(response: &ExplorerResponse) -> Option<VerificationOutcome> {
    let result = response.result_text();
    let lowered = result.to_lowercase();

    if lowered.contains("pending") {
        None
    } else if lowered.contains("already verified") {
        Some(VerificationOutcome::AlreadyVerified)
    } else if response.is_ok() || lowered.starts_with("pass") {
        Some(VerificationOutcome::Verified)
    } else {
        Some(VerificationOutcome::Failed(result))
    }
}

/// [`Verifier`] talking to the Etherscan v2 API.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
    poll_interval: Duration,
    max_status_checks: usize,
}

impl EtherscanVerifier {
    pub fn new(api_url: Url, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let explorer = ExplorerConfig::default();
        Ok(Self {
            client: crate::rpc::create_client()?,
            api_url,
            api_key: api_key.into(),
            poll_interval: explorer.poll_interval(),
            max_status_checks: explorer.max_status_checks,
        })
    }

    /// Build a verifier from the explorer settings, `None` without a credential.
    pub fn from_config(config: &ExplorerConfig) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.credential() else {
            return Ok(None);
        };
        Ok(Some(
            Self::new(config.api_url.clone(), api_key)?
                .poll_interval(config.poll_interval())
                .max_status_checks(config.max_status_checks),
        ))
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_status_checks(mut self, checks: usize) -> Self {
        self.max_status_checks = checks;
        self
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .with_max_times(self.max_status_checks)
    }

    async fn post(&self, chain_id: u64, form: &[(&str, String)]) -> anyhow::Result<ExplorerResponse> {
        self.client
            .post(self.api_url.clone())
            .query(&[("chainid", chain_id.to_string())])
            .form(form)
            .send()
            .await
            .context("Failed to reach the block explorer")?
            .json()
            .await
            .context("Failed to parse the block explorer response")
    }

    async fn check_status(&self, chain_id: u64, guid: &str) -> anyhow::Result<ExplorerResponse> {
        self.client
            .get(self.api_url.clone())
            .query(&[
                ("chainid", chain_id.to_string()),
                ("module", "contract".to_string()),
                ("action", "checkverifystatus".to_string()),
                ("guid", guid.to_string()),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await
            .context("Failed to reach the block explorer")?
            .json()
            .await
            .context("Failed to parse the block explorer status response")
    }

    /// Submit the sources. `Ok(Err(outcome))` short-circuits polling.
    async fn submit(
        &self,
        chain_id: u64,
        request: &VerificationRequest,
    ) -> anyhow::Result<Result<String, VerificationOutcome>> {
        let source = serde_json::to_string(&request.source)
            .context("Failed to serialize the compiler input")?;
        let form = [
            ("apikey", self.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", request.address.to_string()),
            ("sourceCode", source),
            ("codeformat", "solidity-standard-json-input".to_string()),
            ("contractname", request.contract_name.clone()),
            ("compilerversion", format!("v{}", request.compiler_version)),
            // Sic, the API misspells it.
            ("constructorArguements", hex::encode(&request.encoded_args)),
        ];

        let response = (|| async {
            let response = self.post(chain_id, &form).await?;
            if !response.is_ok() && response.result_text().contains("Unable to locate ContractCode") {
                return Err(anyhow::Error::from(Transient::NotIndexed));
            }
            Ok::<_, anyhow::Error>(response)
        })
        .retry(self.backoff())
        .when(|err: &anyhow::Error| err.is::<Transient>())
        .notify(|_, delay: Duration| {
            tracing::debug!(?delay, "Contract not indexed by the explorer yet, retrying...");
        })
        .await?;

        if response.is_ok() {
            return Ok(Ok(response.result_text()));
        }

        let result = response.result_text();
        if result.to_lowercase().contains("already verified") {
            return Ok(Err(VerificationOutcome::AlreadyVerified));
        }
        Ok(Err(VerificationOutcome::Failed(format!(
            "{} ({})",
            result, response.message
        ))))
    }
}

impl Verifier for EtherscanVerifier {
    async fn verify(
        &self,
        chain_id: u64,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, DeployError> {
        let guid = match self
            .submit(chain_id, request)
            .await
            .map_err(|err| DeployError::Verification(format!("{err:#}")))?
        {
            Ok(guid) => guid,
            Err(outcome) => return Ok(outcome),
        };

        tracing::info!(guid = %guid, address = %request.address, "Verification submitted");

        (|| async {
            let response = self.check_status(chain_id, &guid).await?;
            parse_status(&response).ok_or_else(|| anyhow::Error::from(Transient::Pending))
        })
        .retry(self.backoff())
        .when(|err: &anyhow::Error| err.is::<Transient>())
        .notify(|_, delay: Duration| {
            tracing::debug!(?delay, "Verification pending...");
        })
        .await
        .map_err(|err| DeployError::Verification(format!("{err:#}")))
    }
}
