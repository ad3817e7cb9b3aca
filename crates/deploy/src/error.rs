//! Error taxonomy for a deployment run.

/// Failures a deployment run can surface.
///
/// Every variant except [`DeployError::Verification`] aborts the run. Verification
/// errors are caught where the explorer is called and turned into a
/// [`crate::VerificationOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    /// No price feed is registered for a non-local network.
    #[error("no ETH/USD price feed registered for network '{network}' (chain id {chain_id})")]
    UnknownNetwork { network: String, chain_id: u64 },

    /// A local network asked for the price feed before the mock aggregator was deployed.
    #[error(
        "network '{network}' is local but no MockV3Aggregator is deployed in this run, \
         run the `mocks` step first"
    )]
    MissingMock { network: String },

    /// The deployment transaction reverted, never mined or could not be sent.
    #[error("deployment of {contract} failed: {reason}")]
    DeploymentTx { contract: String, reason: String },

    /// The block explorer rejected or failed the verification submission.
    #[error("verification failed: {0}")]
    Verification(String),
}

impl DeployError {
    pub(crate) fn deployment(contract: &str, reason: impl std::fmt::Display) -> Self {
        Self::DeploymentTx {
            contract: contract.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            DeployError::UnknownNetwork {
                network: "polygon".to_string(),
                chain_id: 137
            }
            .to_string(),
            "no ETH/USD price feed registered for network 'polygon' (chain id 137)"
        );
        assert_eq!(
            DeployError::deployment("FundMe", "reverted").to_string(),
            "deployment of FundMe failed: reverted"
        );
    }

    #[test]
    fn test_error_converts_into_anyhow_and_back() {
        let err: anyhow::Error = DeployError::MissingMock {
            network: "hardhat".to_string(),
        }
        .into();

        assert_eq!(
            err.downcast_ref::<DeployError>(),
            Some(&DeployError::MissingMock {
                network: "hardhat".to_string()
            })
        );
    }
}
