//! fundme-deploy - Deployment library for the FundMe contract.
//!
//! This crate deploys FundMe and its mock price feed to a configured network,
//! records the deployments and verifies the sources on public networks.

pub mod artifact;
pub mod chain;
pub mod config;
pub mod deployments;
pub mod inspect;
pub mod network;
pub mod rpc;
pub mod steps;
pub mod verify;

mod builder;
pub use builder::{DefaultDeployer, DeployerBuilder};

mod deployer;
pub use deployer::{ContractDeployment, Deployer, DeploymentStatus, RunReport};

mod error;
pub use error::DeployError;

mod resolver;
pub use resolver::resolve_price_feed;

pub use artifact::{ContractArtifact, ContractArtifacts, FUND_ME, MOCK_AGGREGATOR};
pub use chain::{ChainClient, JsonRpcChain, TransactionReceipt, TxSender};
pub use config::{CONFIG_FILENAME, MockConfig, Settings};
pub use deployments::{DeploymentRecord, DeploymentSet, DeploymentStore};
pub use inspect::{Inspection, inspect, read_price_feed};
pub use network::NetworkProfile;
pub use steps::{StepId, Tag};
pub use verify::{EtherscanVerifier, VerificationOutcome, VerificationRequest, Verifier};
