//! Compiled contract artifacts.
//!
//! Artifacts follow the Hardhat layout:
//!
//! ```text
//! artifacts/contracts/FundMe.sol/FundMe.json      abi + creation bytecode
//! artifacts/contracts/FundMe.sol/FundMe.dbg.json  { "buildInfo": "../../build-info/<id>.json" }
//! artifacts/build-info/<id>.json                  solc version + standard JSON input
//! ```
//!
//! The build info is only read when a contract is verified.

use std::path::{Path, PathBuf};

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ArtifactPaths;

/// Name of the mock ETH/USD aggregator contract.
pub const MOCK_AGGREGATOR: &str = "MockV3Aggregator";

/// Name of the funding contract.
pub const FUND_ME: &str = "FundMe";

/// A compiled contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    /// Source path relative to the project root, e.g. `contracts/FundMe.sol`.
    pub source_name: String,
    pub abi: JsonAbi,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    #[serde(skip)]
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

/// Compiler run that produced an artifact.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Long version, e.g. `0.8.17+commit.8df45f5f`.
    pub solc_long_version: String,
    /// Standard JSON compiler input.
    pub input: Value,
}

impl ContractArtifact {
    /// Load an artifact from its JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let mut artifact: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if artifact.bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no bytecode, is {} abstract or an interface?",
                path.display(),
                artifact.contract_name
            );
        }

        artifact.path = path.to_path_buf();
        tracing::trace!(
            contract = %artifact.contract_name,
            path = %path.display(),
            bytecode_len = artifact.bytecode.len(),
            "Artifact loaded"
        );
        Ok(artifact)
    }

    /// `<source>:<name>`, the form block explorers expect.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// ABI-encode constructor arguments against this contract's constructor.
    pub fn encode_constructor_args(&self, args: &[DynSolValue]) -> Result<Bytes> {
        match self.abi.constructor() {
            Some(constructor) => constructor
                .abi_encode_input(args)
                .map(Bytes::from)
                .with_context(|| {
                    format!(
                        "Invalid constructor arguments for {}",
                        self.contract_name
                    )
                }),
            None if args.is_empty() => Ok(Bytes::new()),
            None => anyhow::bail!(
                "{} has no constructor but {} arguments were given",
                self.contract_name,
                args.len()
            ),
        }
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    pub fn creation_code(&self, encoded_args: &Bytes) -> Bytes {
        let mut code = Vec::with_capacity(self.bytecode.len() + encoded_args.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(encoded_args);
        code.into()
    }

    /// Read the build info referenced by the sibling `.dbg.json` file.
    pub fn build_info(&self) -> Result<BuildInfo> {
        let dbg_path = self.path.with_extension("dbg.json");
        let content = std::fs::read_to_string(&dbg_path)
            .with_context(|| format!("Failed to read debug file {}", dbg_path.display()))?;
        let dbg: DebugFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse debug file {}", dbg_path.display()))?;

        let build_info_path = dbg_path
            .parent()
            .context("Debug file path must have a parent directory")?
            .join(dbg.build_info);
        let content = std::fs::read_to_string(&build_info_path).with_context(|| {
            format!("Failed to read build info {}", build_info_path.display())
        })?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse build info {}", build_info_path.display()))
    }
}

/// The two artifacts a run deploys.
#[derive(Debug, Clone)]
pub struct ContractArtifacts {
    pub mock_aggregator: ContractArtifact,
    pub fund_me: ContractArtifact,
}

impl ContractArtifacts {
    /// Load both artifacts, resolving relative paths against `root`.
    pub fn load(root: &Path, paths: &ArtifactPaths) -> Result<Self> {
        Ok(Self {
            mock_aggregator: ContractArtifact::load(&root.join(&paths.mock_aggregator))?,
            fund_me: ContractArtifact::load(&root.join(&paths.fund_me))?,
        })
    }
}

/// Human-readable rendering of a constructor argument, as stored in deployment records.
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(address) => address.to_string(),
        DynSolValue::Bool(flag) => flag.to_string(),
        DynSolValue::Int(int, _) => int.to_string(),
        DynSolValue::Uint(uint, _) => uint.to_string(),
        DynSolValue::String(string) => string.clone(),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        other => format!("{other:?}"),
    }
}
