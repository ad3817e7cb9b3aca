//! Deployment records.
//!
//! A [`DeploymentRecord`] is written to `deployments/<network>/<Contract>.json`
//! after every successful deployment, next to a `.chainId` file that pins the
//! directory to one chain. Records are reloaded by later runs and by `inspect`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes},
};
use anyhow::{Context, Result};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Name of the file pinning a deployments directory to a chain id.
pub const CHAIN_ID_FILENAME: &str = ".chainId";

/// SHA-256 of the creation code (bytecode + encoded constructor arguments).
///
/// Two deployments with the same fingerprint are interchangeable: same code, same
/// arguments.
pub fn fingerprint(creation_code: &Bytes) -> String {
    let mut hasher = Sha256::new();
    hasher.update(creation_code);
    hex::encode(hasher.finalize())
}

/// A deployed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_name: String,
    pub address: Address,
    /// Account the contract was deployed from. Zero for records written before it
    /// was tracked, which never match a sender.
    #[serde(default)]
    pub deployer: Address,
    pub transaction_hash: B256,
    pub abi: JsonAbi,
    /// Constructor arguments, rendered as strings.
    pub args: Vec<String>,
    pub block_number: u64,
    pub gas_used: u64,
    pub fingerprint: String,
    /// Unix timestamp of the deployment.
    pub deployed_at: i64,
}

/// Deployments known to the current run, keyed by contract name.
///
/// Append-only: a contract is recorded once per run and never removed.
#[derive(Debug, Clone, Default, Deref)]
pub struct DeploymentSet(BTreeMap<String, DeploymentRecord>);

impl DeploymentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployment. A contract name already present is left untouched.
    ///
    /// Returns `false` if the name was already recorded.
    pub fn insert(&mut self, record: DeploymentRecord) -> bool {
        if self.0.contains_key(&record.contract_name) {
            return false;
        }
        self.0.insert(record.contract_name.clone(), record);
        true
    }

    /// The address of `contract_name`, if it was deployed in this run.
    pub fn address_of(&self, contract_name: &str) -> Option<Address> {
        self.0.get(contract_name).map(|record| record.address)
    }
}

/// Persisted records of one network.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    dir: PathBuf,
}

impl DeploymentStore {
    /// The store of `network` under `root` (usually `./deployments`).
    pub fn new(root: &Path, network: &str) -> Self {
        Self {
            dir: root.join(network),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, contract_name: &str) -> PathBuf {
        self.dir.join(format!("{contract_name}.json"))
    }

    /// Create the directory and pin it to `chain_id`.
    ///
    /// Fails if the directory already holds records of another chain.
    pub fn ensure_chain_id(&self, chain_id: u64) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create deployments directory {}", self.dir.display())
        })?;

        let path = self.dir.join(CHAIN_ID_FILENAME);
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let recorded: u64 = content
                .trim()
                .parse()
                .with_context(|| format!("Malformed chain id in {}", path.display()))?;
            if recorded != chain_id {
                anyhow::bail!(
                    "Deployments in {} belong to chain {} but the node reports chain {}",
                    self.dir.display(),
                    recorded,
                    chain_id
                );
            }
            return Ok(());
        }

        std::fs::write(&path, chain_id.to_string())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), chain_id, "Deployments directory pinned");
        Ok(())
    }

    /// Write a record, replacing any previous record of the same contract.
    pub fn save(&self, record: &DeploymentRecord) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create deployments directory {}", self.dir.display())
        })?;

        let path = self.record_path(&record.contract_name);
        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialize deployment record")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write deployment record to {}", path.display()))?;

        tracing::debug!(path = %path.display(), contract = %record.contract_name, "Deployment record saved");
        Ok(path)
    }

    /// Load the record of `contract_name`, `None` if it was never deployed.
    pub fn load(&self, contract_name: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(contract_name);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read deployment record {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))?;
        Ok(Some(record))
    }

    /// Load every record of the network, sorted by contract name.
    pub fn load_all(&self) -> Result<Vec<DeploymentRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            if let Some(record) = self.load(&name)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;
    use tempdir::TempDir;

    use super::*;

    fn record(name: &str, address: Address) -> DeploymentRecord {
        DeploymentRecord {
            contract_name: name.to_string(),
            address,
            deployer: address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            transaction_hash: B256::repeat_byte(0xab),
            abi: JsonAbi::default(),
            args: vec!["8".to_string(), "200000000000".to_string()],
            block_number: 1,
            gas_used: 21_000,
            fingerprint: fingerprint(&Bytes::from_static(&[0x60, 0x80])),
            deployed_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_fingerprint_determinism() {
        let code = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]);
        let hash1 = fingerprint(&code);
        let hash2 = fingerprint(&code);

        assert_eq!(hash1, hash2, "Fingerprint should be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert_ne!(
            hash1,
            fingerprint(&Bytes::from_static(&[0x60, 0x80, 0x60, 0x41])),
            "Fingerprint should change with constructor arguments"
        );
    }

    #[test]
    fn test_set_is_append_only() {
        let mut set = DeploymentSet::new();
        let first = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
        let second = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");

        assert!(set.insert(record("MockV3Aggregator", first)));
        assert!(!set.insert(record("MockV3Aggregator", second)));
        assert_eq!(set.address_of("MockV3Aggregator"), Some(first));
        assert_eq!(set.address_of("FundMe"), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new("fundme-test").expect("Failed to create temp dir");
        let store = DeploymentStore::new(temp_dir.path(), "localhost");
        let original = record("FundMe", address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512"));

        let path = store.save(&original).expect("Failed to save record");
        assert_eq!(path, temp_dir.path().join("localhost/FundMe.json"));

        let loaded = store.load("FundMe").unwrap().expect("Record should exist");
        assert_eq!(original, loaded, "Loaded record should match original");
        assert!(store.load("MockV3Aggregator").unwrap().is_none());
    }

    #[test]
    fn test_load_all_sorted() {
        let temp_dir = TempDir::new("fundme-test").expect("Failed to create temp dir");
        let store = DeploymentStore::new(temp_dir.path(), "localhost");
        assert!(store.load_all().unwrap().is_empty());

        store.ensure_chain_id(31337).unwrap();
        store.save(&record("MockV3Aggregator", Address::repeat_byte(1))).unwrap();
        store.save(&record("FundMe", Address::repeat_byte(2))).unwrap();

        let names: Vec<_> = store
            .load_all()
            .unwrap()
            .into_iter()
            .map(|record| record.contract_name)
            .collect();
        assert_eq!(names, vec!["FundMe", "MockV3Aggregator"]);
    }

    #[test]
    fn test_load_corrupted_record() {
        let temp_dir = TempDir::new("fundme-test").expect("Failed to create temp dir");
        let store = DeploymentStore::new(temp_dir.path(), "localhost");
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("FundMe.json"), "{ invalid json }").unwrap();

        assert!(store.load("FundMe").is_err(), "Loading corrupted file should return error");
    }

    #[test]
    fn test_record_without_deployer_loads() {
        let temp_dir = TempDir::new("fundme-test").expect("Failed to create temp dir");
        let store = DeploymentStore::new(temp_dir.path(), "goerli");
        let mut json = serde_json::to_value(record("FundMe", Address::repeat_byte(2))).unwrap();
        json.as_object_mut().unwrap().remove("deployer");
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("FundMe.json"), json.to_string()).unwrap();

        let loaded = store.load("FundMe").unwrap().expect("Record should exist");
        assert_eq!(loaded.deployer, Address::ZERO);
    }

    #[test]
    fn test_chain_id_pinning() {
        let temp_dir = TempDir::new("fundme-test").expect("Failed to create temp dir");
        let store = DeploymentStore::new(temp_dir.path(), "goerli");

        store.ensure_chain_id(5).unwrap();
        assert_eq!(
            std::fs::read_to_string(store.dir().join(CHAIN_ID_FILENAME)).unwrap(),
            "5"
        );
        store.ensure_chain_id(5).unwrap();

        let err = store.ensure_chain_id(11155111).unwrap_err();
        assert!(err.to_string().contains("belong to chain 5"));
    }
}
