//! Chain access.
//!
//! [`ChainClient`] is the narrow surface the deployer needs from a node: send a
//! contract creation, wait for it to be final, and read code or call views.
//! [`JsonRpcChain`] implements it over plain JSON-RPC.

use std::{future::Future, time::Duration};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::{
    network::NetworkProfile,
    rpc::{self, deserialize_u64_from_hex, json_rpc_call, parse_hex_u64, parse_hex_u128},
};

/// Gas estimate headroom, in percent.
const GAS_ESTIMATE_MARGIN_PERCENT: u64 = 20;

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// Set for contract creations.
    pub contract_address: Option<Address>,
    pub block_number: u64,
    pub gas_used: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
}

/// Node operations the deployer relies on.
pub trait ChainClient {
    /// The chain id reported by the node.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// The account deployments are sent from.
    fn deployer(&self) -> impl Future<Output = Result<Address>> + Send;

    /// Broadcast a contract creation carrying `code` (bytecode + constructor arguments).
    fn send_create(&self, code: Bytes) -> impl Future<Output = Result<B256>> + Send;

    /// Wait until `tx_hash` is mined and `confirmations` blocks deep (1 = mined).
    fn wait_for_receipt(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send;

    /// Runtime code at `address`, empty when nothing is deployed there.
    fn get_code(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;

    /// `eth_call` against the latest block.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes>> + Send;
}

/// How transactions are authorised.
#[derive(Debug, Clone)]
pub enum TxSender {
    /// The node signs with its first unlocked account (development nodes).
    Unlocked,
    /// Transactions are signed locally and sent raw.
    Local(PrivateKeySigner),
}

impl TxSender {
    /// Build the sender for a network: local signer if it carries a key.
    pub fn for_network(network: &NetworkProfile) -> Result<Self> {
        match &network.private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .expose()
                    .parse()
                    .with_context(|| format!("Invalid private key for network '{}'", network.name))?;
                Ok(Self::Local(signer))
            }
            None => Ok(Self::Unlocked),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    gas_used: u64,
    /// Absent on pre-Byzantium chains.
    status: Option<String>,
}

impl TryFrom<RpcReceipt> for TransactionReceipt {
    type Error = anyhow::Error;

    fn try_from(receipt: RpcReceipt) -> Result<Self> {
        let success = match receipt.status.as_deref() {
            Some(status) => parse_hex_u64(status)? == 1,
            None => true,
        };
        Ok(Self {
            transaction_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            success,
        })
    }
}

/// [`ChainClient`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct JsonRpcChain {
    client: reqwest::Client,
    url: String,
    sender: TxSender,
    poll_interval: Duration,
    receipt_timeout: Option<Duration>,
}

impl JsonRpcChain {
    pub fn new(url: impl Into<String>, sender: TxSender) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client()?,
            url: url.into(),
            sender,
            poll_interval: Duration::from_secs(1),
            receipt_timeout: None,
        })
    }

    /// Set the delay between two receipt or block number polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stop waiting for a receipt, then for its confirmations, after `timeout`.
    /// Waits forever when `None`.
    pub fn receipt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    async fn call_rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn block_number(&self) -> Result<u64> {
        let number: String = self.call_rpc("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&number)
    }

    async fn send_unlocked(&self, from: Address, code: Bytes) -> Result<B256> {
        self.call_rpc(
            "eth_sendTransaction",
            vec![json!({
                "from": from,
                "data": code,
            })],
        )
        .await
        .context("Failed to send deployment transaction")
    }

    async fn send_signed(&self, signer: &PrivateKeySigner, code: Bytes) -> Result<B256> {
        let from = signer.address();
        let chain_id = self.chain_id().await?;

        let nonce: String = self
            .call_rpc("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await
            .context("Failed to fetch deployer nonce")?;
        let gas_price: String = self
            .call_rpc("eth_gasPrice", vec![])
            .await
            .context("Failed to fetch gas price")?;
        let gas_estimate: String = self
            .call_rpc(
                "eth_estimateGas",
                vec![json!({
                    "from": from,
                    "data": code,
                })],
            )
            .await
            .context("Failed to estimate deployment gas")?;

        let gas_estimate = parse_hex_u64(&gas_estimate)?;
        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce: parse_hex_u64(&nonce)?,
            gas_price: parse_hex_u128(&gas_price)?,
            gas_limit: gas_estimate + gas_estimate * GAS_ESTIMATE_MARGIN_PERCENT / 100,
            to: TxKind::Create,
            value: U256::ZERO,
            input: code,
        };

        tracing::debug!(
            from = %from,
            nonce = tx.nonce,
            gas_limit = tx.gas_limit,
            gas_price = tx.gas_price,
            "Signing deployment transaction"
        );

        let signature = signer
            .sign_hash_sync(&tx.signature_hash())
            .context("Failed to sign deployment transaction")?;
        let raw = TxEnvelope::from(tx.into_signed(signature)).encoded_2718();

        self.call_rpc(
            "eth_sendRawTransaction",
            vec![json!(format!("0x{}", hex::encode(raw)))],
        )
        .await
        .context("Failed to send deployment transaction")
    }
}

impl ChainClient for JsonRpcChain {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id: String = self
            .call_rpc("eth_chainId", vec![])
            .await
            .context("Failed to fetch chain id")?;
        parse_hex_u64(&chain_id)
    }

    async fn deployer(&self) -> Result<Address> {
        match &self.sender {
            TxSender::Local(signer) => Ok(signer.address()),
            TxSender::Unlocked => {
                let accounts: Vec<Address> = self
                    .call_rpc("eth_accounts", vec![])
                    .await
                    .context("Failed to list node accounts")?;
                accounts
                    .first()
                    .copied()
                    .context("Node exposes no unlocked account and no private key is configured")
            }
        }
    }

    async fn send_create(&self, code: Bytes) -> Result<B256> {
        match &self.sender {
            TxSender::Unlocked => {
                let from = self.deployer().await?;
                self.send_unlocked(from, code).await
            }
            TxSender::Local(signer) => self.send_signed(signer, code).await,
        }
    }

    async fn wait_for_receipt(&self, tx_hash: B256, confirmations: u64) -> Result<TransactionReceipt> {
        let receipt = rpc::poll_until(
            &format!("receipt of {tx_hash}"),
            self.poll_interval,
            self.receipt_timeout,
            || async {
                let receipt: Option<RpcReceipt> = self
                    .call_rpc("eth_getTransactionReceipt", vec![json!(tx_hash)])
                    .await?;
                receipt.map(TransactionReceipt::try_from).transpose()
            },
        )
        .await?;

        if confirmations > 1 {
            let target = receipt.block_number + confirmations - 1;
            tracing::info!(
                tx_hash = %tx_hash,
                mined_in = receipt.block_number,
                confirmations,
                "Waiting for confirmations..."
            );
            rpc::poll_until(
                &format!("{confirmations} confirmations of {tx_hash}"),
                self.poll_interval,
                self.receipt_timeout,
                || async {
                    let head = self.block_number().await?;
                    Ok::<_, anyhow::Error>((head >= target).then_some(()))
                },
            )
            .await?;
        }

        Ok(receipt)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.call_rpc("eth_getCode", vec![json!(address), json!("latest")])
            .await
            .with_context(|| format!("Failed to fetch code at {address}"))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.call_rpc(
            "eth_call",
            vec![
                json!({
                    "to": to,
                    "data": data,
                }),
                json!("latest"),
            ],
        )
        .await
        .with_context(|| format!("eth_call to {to} failed"))
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;
    use crate::network::{NetworkConfig, PrivateKey};

    #[test]
    fn test_receipt_conversion() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0x4f8c0e64a7b2c5e8b5a1d6f3e9c2b7a4d1e8f5c2b9a6d3e0f7c4b1a8e5d2c9f6",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "blockNumber": "0x1",
            "gasUsed": "0x5208",
            "status": "0x1",
            "logs": []
        }))
        .unwrap();

        let receipt = TransactionReceipt::try_from(receipt).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.gas_used, 21000);
        assert_eq!(
            receipt.contract_address,
            Some(address!("5FbDB2315678afecb367f032d93F642f64180aa3"))
        );
    }

    #[test]
    fn test_reverted_receipt() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0x4f8c0e64a7b2c5e8b5a1d6f3e9c2b7a4d1e8f5c2b9a6d3e0f7c4b1a8e5d2c9f6",
            "contractAddress": null,
            "blockNumber": "0x2",
            "gasUsed": "0x0",
            "status": "0x0"
        }))
        .unwrap();

        let receipt = TransactionReceipt::try_from(receipt).unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.contract_address, None);
    }

    #[test]
    fn test_sender_for_network() {
        let mut config = NetworkConfig::development();
        let profile = NetworkProfile::from_config("localhost", &config).unwrap();
        assert!(matches!(TxSender::for_network(&profile).unwrap(), TxSender::Unlocked));

        // First default account of anvil/hardhat.
        config.private_key = Some(PrivateKey::new(
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ));
        let profile = NetworkProfile::from_config("localhost", &config).unwrap();
        match TxSender::for_network(&profile).unwrap() {
            TxSender::Local(signer) => assert_eq!(
                signer.address(),
                address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
            ),
            TxSender::Unlocked => panic!("expected a local signer"),
        }
    }

    #[test]
    fn test_invalid_private_key() {
        let config = NetworkConfig {
            private_key: Some(PrivateKey::new("not-a-key")),
            ..NetworkConfig::development()
        };
        let profile = NetworkProfile::from_config("localhost", &config).unwrap();
        let err = TxSender::for_network(&profile).unwrap_err();
        assert!(err.to_string().contains("Invalid private key"));
    }
}
