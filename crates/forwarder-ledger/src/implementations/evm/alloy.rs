//! Ledger implementation for EVM networks over JSON-RPC.
//!
//! Uses an Alloy provider with a wallet built from the relayer key. The
//! provider signs transactions itself, so `submit` only accepts transactions
//! from, and signed by, that wallet; the signature is not forwarded.

use std::time::Duration;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, Signature};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use forwarder_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, Transaction,
	TransactionHash, TransactionReceipt, ValidationError,
};

use crate::{LedgerError, LedgerFactory, LedgerInterface, LedgerRegistry};

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 600;

/// Alloy-based EVM ledger.
pub struct AlloyLedger {
	provider: DynProvider,
	wallet_address: Address,
	chain_id: u64,
	poll_interval: Duration,
	confirmation_timeout: Duration,
}

impl AlloyLedger {
	/// Connects to `rpc_url`, signing with `signer` for `chain_id`.
	pub fn new(
		rpc_url: &str,
		chain_id: u64,
		signer: PrivateKeySigner,
		poll_interval: Duration,
		confirmation_timeout: Duration,
	) -> Result<Self, LedgerError> {
		let url: reqwest::Url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Configuration(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

		let wallet_address = signer.address();
		let wallet = EthereumWallet::from(signer.with_chain_id(Some(chain_id)));
		let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);
		provider.client().set_poll_interval(poll_interval);

		Ok(Self {
			provider: provider.erased(),
			wallet_address,
			chain_id,
			poll_interval,
			confirmation_timeout,
		})
	}

	/// Refuses transactions not from, or not signed by, the provider's wallet.
	fn check_sender(&self, tx: &Transaction, signature: &Signature) -> Result<(), LedgerError> {
		if let Some(from) = tx.from {
			if from != self.wallet_address {
				return Err(LedgerError::Rejected(format!(
					"transaction from {} but this ledger signs as {}",
					from, self.wallet_address
				)));
			}
		}
		let signer = signature
			.recover_address_from_prehash(&tx.signing_hash())
			.map_err(|e| LedgerError::Rejected(format!("invalid transaction signature: {}", e)))?;
		if signer != self.wallet_address {
			return Err(LedgerError::Rejected(format!(
				"transaction signed by {} but this ledger signs as {}",
				signer, self.wallet_address
			)));
		}
		Ok(())
	}

	fn request(tx: &Transaction) -> TransactionRequest {
		let mut request = TransactionRequest::default()
			.with_chain_id(tx.chain_id)
			.with_value(tx.value);
		request = match tx.to {
			Some(to) => request.with_to(to).with_input(tx.data.clone()),
			None => request.with_deploy_code(tx.data.clone()),
		};
		if let Some(from) = tx.from {
			request = request.with_from(from);
		}
		if let Some(nonce) = tx.nonce {
			request = request.with_nonce(nonce);
		}
		if let Some(gas_limit) = tx.gas_limit {
			request = request.with_gas_limit(gas_limit);
		}
		request
	}

	fn convert_receipt(receipt: &alloy_rpc_types::TransactionReceipt) -> TransactionReceipt {
		TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash),
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
			logs: receipt
				.inner
				.logs()
				.iter()
				.map(|log| log.inner.clone())
				.collect(),
			contract_address: receipt.contract_address,
			revert_data: None,
		}
	}
}

/// Configuration schema for the Alloy ledger.
pub struct AlloyLedgerSchema;

impl AlloyLedgerSchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		Self.validate(config)
	}
}

impl ConfigSchema for AlloyLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("rpc_url must be an http(s) URL".to_string()),
					}
				}),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(100),
						max: Some(60_000),
					},
				),
				Field::new(
					"confirmation_timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(86_400),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyLedgerSchema)
	}

	async fn chain_id(&self) -> Result<u64, LedgerError> {
		let chain_id = self
			.provider
			.get_chain_id()
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to get chain id: {}", e)))?;
		if chain_id != self.chain_id {
			tracing::warn!(
				configured = self.chain_id,
				reported = chain_id,
				"Node reports a different chain id than configured"
			);
		}
		Ok(chain_id)
	}

	async fn call(&self, tx: &Transaction) -> Result<Bytes, LedgerError> {
		self.provider
			.call(Self::request(tx))
			.await
			.map_err(|e| match e.as_error_resp().and_then(|resp| resp.as_revert_data()) {
				Some(data) => LedgerError::Reverted(data),
				None => LedgerError::Network(format!("Call failed: {}", e)),
			})
	}

	async fn submit(
		&self,
		tx: Transaction,
		signature: &Signature,
	) -> Result<TransactionHash, LedgerError> {
		self.check_sender(&tx, signature)?;
		let pending = self
			.provider
			.send_transaction(Self::request(&tx))
			.await
			.map_err(|e| LedgerError::Rejected(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = *pending.tx_hash();
		tracing::debug!(tx_hash = %tx_hash, chain_id = tx.chain_id, "Sent transaction to node");
		Ok(TransactionHash(tx_hash))
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, LedgerError> {
		match self.provider.get_transaction_receipt(hash.0).await {
			Ok(Some(receipt)) => Ok(Self::convert_receipt(&receipt)),
			Ok(None) => Err(LedgerError::NotFound(format!(
				"transaction {} on chain {}",
				hash, self.chain_id
			))),
			Err(e) => Err(LedgerError::Network(format!(
				"Failed to get receipt on chain {}: {}",
				self.chain_id, e
			))),
		}
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, LedgerError> {
		let confirmations = confirmations.max(1);
		let start_time = tokio::time::Instant::now();

		tracing::info!(
			tx_hash = %hash,
			confirmations = confirmations,
			timeout_secs = self.confirmation_timeout.as_secs(),
			"Waiting for confirmations"
		);

		loop {
			if start_time.elapsed() > self.confirmation_timeout {
				return Err(LedgerError::Network(format!(
					"Timeout waiting for {} confirmations after {} seconds",
					confirmations,
					self.confirmation_timeout.as_secs()
				)));
			}

			let receipt = match self.provider.get_transaction_receipt(hash.0).await {
				Ok(Some(receipt)) => receipt,
				Ok(None) => {
					tokio::time::sleep(self.poll_interval).await;
					continue;
				},
				Err(e) => {
					return Err(LedgerError::Network(format!(
						"Failed to get receipt: {}",
						e
					)));
				},
			};

			let current_block = self.get_block_number().await?;
			let tx_block = receipt.block_number.unwrap_or(current_block);
			let depth = current_block.saturating_sub(tx_block) + 1;

			if depth >= confirmations {
				return Ok(Self::convert_receipt(&receipt));
			}

			tracing::debug!(
				tx_hash = %hash,
				remaining = confirmations - depth,
				"Waiting for more confirmations"
			);
			tokio::time::sleep(self.poll_interval).await;
		}
	}

	async fn get_block_number(&self) -> Result<u64, LedgerError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to get block number: {}", e)))
	}

	async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError> {
		self.provider
			.get_code_at(address)
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to get code: {}", e)))
	}

	async fn get_nonce(&self, address: Address) -> Result<u64, LedgerError> {
		self.provider
			.get_transaction_count(address)
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to get nonce: {}", e)))
	}
}

/// Factory function to create an RPC ledger from configuration.
///
/// Configuration parameters:
/// - `rpc_url` (required): HTTP(S) endpoint of the node
/// - `chain_id` (required): chain the relayer key signs for
/// - `poll_interval_ms` (optional): receipt polling interval
/// - `confirmation_timeout_secs` (optional): give up waiting after this long
pub fn create_ledger(
	config: &toml::Value,
	relayer_key: &SecretString,
) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	AlloyLedgerSchema::validate_config(config)
		.map_err(|e| LedgerError::Configuration(format!("Invalid configuration: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Configuration("rpc_url is required".to_string()))?;
	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| LedgerError::Configuration("chain_id is required".to_string()))?
		as u64;
	let poll_interval = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.map(|ms| ms as u64)
		.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
	let confirmation_timeout = config
		.get("confirmation_timeout_secs")
		.and_then(|v| v.as_integer())
		.map(|secs| secs as u64)
		.unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS);

	let signer: PrivateKeySigner = relayer_key.with_exposed(|key| {
		key.parse()
			.map_err(|_| LedgerError::Configuration("Invalid relayer private key format".to_string()))
	})?;

	let ledger = AlloyLedger::new(
		rpc_url,
		chain_id,
		signer,
		Duration::from_millis(poll_interval),
		Duration::from_secs(confirmation_timeout),
	)?;
	Ok(Box::new(ledger))
}

/// Registry for the Alloy ledger implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl LedgerRegistry for Registry {}
