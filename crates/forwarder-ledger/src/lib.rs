//! Ledger access for the forwarder.
//!
//! The ledger is the serially ordered execution environment that hosts the
//! proxy hub, the proxy accounts and the replay-protection authorities. This
//! crate abstracts it behind [`LedgerInterface`] and ships an in-process
//! implementation for development and tests and an RPC implementation for
//! EVM networks.

use alloy_primitives::{Address, Bytes, Signature};
use async_trait::async_trait;
use forwarder_account::AccountService;
use forwarder_types::{
	ConfigSchema, ImplementationRegistry, SecretString, Transaction, TransactionHash,
	TransactionReceipt,
};
use thiserror::Error;
use tokio::sync::Mutex;

pub mod implementations {
	pub mod memory;
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur while talking to a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Transport or node failure.
	#[error("Network error: {0}")]
	Network(String),
	/// A read-only call reverted with the given data.
	#[error("Call reverted")]
	Reverted(Bytes),
	/// The ledger refused to accept the transaction.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Interface every ledger backend implements.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Schema of the TOML table this implementation is configured with.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn chain_id(&self) -> Result<u64, LedgerError>;

	/// Executes `tx` without committing anything.
	///
	/// Reverts come back as [`LedgerError::Reverted`] with their revert data.
	async fn call(&self, tx: &Transaction) -> Result<Bytes, LedgerError>;

	/// Submits a signed transaction and returns its hash.
	///
	/// A transaction that executes and fails is still included; its receipt
	/// reports the failure.
	async fn submit(
		&self,
		tx: Transaction,
		signature: &Signature,
	) -> Result<TransactionHash, LedgerError>;

	/// Receipt of an included transaction.
	async fn get_receipt(&self, hash: &TransactionHash)
		-> Result<TransactionReceipt, LedgerError>;

	/// Waits until the transaction is buried `confirmations` deep.
	///
	/// Inclusion counts as the first confirmation.
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, LedgerError>;

	async fn get_block_number(&self) -> Result<u64, LedgerError>;

	async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError>;

	/// Next transaction nonce of `address`.
	async fn get_nonce(&self, address: Address) -> Result<u64, LedgerError>;
}

/// Type alias for ledger factory functions.
///
/// The secret is the relayer key, for backends that sign on their own.
pub type LedgerFactory =
	fn(&toml::Value, &SecretString) -> Result<Box<dyn LedgerInterface>, LedgerError>;

/// Registry trait for ledger implementations.
pub trait LedgerRegistry: ImplementationRegistry<Factory = LedgerFactory> {}

/// Returns every available ledger implementation as (name, factory).
pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::{evm::alloy, memory};

	vec![
		(memory::Registry::NAME, memory::Registry::factory()),
		(alloy::Registry::NAME, alloy::Registry::factory()),
	]
}

/// Signs and submits transactions through one ledger backend.
pub struct LedgerService {
	implementation: Box<dyn LedgerInterface>,
	/// Default confirmation depth before a result counts as durable.
	min_confirmations: u64,
	/// Serializes nonce assignment across concurrent deliveries.
	nonce_lock: Mutex<()>,
}

impl LedgerService {
	pub fn new(implementation: Box<dyn LedgerInterface>, min_confirmations: u64) -> Self {
		Self {
			implementation,
			min_confirmations: min_confirmations.max(1),
			nonce_lock: Mutex::new(()),
		}
	}

	pub fn min_confirmations(&self) -> u64 {
		self.min_confirmations
	}

	/// Fills in sender and nonce, signs with `sender` and submits.
	pub async fn deliver(
		&self,
		sender: &AccountService,
		mut tx: Transaction,
	) -> Result<TransactionHash, LedgerError> {
		let _guard = self.nonce_lock.lock().await;

		let from = sender.address();
		tx.from = Some(from);
		if tx.nonce.is_none() {
			tx.nonce = Some(self.implementation.get_nonce(from).await?);
		}

		let signature = sender
			.sign(&tx)
			.await
			.map_err(|e| LedgerError::Rejected(format!("Failed to sign transaction: {}", e)))?;

		let chain_id = tx.chain_id;
		let hash = self.implementation.submit(tx, &signature).await?;
		tracing::info!(tx_hash = %hash, chain_id = chain_id, from = %from, "Submitted transaction");
		Ok(hash)
	}

	pub async fn call(&self, tx: &Transaction) -> Result<Bytes, LedgerError> {
		self.implementation.call(tx).await
	}

	/// Waits for the configured confirmation depth.
	pub async fn confirm(&self, hash: &TransactionHash) -> Result<TransactionReceipt, LedgerError> {
		self.confirm_with(hash, self.min_confirmations).await
	}

	pub async fn confirm_with(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, LedgerError> {
		self.implementation
			.wait_for_confirmation(hash, confirmations)
			.await
	}

	pub async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, LedgerError> {
		self.implementation.get_receipt(hash).await
	}

	pub async fn chain_id(&self) -> Result<u64, LedgerError> {
		self.implementation.chain_id().await
	}

	pub async fn get_block_number(&self) -> Result<u64, LedgerError> {
		self.implementation.get_block_number().await
	}

	pub async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError> {
		self.implementation.get_code(address).await
	}

	pub async fn get_nonce(&self, address: Address) -> Result<u64, LedgerError> {
		self.implementation.get_nonce(address).await
	}
}
