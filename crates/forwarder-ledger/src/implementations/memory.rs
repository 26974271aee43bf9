//! In-process ledger.
//!
//! Executes transactions one at a time against a [`WorldState`] held behind a
//! single async mutex, so every state-changing transaction is totally ordered
//! and atomic. Each transaction is mined into its own block.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bytes, Signature, U256};
use async_trait::async_trait;
use forwarder_contracts::artifacts::standard_registry;
use forwarder_contracts::{ArtifactRegistry, CreateError, Executor, WorldState};
use forwarder_types::{
	ConfigSchema, Field, FieldType, ForwarderError, ImplementationRegistry, Schema, SecretString,
	Transaction, TransactionHash, TransactionReceipt, ValidationError,
};
use tokio::sync::Mutex;

use crate::{LedgerError, LedgerFactory, LedgerInterface, LedgerRegistry};

#[derive(Default)]
struct Chain {
	world: WorldState,
	block_number: u64,
	receipts: HashMap<TransactionHash, TransactionReceipt>,
}

pub struct MemoryLedger {
	chain_id: u64,
	registry: Arc<ArtifactRegistry>,
	chain: Mutex<Chain>,
}

impl MemoryLedger {
	/// A ledger that knows the built-in artifacts.
	pub fn new(chain_id: u64) -> Self {
		Self::with_registry(chain_id, standard_registry())
	}

	pub fn with_registry(chain_id: u64, registry: ArtifactRegistry) -> Self {
		Self {
			chain_id,
			registry: Arc::new(registry),
			chain: Mutex::new(Chain::default()),
		}
	}

	/// Credits `value` to `address`.
	pub async fn fund(&self, address: Address, value: U256) {
		let mut chain = self.chain.lock().await;
		chain.world.mint(address, value);
		chain.world.commit();
	}

	pub async fn balance(&self, address: Address) -> U256 {
		self.chain.lock().await.world.balance(&address)
	}

	/// Runs `tx` as `sender` and records the receipt.
	fn execute(
		&self,
		chain: &mut Chain,
		sender: Address,
		tx: &Transaction,
		hash: TransactionHash,
	) -> TransactionReceipt {
		let nonce = chain.world.nonce(&sender);
		chain.world.set_nonce(sender, nonce + 1);
		chain.block_number += 1;

		let mut exec = Executor::new(&mut chain.world, &self.registry, self.chain_id);
		let (outcome, contract_address) = match tx.to {
			Some(to) => (
				exec.call_from(sender, to, tx.value, tx.data.clone())
					.map(|_| ())
					.map_err(|revert| revert.0),
				None,
			),
			None => {
				let address = sender.create(nonce);
				match exec.create_at(sender, address, tx.value, tx.data.clone()) {
					Ok(created) => (Ok(()), Some(created)),
					Err(e) => (Err(creation_revert_data(e)), None),
				}
			},
		};
		let logs = exec.into_logs();
		chain.world.commit();

		let receipt = match outcome {
			Ok(()) => TransactionReceipt {
				hash,
				block_number: chain.block_number,
				success: true,
				logs,
				contract_address,
				revert_data: None,
			},
			Err(revert_data) => TransactionReceipt {
				hash,
				block_number: chain.block_number,
				success: false,
				logs: Vec::new(),
				contract_address: None,
				revert_data: Some(revert_data),
			},
		};
		chain.receipts.insert(hash, receipt.clone());
		receipt
	}
}

fn creation_revert_data(err: CreateError) -> Bytes {
	match err {
		CreateError::ConstructorReverted(data) => data,
		other => ForwarderError::deployment(other.failure(), other.to_string()).to_revert_data(),
	}
}

pub struct MemoryLedgerSchema;

impl MemoryLedgerSchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		Self.validate(config)
	}
}

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new(
				"chain_id",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			)],
			vec![],
		)
		.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLedgerSchema)
	}

	async fn chain_id(&self) -> Result<u64, LedgerError> {
		Ok(self.chain_id)
	}

	async fn call(&self, tx: &Transaction) -> Result<Bytes, LedgerError> {
		let mut chain = self.chain.lock().await;
		let checkpoint = chain.world.checkpoint();
		let from = tx.from.unwrap_or_default();
		let mut exec = Executor::new(&mut chain.world, &self.registry, self.chain_id);
		let output = match tx.to {
			Some(to) => exec
				.call_from(from, to, tx.value, tx.data.clone())
				.map_err(|revert| LedgerError::Reverted(revert.0)),
			None => {
				let address = from.create(tx.nonce.unwrap_or_default());
				exec.create_at(from, address, tx.value, tx.data.clone())
					.map(|_| address)
					.map_err(|e| LedgerError::Reverted(creation_revert_data(e)))
					.map(|address| chain.world.code(&address))
			},
		};
		chain.world.revert_to(checkpoint);
		output
	}

	async fn submit(
		&self,
		tx: Transaction,
		signature: &Signature,
	) -> Result<TransactionHash, LedgerError> {
		if tx.chain_id != self.chain_id {
			return Err(LedgerError::Rejected(format!(
				"chain id {} does not match ledger chain {}",
				tx.chain_id, self.chain_id
			)));
		}

		let signing_hash = tx.signing_hash();
		let sender = signature
			.recover_address_from_prehash(&signing_hash)
			.map_err(|e| LedgerError::Rejected(format!("invalid transaction signature: {}", e)))?;
		if let Some(from) = tx.from {
			if from != sender {
				return Err(LedgerError::Rejected(format!(
					"signature recovers to {}, not {}",
					sender, from
				)));
			}
		}

		let mut preimage = signing_hash.to_vec();
		preimage.extend_from_slice(&signature.as_bytes());
		let hash = TransactionHash(keccak256(preimage));

		let mut chain = self.chain.lock().await;
		if chain.receipts.contains_key(&hash) {
			return Err(LedgerError::Rejected(format!("transaction {} already known", hash)));
		}
		let expected_nonce = chain.world.nonce(&sender);
		if let Some(nonce) = tx.nonce {
			if nonce != expected_nonce {
				return Err(LedgerError::Rejected(format!(
					"nonce {} does not match account nonce {}",
					nonce, expected_nonce
				)));
			}
		}

		let receipt = self.execute(&mut chain, sender, &tx, hash);
		tracing::debug!(
			tx_hash = %hash,
			block = receipt.block_number,
			success = receipt.success,
			logs = receipt.logs.len(),
			"Mined transaction"
		);
		Ok(hash)
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, LedgerError> {
		self.chain
			.lock()
			.await
			.receipts
			.get(hash)
			.cloned()
			.ok_or_else(|| LedgerError::NotFound(format!("transaction {}", hash)))
	}

	/// Mines empty blocks until the requested depth is reached.
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, LedgerError> {
		let mut chain = self.chain.lock().await;
		let receipt = chain
			.receipts
			.get(hash)
			.cloned()
			.ok_or_else(|| LedgerError::NotFound(format!("transaction {}", hash)))?;

		let target = receipt.block_number + confirmations.max(1) - 1;
		if chain.block_number < target {
			tracing::debug!(
				tx_hash = %hash,
				blocks = target - chain.block_number,
				"Mining empty blocks for confirmations"
			);
			chain.block_number = target;
		}
		Ok(receipt)
	}

	async fn get_block_number(&self) -> Result<u64, LedgerError> {
		Ok(self.chain.lock().await.block_number)
	}

	async fn get_code(&self, address: Address) -> Result<Bytes, LedgerError> {
		Ok(self.chain.lock().await.world.code(&address))
	}

	async fn get_nonce(&self, address: Address) -> Result<u64, LedgerError> {
		Ok(self.chain.lock().await.world.nonce(&address))
	}
}

/// Factory function to create an in-process ledger from configuration.
///
/// Configuration parameters:
/// - `chain_id`: chain id reported by the ledger and bound into digests
pub fn create_ledger(
	config: &toml::Value,
	_relayer_key: &SecretString,
) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	MemoryLedgerSchema::validate_config(config)
		.map_err(|e| LedgerError::Configuration(format!("Invalid configuration: {}", e)))?;

	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| LedgerError::Configuration("chain_id is required".to_string()))?;

	Ok(Box::new(MemoryLedger::new(chain_id as u64)))
}

/// Registry for the in-process ledger implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl LedgerRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::B256;
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use alloy_sol_types::{SolCall, SolEvent};
	use forwarder_contracts::artifacts;
	use forwarder_contracts::implementations::msg_sender;
	use forwarder_types::abi::IMsgSenderExample;

	const CHAIN_ID: u64 = 31337;

	fn signer() -> PrivateKeySigner {
		PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).unwrap()
	}

	fn sign(signer: &PrivateKeySigner, mut tx: Transaction, nonce: u64) -> (Transaction, Signature) {
		tx.from = Some(signer.address());
		tx.nonce = Some(nonce);
		let signature = signer.sign_hash_sync(&tx.signing_hash()).unwrap();
		(tx, signature)
	}

	async fn deploy_example(ledger: &MemoryLedger, signer: &PrivateKeySigner) -> Address {
		let init_code = artifacts::msg_sender_example().init_code(&msg_sender::constructor_args(Address::ZERO));
		let nonce = ledger.get_nonce(signer.address()).await.unwrap();
		let (tx, sig) = sign(signer, Transaction::create(CHAIN_ID, init_code), nonce);
		let hash = ledger.submit(tx, &sig).await.unwrap();
		let receipt = ledger.get_receipt(&hash).await.unwrap();
		assert!(receipt.success);
		receipt.contract_address.unwrap()
	}

	#[tokio::test]
	async fn test_create_then_call() {
		let ledger = MemoryLedger::new(CHAIN_ID);
		let signer = signer();
		let example = deploy_example(&ledger, &signer).await;
		assert_eq!(example, signer.address().create(0));
		assert!(!ledger.get_code(example).await.unwrap().is_empty());

		let data = IMsgSenderExample::testCall {}.abi_encode();
		let (tx, sig) = sign(&signer, Transaction::call(CHAIN_ID, example, data), 1);
		let hash = ledger.submit(tx, &sig).await.unwrap();
		let receipt = ledger.get_receipt(&hash).await.unwrap();
		let event = IMsgSenderExample::WhoIsSender::decode_log_data(&receipt.logs[0].data).unwrap();
		assert_eq!(event.sender, signer.address());
		assert_eq!(receipt.block_number, 2);
	}

	#[tokio::test]
	async fn test_failed_transaction_is_included() {
		let ledger = MemoryLedger::new(CHAIN_ID);
		let signer = signer();
		let bad_init = artifacts::msg_sender_example().init_code(&[]);
		let (tx, sig) = sign(&signer, Transaction::create(CHAIN_ID, bad_init), 0);
		let hash = ledger.submit(tx, &sig).await.unwrap();

		let receipt = ledger.get_receipt(&hash).await.unwrap();
		assert!(!receipt.success);
		assert!(receipt.revert_data.is_some());
		assert!(ledger.get_code(signer.address().create(0)).await.unwrap().is_empty());
		// The nonce is spent either way.
		assert_eq!(ledger.get_nonce(signer.address()).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_submit_rejections() {
		let ledger = MemoryLedger::new(CHAIN_ID);
		let signer = signer();
		let to = Address::repeat_byte(0x01);

		let (tx, sig) = sign(&signer, Transaction::call(CHAIN_ID, to, Bytes::new()), 5);
		assert!(matches!(ledger.submit(tx, &sig).await, Err(LedgerError::Rejected(_))));

		let (tx, sig) = sign(&signer, Transaction::call(CHAIN_ID + 1, to, Bytes::new()), 0);
		assert!(matches!(ledger.submit(tx, &sig).await, Err(LedgerError::Rejected(_))));

		let (mut tx, sig) = sign(&signer, Transaction::call(CHAIN_ID, to, Bytes::new()), 0);
		tx.from = Some(to);
		assert!(matches!(ledger.submit(tx, &sig).await, Err(LedgerError::Rejected(_))));

		let (tx, sig) = sign(&signer, Transaction::call(CHAIN_ID, to, Bytes::new()), 0);
		ledger.submit(tx.clone(), &sig).await.unwrap();
		assert!(matches!(ledger.submit(tx, &sig).await, Err(LedgerError::Rejected(_))));
	}

	#[tokio::test]
	async fn test_call_does_not_commit() {
		let ledger = MemoryLedger::new(CHAIN_ID);
		let signer = signer();
		let example = deploy_example(&ledger, &signer).await;
		let before = ledger.get_block_number().await.unwrap();

		let mut tx = Transaction::call(CHAIN_ID, example, IMsgSenderExample::hubCall {}.abi_encode());
		tx.from = Some(signer.address());
		let output = ledger.call(&tx).await.unwrap();
		assert_eq!(output.len(), 32);

		let bad = Transaction::call(CHAIN_ID, example, vec![0xde, 0xad, 0xbe, 0xef]);
		assert!(matches!(ledger.call(&bad).await, Err(LedgerError::Reverted(_))));
		assert_eq!(ledger.get_block_number().await.unwrap(), before);
		assert_eq!(ledger.get_nonce(signer.address()).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_confirmations_mine_blocks() {
		let ledger = MemoryLedger::new(CHAIN_ID);
		let signer = signer();
		let (tx, sig) = sign(&signer, Transaction::call(CHAIN_ID, Address::ZERO, Bytes::new()), 0);
		let hash = ledger.submit(tx, &sig).await.unwrap();

		let receipt = ledger.wait_for_confirmation(&hash, 1).await.unwrap();
		assert_eq!(receipt.block_number, 1);
		assert_eq!(ledger.get_block_number().await.unwrap(), 1);

		ledger.wait_for_confirmation(&hash, 5).await.unwrap();
		assert_eq!(ledger.get_block_number().await.unwrap(), 5);

		let unknown = TransactionHash(B256::repeat_byte(0x09));
		assert!(matches!(
			ledger.wait_for_confirmation(&unknown, 1).await,
			Err(LedgerError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_value_transfer_needs_funds() {
		let ledger = MemoryLedger::new(CHAIN_ID);
		let signer = signer();
		let to = Address::repeat_byte(0x07);
		let value = U256::from(10u8);

		let (tx, sig) = sign(&signer, Transaction::call(CHAIN_ID, to, Bytes::new()).with_value(value), 0);
		let hash = ledger.submit(tx, &sig).await.unwrap();
		assert!(!ledger.get_receipt(&hash).await.unwrap().success);

		ledger.fund(signer.address(), value).await;
		let (tx, sig) = sign(&signer, Transaction::call(CHAIN_ID, to, Bytes::new()).with_value(value), 1);
		let hash = ledger.submit(tx, &sig).await.unwrap();
		assert!(ledger.get_receipt(&hash).await.unwrap().success);
		assert_eq!(ledger.balance(to).await, value);
	}

	#[test]
	fn test_factory_requires_chain_id() {
		let key = SecretString::from("unused");
		let config: toml::Value = toml::from_str("chain_id = 5").unwrap();
		assert!(create_ledger(&config, &key).is_ok());

		let config: toml::Value = toml::from_str("other = 1").unwrap();
		assert!(matches!(create_ledger(&config, &key), Err(LedgerError::Configuration(_))));
	}
}
