//! Ledger transaction types.
//!
//! These types describe what is submitted to the ledger and what comes
//! back, independent of which ledger backend executes it.

use alloy_primitives::{keccak256, Address, Bytes, Log, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// A state-changing transaction.
///
/// `to` is `None` for a plain contract creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub chain_id: u64,
	pub from: Option<Address>,
	pub to: Option<Address>,
	pub value: U256,
	pub data: Bytes,
	pub nonce: Option<u64>,
	pub gas_limit: Option<u64>,
}

impl Transaction {
	/// A call to `to` carrying `data`.
	pub fn call(chain_id: u64, to: Address, data: impl Into<Bytes>) -> Self {
		Self {
			chain_id,
			from: None,
			to: Some(to),
			value: U256::ZERO,
			data: data.into(),
			nonce: None,
			gas_limit: None,
		}
	}

	/// A contract creation running `init_code`.
	pub fn create(chain_id: u64, init_code: impl Into<Bytes>) -> Self {
		Self {
			chain_id,
			from: None,
			to: None,
			value: U256::ZERO,
			data: init_code.into(),
			nonce: None,
			gas_limit: None,
		}
	}

	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}

	/// Hash signed by the sender of a transaction executed by the
	/// in-process ledger.
	pub fn signing_hash(&self) -> B256 {
		keccak256(
			(
				U256::from(self.chain_id),
				self.from.unwrap_or_default(),
				self.to.unwrap_or_default(),
				self.to.is_none(),
				self.value,
				self.data.clone(),
				U256::from(self.nonce.unwrap_or_default()),
			)
				.abi_encode_params(),
		)
	}
}

/// Transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl std::fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Outcome of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
	/// Logs emitted by a successful transaction.
	pub logs: Vec<Log>,
	/// Address of a contract created by the transaction.
	pub contract_address: Option<Address>,
	/// Revert data of a failed transaction, when the ledger exposes it.
	pub revert_data: Option<Bytes>,
}
