//! Read-only views of the on-ledger hub and authorities.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use forwarder_ledger::{LedgerError, LedgerService};
use forwarder_types::abi::{IProxyHub, IReplayProtection};
use forwarder_types::{ForwarderError, ReplayProtectionKind, Transaction};

/// Maps a ledger error into the forwarder taxonomy, decoding revert data.
pub(crate) fn ledger_error(err: LedgerError) -> ForwarderError {
	match err {
		LedgerError::Reverted(data) => ForwarderError::from_revert_data(&data),
		other => ForwarderError::SubmissionFailure(other.to_string()),
	}
}

async fn view(
	ledger: &LedgerService,
	chain_id: u64,
	to: Address,
	data: Vec<u8>,
) -> Result<Bytes, ForwarderError> {
	ledger
		.call(&Transaction::call(chain_id, to, data))
		.await
		.map_err(ledger_error)
}

fn malformed(what: &str, at: Address) -> ForwarderError {
	ForwarderError::Validation(format!("malformed {} response from {}", what, at))
}

/// Queries a proxy hub.
#[derive(Clone)]
pub struct HubClient {
	address: Address,
	chain_id: u64,
	ledger: Arc<LedgerService>,
}

impl HubClient {
	pub fn new(address: Address, chain_id: u64, ledger: Arc<LedgerService>) -> Self {
		Self {
			address,
			chain_id,
			ledger,
		}
	}

	pub fn address(&self) -> Address {
		self.address
	}

	/// Registered proxy account of `owner`, if any.
	pub async fn account_of(&self, owner: Address) -> Result<Option<Address>, ForwarderError> {
		let output = view(
			&self.ledger,
			self.chain_id,
			self.address,
			IProxyHub::accountsCall { owner }.abi_encode(),
		)
		.await?;
		let account = Address::abi_decode(&output).map_err(|_| malformed("accounts", self.address))?;
		Ok((!account.is_zero()).then_some(account))
	}

	/// Code hash of the base account template.
	pub async fn base_account(&self) -> Result<B256, ForwarderError> {
		let output = view(
			&self.ledger,
			self.chain_id,
			self.address,
			IProxyHub::baseAccountCall {}.abi_encode(),
		)
		.await?;
		B256::abi_decode(&output).map_err(|_| malformed("baseAccount", self.address))
	}
}

/// Queries a replay-protection authority.
#[derive(Clone)]
pub struct AuthorityClient {
	address: Address,
	kind: ReplayProtectionKind,
	chain_id: u64,
	ledger: Arc<LedgerService>,
}

impl AuthorityClient {
	pub fn new(
		address: Address,
		kind: ReplayProtectionKind,
		chain_id: u64,
		ledger: Arc<LedgerService>,
	) -> Self {
		Self {
			address,
			kind,
			chain_id,
			ledger,
		}
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn kind(&self) -> ReplayProtectionKind {
		self.kind
	}

	/// A token the authority would accept right now when `consumer`, the
	/// owner's proxy account, spends it for `owner` on `lane`.
	pub async fn next_token(
		&self,
		consumer: Address,
		owner: Address,
		lane: u64,
	) -> Result<Bytes, ForwarderError> {
		let output = view(
			&self.ledger,
			self.chain_id,
			self.address,
			IReplayProtection::nextTokenCall {
				consumer,
				owner,
				queue: U256::from(lane),
			}
			.abi_encode(),
		)
		.await?;
		Bytes::abi_decode(&output).map_err(|_| malformed("nextToken", self.address))
	}

	/// Whether `consumer` could still spend `token` for `owner`.
	pub async fn validate(
		&self,
		consumer: Address,
		owner: Address,
		token: &Bytes,
	) -> Result<bool, ForwarderError> {
		let output = view(
			&self.ledger,
			self.chain_id,
			self.address,
			IReplayProtection::validateCall {
				consumer,
				owner,
				replayProtection: token.clone(),
			}
			.abi_encode(),
		)
		.await?;
		bool::abi_decode(&output).map_err(|_| malformed("validate", self.address))
	}
}
