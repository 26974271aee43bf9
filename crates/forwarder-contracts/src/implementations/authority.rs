//! Replay-protection authorities.
//!
//! An authority is a contract wrapping one [`ReplayProtection`] strategy.
//! Proxy accounts pick the strategy per request by the authority address the
//! owner signed over; the strategies themselves share nothing but this trait.
//!
//! Token state is scoped to the consumer, the contract that calls
//! `updateFor`. A third party calling `updateFor` with an owner's token only
//! touches its own lanes and leaves the token usable by the owner's account.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolInterface, SolValue};
use forwarder_types::abi::IReplayProtection::{self, IReplayProtectionCalls};
use forwarder_types::{ForwarderError, ReplayProtectionKind};

use crate::runtime::{Contract, Host, Message, Revert};

/// Consumption rule for replay-protection tokens.
///
/// State lives in the authority's own storage, keyed by `(consumer, owner)`,
/// and is only mutated by `update`, which must leave it untouched when it
/// fails.
pub trait ReplayProtection: Send + Sync {
	fn kind(&self) -> ReplayProtectionKind;

	/// Applies constructor arguments.
	fn configure(&self, host: &mut dyn Host, args: &[u8]) -> Result<(), ForwarderError> {
		let _ = host;
		if args.is_empty() {
			Ok(())
		} else {
			Err(ForwarderError::Validation(format!(
				"{} authority takes no constructor arguments",
				self.kind()
			)))
		}
	}

	/// Whether `consumer` could consume `token` for `owner` right now.
	fn validate(&self, host: &dyn Host, consumer: Address, owner: Address, token: &[u8]) -> bool;

	/// Marks `token` consumed for `owner` on `consumer`'s lanes.
	fn update(
		&self,
		host: &mut dyn Host,
		consumer: Address,
		owner: Address,
		token: &[u8],
	) -> Result<(), ForwarderError>;

	/// A token that `update` would currently accept from `consumer` on lane
	/// `queue`.
	fn next_token(
		&self,
		host: &dyn Host,
		consumer: Address,
		owner: Address,
		queue: U256,
	) -> Result<Bytes, ForwarderError>;
}

/// Storage slot of a lane: `keccak256(abi.encode(consumer, owner, lane))`.
pub fn lane_slot(consumer: Address, owner: Address, lane: U256) -> B256 {
	keccak256((consumer, owner, lane).abi_encode())
}

/// Contract exposing a strategy through `IReplayProtection`.
pub struct AuthorityContract<S>(pub S);

impl<S: ReplayProtection> Contract for AuthorityContract<S> {
	fn construct(&self, host: &mut dyn Host, msg: &Message) -> Result<(), Revert> {
		self.0.configure(host, &msg.data).map_err(Revert::from)
	}

	fn call(&self, host: &mut dyn Host, msg: &Message) -> Result<Bytes, Revert> {
		let call = IReplayProtectionCalls::abi_decode(&msg.data).map_err(|_| {
			Revert::from(ForwarderError::Validation(
				"unknown authority function".to_string(),
			))
		})?;

		let output = match call {
			IReplayProtectionCalls::validate(IReplayProtection::validateCall {
				consumer,
				owner,
				replayProtection,
			}) => self.0.validate(host, consumer, owner, &replayProtection).abi_encode(),
			IReplayProtectionCalls::updateFor(IReplayProtection::updateForCall {
				owner,
				replayProtection,
			}) => {
				self.0.update(host, msg.caller, owner, &replayProtection)?;
				tracing::debug!(
					strategy = %self.0.kind(),
					owner = %owner,
					caller = %msg.caller,
					"Consumed replay protection token"
				);
				true.abi_encode()
			},
			IReplayProtectionCalls::nextToken(IReplayProtection::nextTokenCall {
				consumer,
				owner,
				queue,
			}) => self.0.next_token(host, consumer, owner, queue)?.abi_encode(),
		};
		Ok(output.into())
	}
}
