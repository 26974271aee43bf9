//! Multinonce strategy: independent ordered sequences ("queues") per owner.
//!
//! The authority is constructed with a queue count and a [`SequencePolicy`];
//! each queue stores the next acceptable nonce.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use forwarder_types::{ForwarderError, MultinonceToken, ReplayProtectionKind, SequencePolicy};

use super::authority::{lane_slot, ReplayProtection};
use crate::runtime::{load_u256, store_u256, Host};

fn queues_slot() -> B256 {
	keccak256("forwarder.multinonce.queues")
}

fn policy_slot() -> B256 {
	keccak256("forwarder.multinonce.policy")
}

/// Constructor arguments: `abi.encode(uint256 queues, uint256 policy)`.
pub fn constructor_args(queues: u64, policy: SequencePolicy) -> Bytes {
	(U256::from(queues), U256::from(policy.to_byte()))
		.abi_encode()
		.into()
}

pub struct Multinonce;

impl Multinonce {
	fn settings(host: &dyn Host) -> Result<(U256, SequencePolicy), ForwarderError> {
		let queues = load_u256(host, queues_slot());
		let policy = SequencePolicy::from_byte(load_u256(host, policy_slot()).saturating_to::<u8>())
			.ok_or_else(|| ForwarderError::Validation("unknown sequence policy".to_string()))?;
		Ok((queues, policy))
	}

	fn check_queue(queue: U256, queues: U256) -> Result<(), ForwarderError> {
		if queue >= queues {
			return Err(ForwarderError::ReplayProtectionViolation(format!(
				"queue {} out of range ({} queues)",
				queue, queues
			)));
		}
		Ok(())
	}

	/// Slot to write and the value to store if `token` is accepted.
	fn admit(
		host: &dyn Host,
		consumer: Address,
		owner: Address,
		token: &[u8],
	) -> Result<(B256, U256), ForwarderError> {
		let token = MultinonceToken::decode(token)?;
		let (queues, policy) = Self::settings(host)?;
		Self::check_queue(token.queue, queues)?;

		let slot = lane_slot(consumer, owner, token.queue);
		let expected = load_u256(host, slot);
		let accepted = match policy {
			SequencePolicy::ExactNext => token.nonce == expected,
			SequencePolicy::Increasing => token.nonce >= expected,
		};
		if !accepted {
			return Err(ForwarderError::ReplayProtectionViolation(format!(
				"nonce {} rejected on queue {}, next is {}",
				token.nonce, token.queue, expected
			)));
		}
		let next = token.nonce.checked_add(U256::from(1u8)).ok_or_else(|| {
			ForwarderError::ReplayProtectionViolation("nonce space exhausted".to_string())
		})?;
		Ok((slot, next))
	}
}

impl ReplayProtection for Multinonce {
	fn kind(&self) -> ReplayProtectionKind {
		ReplayProtectionKind::Multinonce
	}

	fn configure(&self, host: &mut dyn Host, args: &[u8]) -> Result<(), ForwarderError> {
		if args.len() != 64 {
			return Err(ForwarderError::Validation(
				"multinonce authority expects (uint256 queues, uint256 policy)".to_string(),
			));
		}
		let (queues, policy) = <(U256, U256)>::abi_decode(args)
			.map_err(|e| ForwarderError::Validation(format!("bad constructor arguments: {}", e)))?;
		let policy = policy.saturating_to::<u8>();
		if queues.is_zero() {
			return Err(ForwarderError::Validation(
				"queue count must be positive".to_string(),
			));
		}
		let policy = SequencePolicy::from_byte(policy).ok_or_else(|| {
			ForwarderError::Validation(format!("unknown sequence policy {}", policy))
		})?;
		store_u256(host, queues_slot(), queues);
		store_u256(host, policy_slot(), U256::from(policy.to_byte()));
		Ok(())
	}

	fn validate(&self, host: &dyn Host, consumer: Address, owner: Address, token: &[u8]) -> bool {
		Self::admit(host, consumer, owner, token).is_ok()
	}

	fn update(
		&self,
		host: &mut dyn Host,
		consumer: Address,
		owner: Address,
		token: &[u8],
	) -> Result<(), ForwarderError> {
		let (slot, next) = Self::admit(&*host, consumer, owner, token)?;
		store_u256(host, slot, next);
		Ok(())
	}

	fn next_token(
		&self,
		host: &dyn Host,
		consumer: Address,
		owner: Address,
		queue: U256,
	) -> Result<Bytes, ForwarderError> {
		let (queues, _) = Self::settings(host)?;
		Self::check_queue(queue, queues)?;
		let nonce = load_u256(host, lane_slot(consumer, owner, queue));
		Ok(MultinonceToken::new(queue, nonce).encode())
	}
}
