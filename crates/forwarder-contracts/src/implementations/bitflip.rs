//! BitFlip strategy: each token is one bit of a bitmap word.
//!
//! Tokens can be consumed in any order; a word holds 256 of them.

use alloy_primitives::{Address, Bytes, U256};
use forwarder_types::{BitFlipToken, ForwarderError, ReplayProtectionKind};

use super::authority::{lane_slot, ReplayProtection};
use crate::runtime::{load_u256, store_u256, Host};

pub struct BitFlip;

impl ReplayProtection for BitFlip {
	fn kind(&self) -> ReplayProtectionKind {
		ReplayProtectionKind::BitFlip
	}

	fn validate(&self, host: &dyn Host, consumer: Address, owner: Address, token: &[u8]) -> bool {
		match BitFlipToken::decode(token) {
			Ok(token) => {
				load_u256(host, lane_slot(consumer, owner, token.index)) & token.mask() == U256::ZERO
			},
			Err(_) => false,
		}
	}

	fn update(
		&self,
		host: &mut dyn Host,
		consumer: Address,
		owner: Address,
		token: &[u8],
	) -> Result<(), ForwarderError> {
		let token = BitFlipToken::decode(token)?;
		let slot = lane_slot(consumer, owner, token.index);
		let word = load_u256(&*host, slot);
		if word & token.mask() != U256::ZERO {
			return Err(ForwarderError::ReplayProtectionViolation(format!(
				"bit {} of word {} already consumed",
				token.bit, token.index
			)));
		}
		store_u256(host, slot, word | token.mask());
		Ok(())
	}

	fn next_token(
		&self,
		host: &dyn Host,
		consumer: Address,
		owner: Address,
		index: U256,
	) -> Result<Bytes, ForwarderError> {
		let word = load_u256(host, lane_slot(consumer, owner, index));
		if word == U256::MAX {
			return Err(ForwarderError::ReplayProtectionViolation(
				"bitmap exhausted".to_string(),
			));
		}
		let bit = (!word).trailing_zeros() as u16;
		Ok(BitFlipToken::new(index, bit)?.encode())
	}
}
