//! Replay-protection tokens.
//!
//! A token is opaque to the proxy account; only the authority that issued it
//! knows its shape. Both built-in strategies use a pair of 256-bit words.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::errors::ForwarderError;

/// Encoded length of every built-in token.
pub const TOKEN_LENGTH: usize = 64;

/// Number of bits in a BitFlip bitmap word.
pub const BITMAP_WORD_BITS: u64 = 256;

/// Replay-protection strategy of an authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayProtectionKind {
	#[serde(rename = "bitflip")]
	BitFlip,
	Multinonce,
}

impl ReplayProtectionKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ReplayProtectionKind::BitFlip => "bitflip",
			ReplayProtectionKind::Multinonce => "multinonce",
		}
	}
}

impl fmt::Display for ReplayProtectionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ReplayProtectionKind {
	type Err = ForwarderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"bitflip" => Ok(Self::BitFlip),
			"multinonce" => Ok(Self::Multinonce),
			other => Err(ForwarderError::Validation(format!(
				"unknown replay protection strategy '{}'",
				other
			))),
		}
	}
}

/// Ordering rule of a Multinonce queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePolicy {
	/// The nonce must equal the stored next value.
	#[default]
	ExactNext,
	/// The nonce must be at least the stored next value; gaps are skipped.
	Increasing,
}

impl SequencePolicy {
	pub fn as_str(&self) -> &'static str {
		match self {
			SequencePolicy::ExactNext => "exact_next",
			SequencePolicy::Increasing => "increasing",
		}
	}

	/// Single-byte form used in the authority's constructor arguments.
	pub fn to_byte(self) -> u8 {
		match self {
			SequencePolicy::ExactNext => 0,
			SequencePolicy::Increasing => 1,
		}
	}

	pub fn from_byte(byte: u8) -> Option<Self> {
		match byte {
			0 => Some(Self::ExactNext),
			1 => Some(Self::Increasing),
			_ => None,
		}
	}
}

impl FromStr for SequencePolicy {
	type Err = ForwarderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"exact_next" => Ok(Self::ExactNext),
			"increasing" => Ok(Self::Increasing),
			other => Err(ForwarderError::Validation(format!(
				"unknown sequence policy '{}'",
				other
			))),
		}
	}
}

/// Splits a token into its two words, enforcing the exact encoded length.
fn decode_pair(token: &[u8]) -> Result<(U256, U256), ForwarderError> {
	if token.len() != TOKEN_LENGTH {
		return Err(ForwarderError::ReplayProtectionViolation(format!(
			"token must be {} bytes, got {}",
			TOKEN_LENGTH,
			token.len()
		)));
	}
	<(U256, U256)>::abi_decode(token)
		.map_err(|e| ForwarderError::ReplayProtectionViolation(format!("malformed token: {}", e)))
}

/// One bit of an owner's bitmap word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitFlipToken {
	pub index: U256,
	pub bit: u16,
}

impl BitFlipToken {
	pub fn new(index: U256, bit: u16) -> Result<Self, ForwarderError> {
		if u64::from(bit) >= BITMAP_WORD_BITS {
			return Err(ForwarderError::ReplayProtectionViolation(format!(
				"bit {} out of range",
				bit
			)));
		}
		Ok(Self { index, bit })
	}

	pub fn encode(&self) -> Bytes {
		(self.index, U256::from(self.bit)).abi_encode().into()
	}

	pub fn decode(token: &[u8]) -> Result<Self, ForwarderError> {
		let (index, bit) = decode_pair(token)?;
		if bit >= U256::from(BITMAP_WORD_BITS) {
			return Err(ForwarderError::ReplayProtectionViolation(format!(
				"bit {} out of range",
				bit
			)));
		}
		Ok(Self {
			index,
			bit: bit.to::<u16>(),
		})
	}

	/// Mask selecting this token's bit within its word.
	pub fn mask(&self) -> U256 {
		U256::from(1u8) << usize::from(self.bit)
	}
}

/// A sequence value within one Multinonce queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultinonceToken {
	pub queue: U256,
	pub nonce: U256,
}

impl MultinonceToken {
	pub fn new(queue: U256, nonce: U256) -> Self {
		Self { queue, nonce }
	}

	pub fn encode(&self) -> Bytes {
		(self.queue, self.nonce).abi_encode().into()
	}

	pub fn decode(token: &[u8]) -> Result<Self, ForwarderError> {
		let (queue, nonce) = decode_pair(token)?;
		Ok(Self { queue, nonce })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bitflip_token_encoding_is_two_words() {
		let token = BitFlipToken::new(U256::from(3u8), 17).unwrap();
		let encoded = token.encode();
		assert_eq!(encoded.len(), TOKEN_LENGTH);
		assert_eq!(encoded[31], 3);
		assert_eq!(encoded[63], 17);
		assert_eq!(BitFlipToken::decode(&encoded).unwrap(), token);
	}

	#[test]
	fn test_bitflip_token_rejects_bit_out_of_range() {
		assert!(BitFlipToken::new(U256::ZERO, 256).is_err());

		let raw = (U256::ZERO, U256::from(256u64)).abi_encode();
		let err = BitFlipToken::decode(&raw).unwrap_err();
		assert!(matches!(err, ForwarderError::ReplayProtectionViolation(_)));
	}

	#[test]
	fn test_token_rejects_wrong_length() {
		let mut raw = MultinonceToken::new(U256::from(1u8), U256::from(2u8))
			.encode()
			.to_vec();
		raw.push(0);
		assert!(MultinonceToken::decode(&raw).is_err());
		assert!(BitFlipToken::decode(&raw[..32]).is_err());
	}

	#[test]
	fn test_bitflip_mask() {
		let token = BitFlipToken::new(U256::ZERO, 255).unwrap();
		assert_eq!(token.mask(), U256::from(1u8) << 255);
	}

	#[test]
	fn test_kind_and_policy_parse() {
		assert_eq!(
			"bitflip".parse::<ReplayProtectionKind>().unwrap(),
			ReplayProtectionKind::BitFlip
		);
		assert_eq!(
			"increasing".parse::<SequencePolicy>().unwrap(),
			SequencePolicy::Increasing
		);
		assert!("strict".parse::<SequencePolicy>().is_err());
		assert_eq!(SequencePolicy::from_byte(1), Some(SequencePolicy::Increasing));
		assert_eq!(SequencePolicy::from_byte(2), None);
	}
}
