//! Signed forward and deployment parameters.
//!
//! Parameters are produced by the meta-transaction handler, carried to a
//! relayer (usually as JSON) and consumed exactly once by a proxy account.

use alloy_primitives::{Address, Bytes, Signature, B256, U256};
use serde::{Deserialize, Serialize};

use crate::errors::ForwarderError;
use crate::utils::forward_digest;

/// Length of an `r ‖ s ‖ v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// A signed request to have a proxy account call `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardParams {
	pub hub: Address,
	pub target: Address,
	pub value: U256,
	pub data: Bytes,
	pub replay_protection: Bytes,
	pub replay_protection_authority: Address,
	pub chain_id: U256,
	pub signature: Bytes,
}

/// A signed request to have a proxy account deploy `data` as init code.
///
/// The digest is computed with the zero address as target and a zero value,
/// so these two fields are fixed and not serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployParams {
	pub hub: Address,
	pub data: Bytes,
	pub replay_protection: Bytes,
	pub replay_protection_authority: Address,
	pub chain_id: U256,
	pub signature: Bytes,
}

impl ForwardParams {
	/// Digest the owner signed over.
	pub fn digest(&self) -> B256 {
		forward_digest(
			self.hub,
			self.target,
			self.value,
			&self.data,
			&self.replay_protection,
			self.replay_protection_authority,
			self.chain_id,
		)
	}

	/// Recovers the signer of the digest.
	pub fn recover_signer(&self) -> Result<Address, ForwarderError> {
		recover_signer(&self.signature, &self.digest())
	}
}

impl DeployParams {
	/// Digest the owner signed over.
	pub fn digest(&self) -> B256 {
		forward_digest(
			self.hub,
			Address::ZERO,
			U256::ZERO,
			&self.data,
			&self.replay_protection,
			self.replay_protection_authority,
			self.chain_id,
		)
	}

	/// Recovers the signer of the digest.
	pub fn recover_signer(&self) -> Result<Address, ForwarderError> {
		recover_signer(&self.signature, &self.digest())
	}
}

/// Parses a 65-byte `r ‖ s ‖ v` signature.
pub fn parse_signature(raw: &[u8]) -> Result<Signature, ForwarderError> {
	if raw.len() != SIGNATURE_LENGTH {
		return Err(ForwarderError::Validation(format!(
			"signature must be {} bytes, got {}",
			SIGNATURE_LENGTH,
			raw.len()
		)));
	}
	Signature::from_raw(raw)
		.map_err(|e| ForwarderError::Validation(format!("malformed signature: {}", e)))
}

/// Recovers the address that produced `raw` over `digest`.
pub fn recover_signer(raw: &[u8], digest: &B256) -> Result<Address, ForwarderError> {
	parse_signature(raw)?
		.recover_address_from_prehash(digest)
		.map_err(|e| ForwarderError::Validation(format!("signature recovery failed: {}", e)))
}
