//! Error taxonomy of the forwarder.
//!
//! On the ledger these errors travel as ABI-encoded custom errors in revert
//! data (`IForwarderErrors`); off the ledger they are a `ForwarderError`.
//! The two forms convert into each other so a relayer can report the exact
//! reason a submission was rejected.

use std::fmt;

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{Revert, SolError, SolInterface};
use thiserror::Error;

use crate::abi::IForwarderErrors;

/// Why a deployment through a proxy account failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentFailure {
	/// The init code is not deployable code.
	MalformedBytecode,
	/// The constructor ran and reverted.
	ConstructorReverted,
	/// Code already exists at the derived address.
	AddressCollision,
	/// Construction finished but left no code at the derived address.
	NoCodeAtAddress,
}

impl DeploymentFailure {
	pub fn to_byte(self) -> u8 {
		match self {
			DeploymentFailure::MalformedBytecode => 0,
			DeploymentFailure::ConstructorReverted => 1,
			DeploymentFailure::AddressCollision => 2,
			DeploymentFailure::NoCodeAtAddress => 3,
		}
	}

	pub fn from_byte(byte: u8) -> Option<Self> {
		match byte {
			0 => Some(Self::MalformedBytecode),
			1 => Some(Self::ConstructorReverted),
			2 => Some(Self::AddressCollision),
			3 => Some(Self::NoCodeAtAddress),
			_ => None,
		}
	}
}

impl fmt::Display for DeploymentFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			DeploymentFailure::MalformedBytecode => "malformed bytecode",
			DeploymentFailure::ConstructorReverted => "constructor reverted",
			DeploymentFailure::AddressCollision => "address collision",
			DeploymentFailure::NoCodeAtAddress => "no code at address",
		};
		f.write_str(s)
	}
}

/// Errors surfaced by forwarder operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwarderError {
	/// Malformed parameters or addresses.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The recovered signer is not the account owner.
	#[error("Unauthorized signer: expected {expected}, recovered {recovered}")]
	UnauthorizedSigner { expected: Address, recovered: Address },
	/// The token was already consumed or has the wrong shape.
	#[error("Replay protection violation: {0}")]
	ReplayProtectionViolation(String),
	/// No proxy account is registered for the owner.
	#[error("Proxy account does not exist for owner {0}")]
	AccountNotFound(Address),
	/// A proxy account already exists for the owner.
	#[error("Proxy account already exists for owner {0}")]
	DuplicateAccount(Address),
	#[error("Deployment failed ({kind}): {reason}")]
	DeploymentFailed {
		kind: DeploymentFailure,
		reason: String,
	},
	/// The forwarded call reverted.
	#[error("Forwarded call to {target} failed")]
	ForwardedCallFailed { target: Address, return_data: Bytes },
	/// The ledger rejected the transaction.
	#[error("Submission failure: {0}")]
	SubmissionFailure(String),
}

impl ForwarderError {
	pub fn deployment(kind: DeploymentFailure, reason: impl Into<String>) -> Self {
		ForwarderError::DeploymentFailed {
			kind,
			reason: reason.into(),
		}
	}

	/// Encodes the error as revert data.
	pub fn to_revert_data(&self) -> Bytes {
		let encoded = match self {
			ForwarderError::Validation(reason) => IForwarderErrors::InvalidParameters {
				reason: reason.clone(),
			}
			.abi_encode(),
			ForwarderError::UnauthorizedSigner {
				expected,
				recovered,
			} => IForwarderErrors::UnauthorizedSigner {
				expected: *expected,
				recovered: *recovered,
			}
			.abi_encode(),
			ForwarderError::ReplayProtectionViolation(reason) => {
				IForwarderErrors::ReplayProtectionViolation {
					reason: reason.clone(),
				}
				.abi_encode()
			},
			ForwarderError::DuplicateAccount(owner) => {
				IForwarderErrors::DuplicateAccount { owner: *owner }.abi_encode()
			},
			ForwarderError::DeploymentFailed { kind, reason } => IForwarderErrors::DeploymentFailed {
				kind: kind.to_byte(),
				reason: reason.clone(),
			}
			.abi_encode(),
			ForwarderError::ForwardedCallFailed {
				target,
				return_data,
			} => IForwarderErrors::ForwardedCallFailed {
				target: *target,
				returnData: return_data.clone(),
			}
			.abi_encode(),
			ForwarderError::AccountNotFound(_) | ForwarderError::SubmissionFailure(_) => {
				IForwarderErrors::InvalidParameters {
					reason: self.to_string(),
				}
				.abi_encode()
			},
		};
		encoded.into()
	}

	/// Decodes revert data back into the taxonomy.
	///
	/// Unknown revert data becomes a `SubmissionFailure` carrying the raw
	/// bytes, and a plain `Error(string)` keeps its message.
	pub fn from_revert_data(data: &[u8]) -> Self {
		use IForwarderErrors::IForwarderErrorsErrors as E;

		if let Ok(decoded) = E::abi_decode(data) {
			return match decoded {
				E::InvalidParameters(e) => ForwarderError::Validation(e.reason),
				E::UnauthorizedSigner(e) => ForwarderError::UnauthorizedSigner {
					expected: e.expected,
					recovered: e.recovered,
				},
				E::ReplayProtectionViolation(e) => ForwarderError::ReplayProtectionViolation(e.reason),
				E::DuplicateAccount(e) => ForwarderError::DuplicateAccount(e.owner),
				E::DeploymentFailed(e) => match DeploymentFailure::from_byte(e.kind) {
					Some(kind) => ForwarderError::DeploymentFailed {
						kind,
						reason: e.reason,
					},
					None => ForwarderError::SubmissionFailure(format!(
						"unknown deployment failure kind {}: {}",
						e.kind, e.reason
					)),
				},
				E::ForwardedCallFailed(e) => ForwarderError::ForwardedCallFailed {
					target: e.target,
					return_data: e.returnData,
				},
			};
		}

		if let Ok(revert) = Revert::abi_decode(data) {
			return ForwarderError::SubmissionFailure(format!("reverted: {}", revert.reason));
		}

		if data.is_empty() {
			ForwarderError::SubmissionFailure("reverted without data".to_string())
		} else {
			ForwarderError::SubmissionFailure(format!("reverted with data 0x{}", hex::encode(data)))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	#[test]
	fn test_revert_data_round_trip_keeps_variant() {
		let owner = address!("0x00000000000000000000000000000000000000aa");
		let cases = vec![
			ForwarderError::Validation("bad hub".into()),
			ForwarderError::UnauthorizedSigner {
				expected: owner,
				recovered: Address::ZERO,
			},
			ForwarderError::ReplayProtectionViolation("token already consumed".into()),
			ForwarderError::DuplicateAccount(owner),
			ForwarderError::deployment(DeploymentFailure::ConstructorReverted, "missing hub"),
			ForwarderError::ForwardedCallFailed {
				target: owner,
				return_data: Bytes::from(vec![1, 2, 3]),
			},
		];

		for err in cases {
			assert_eq!(ForwarderError::from_revert_data(&err.to_revert_data()), err);
		}
	}

	#[test]
	fn test_unknown_revert_data_is_submission_failure() {
		let err = ForwarderError::from_revert_data(&[0xde, 0xad, 0xbe, 0xef, 0x00]);
		assert!(matches!(err, ForwarderError::SubmissionFailure(ref m) if m.contains("deadbeef")));

		let err = ForwarderError::from_revert_data(&[]);
		assert!(matches!(err, ForwarderError::SubmissionFailure(_)));
	}

	#[test]
	fn test_plain_revert_string_is_kept() {
		let data = Revert::from("out of gas").abi_encode();
		let err = ForwarderError::from_revert_data(&data);
		assert_eq!(err, ForwarderError::SubmissionFailure("reverted: out of gas".into()));
	}

	#[test]
	fn test_account_not_found_encodes_as_invalid_parameters() {
		let err = ForwarderError::AccountNotFound(Address::ZERO);
		assert!(matches!(
			ForwarderError::from_revert_data(&err.to_revert_data()),
			ForwarderError::Validation(m) if m.contains("does not exist")
		));
	}
}
