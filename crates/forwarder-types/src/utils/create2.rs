//! Deterministic address derivation.
//!
//! Used both off-ledger (the handler predicting addresses) and on-ledger
//! (the hub and proxy accounts deploying), so there is exactly one formula.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::SolValue;

/// `last20(keccak256(0xff ‖ deployer ‖ salt ‖ code_hash))`.
pub fn build_create2_address(deployer: Address, salt: B256, code_hash: B256) -> Address {
	deployer.create2(salt, code_hash)
}

/// Salt of an owner's proxy account: `keccak256(abi.encode(owner))`.
pub fn account_salt(owner: Address) -> B256 {
	keccak256(owner.abi_encode())
}

/// Salt of a contract deployed through a proxy account:
/// `keccak256(abi.encode(owner, token))`.
pub fn deployment_salt(owner: Address, token: &[u8]) -> B256 {
	keccak256((owner, Bytes::copy_from_slice(token)).abi_encode_params())
}
