//! Digest builder for signed intents.
//!
//! The digest is `keccak256(abi.encode(hub, target, value, data, token,
//! authority, chainId))` with the standard head/tail parameter layout. Field
//! order and types are part of the wire contract: changing either invalidates
//! every signature ever produced.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;

/// Digest an owner signs to authorize a forward or deployment.
///
/// Deployments pass the zero address as `target` and zero as `value`.
pub fn forward_digest(
	hub: Address,
	target: Address,
	value: U256,
	data: &[u8],
	token: &[u8],
	authority: Address,
	chain_id: U256,
) -> B256 {
	let params = (
		hub,
		target,
		value,
		Bytes::copy_from_slice(data),
		Bytes::copy_from_slice(token),
		authority,
		chain_id,
	);
	keccak256(params.abi_encode_params())
}
