//! Proxy account: executes intents signed by its owner.
//!
//! Every entry point authenticates the owner's signature over the digest
//! bound to this account's hub and the ledger's chain id, consumes the replay
//! token at the authority the owner chose, and only then acts. Any failure
//! reverts the whole transaction, including the token consumption.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolInterface, SolValue};
use forwarder_types::abi::IProxyAccount::{self, IProxyAccountCalls};
use forwarder_types::abi::IReplayProtection;
use forwarder_types::{
	build_create2_address, deployment_salt, forward_digest, recover_signer, DeploymentFailure,
	ForwarderError,
};

use crate::runtime::{load_address, store_address, Contract, Host, Message, Revert};

fn owner_slot() -> B256 {
	keccak256("forwarder.account.owner")
}

fn hub_slot() -> B256 {
	keccak256("forwarder.account.hub")
}

pub struct ProxyAccount;

/// Fields of a signed request, minus the signature.
struct Intent<'a> {
	target: Address,
	value: U256,
	data: &'a [u8],
	token: &'a [u8],
	authority: Address,
}

impl ProxyAccount {
	/// Checks the signature and consumes the token; returns the owner.
	fn authorize(
		host: &mut dyn Host,
		intent: &Intent<'_>,
		signature: &[u8],
	) -> Result<Address, ForwarderError> {
		let owner = load_address(&*host, owner_slot());
		if owner.is_zero() {
			return Err(ForwarderError::Validation(
				"proxy account is not initialized".to_string(),
			));
		}

		let digest = forward_digest(
			load_address(&*host, hub_slot()),
			intent.target,
			intent.value,
			intent.data,
			intent.token,
			intent.authority,
			host.chain_id(),
		);
		let recovered = recover_signer(signature, &digest)?;
		if recovered != owner {
			return Err(ForwarderError::UnauthorizedSigner {
				expected: owner,
				recovered,
			});
		}

		let update = IReplayProtection::updateForCall {
			owner,
			replayProtection: Bytes::copy_from_slice(intent.token),
		};
		let output = host
			.call(intent.authority, U256::ZERO, update.abi_encode().into())
			.map_err(|revert| match ForwarderError::from_revert_data(&revert.0) {
				violation @ ForwarderError::ReplayProtectionViolation(_) => violation,
				other => ForwarderError::ReplayProtectionViolation(format!(
					"authority rejected token: {}",
					other
				)),
			})?;
		// An address without code answers with empty data, which is not a confirmation.
		if !bool::abi_decode(&output).unwrap_or(false) {
			return Err(ForwarderError::ReplayProtectionViolation(format!(
				"authority {} did not confirm consumption",
				intent.authority
			)));
		}
		Ok(owner)
	}

	fn forward(
		host: &mut dyn Host,
		call: IProxyAccount::forwardCall,
	) -> Result<Bytes, ForwarderError> {
		let intent = Intent {
			target: call.target,
			value: call.value,
			data: &call.data,
			token: &call.replayProtection,
			authority: call.replayProtectionAuthority,
		};
		Self::authorize(host, &intent, &call.signature)?;

		let result = host
			.call(call.target, call.value, call.data.clone())
			.map_err(|revert| ForwarderError::ForwardedCallFailed {
				target: call.target,
				return_data: revert.0,
			})?;
		host.emit(
			IProxyAccount::Forwarded {
				target: call.target,
				value: call.value,
				replayProtection: call.replayProtection.clone(),
			}
			.encode_log_data(),
		);
		Ok(result)
	}

	fn deploy(
		host: &mut dyn Host,
		call: IProxyAccount::deployContractCall,
	) -> Result<Address, ForwarderError> {
		let intent = Intent {
			target: Address::ZERO,
			value: U256::ZERO,
			data: &call.initCode,
			token: &call.replayProtection,
			authority: call.replayProtectionAuthority,
		};
		let owner = Self::authorize(host, &intent, &call.signature)?;

		let salt = deployment_salt(owner, &call.replayProtection);
		let deployed = host
			.create2(U256::ZERO, salt, call.initCode.clone())
			.map_err(|e| ForwarderError::deployment(e.failure(), e.to_string()))?;
		if host.code(deployed).is_empty() {
			return Err(ForwarderError::deployment(
				DeploymentFailure::NoCodeAtAddress,
				format!("no code at {}", deployed),
			));
		}

		host.emit(
			IProxyAccount::ContractDeployed {
				deployed,
				replayProtection: call.replayProtection.clone(),
			}
			.encode_log_data(),
		);
		Ok(deployed)
	}

	fn initialize(
		host: &mut dyn Host,
		caller: Address,
		owner: Address,
	) -> Result<(), ForwarderError> {
		if caller != load_address(&*host, hub_slot()) {
			return Err(ForwarderError::Validation(
				"only the hub may initialize an account".to_string(),
			));
		}
		if !load_address(&*host, owner_slot()).is_zero() {
			return Err(ForwarderError::Validation(
				"account already initialized".to_string(),
			));
		}
		if owner.is_zero() {
			return Err(ForwarderError::Validation(
				"owner is the zero address".to_string(),
			));
		}
		store_address(host, owner_slot(), owner);
		Ok(())
	}
}

impl Contract for ProxyAccount {
	fn construct(&self, host: &mut dyn Host, msg: &Message) -> Result<(), Revert> {
		store_address(host, hub_slot(), msg.caller);
		Ok(())
	}

	fn call(&self, host: &mut dyn Host, msg: &Message) -> Result<Bytes, Revert> {
		// Plain transfers fund the account.
		if msg.data.is_empty() {
			return Ok(Bytes::new());
		}

		let call = IProxyAccountCalls::abi_decode(&msg.data).map_err(|_| {
			Revert::from(ForwarderError::Validation(
				"unknown account function".to_string(),
			))
		})?;

		let output = match call {
			IProxyAccountCalls::forward(c) => Self::forward(host, c)?.abi_encode(),
			IProxyAccountCalls::deployContract(c) => Self::deploy(host, c)?.abi_encode(),
			IProxyAccountCalls::computeAddress(c) => {
				build_create2_address(msg.address, c.salt, c.codeHash).abi_encode()
			},
			IProxyAccountCalls::initialize(c) => {
				Self::initialize(host, msg.caller, c.owner)?;
				Vec::new()
			},
			IProxyAccountCalls::owner(_) => load_address(&*host, owner_slot()).abi_encode(),
			IProxyAccountCalls::hub(_) => load_address(&*host, hub_slot()).abi_encode(),
		};
		Ok(output.into())
	}
}
