//! Proxy hub: creates one proxy account per owner at a derivable address.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolInterface, SolValue};
use forwarder_types::abi::IProxyAccount;
use forwarder_types::abi::IProxyHub::{self, IProxyHubCalls};
use forwarder_types::{account_salt, ForwarderError};

use crate::runtime::{load_address, store_address, Contract, CreateError, Host, Message, Revert};

fn base_slot() -> B256 {
	keccak256("forwarder.hub.base_account")
}

/// `accounts` is the mapping at slot 0.
fn account_slot(owner: Address) -> B256 {
	keccak256((owner, U256::ZERO).abi_encode())
}

/// Constructor arguments: the artifact id of the base account.
pub fn constructor_args(base_account: B256) -> Bytes {
	base_account.abi_encode().into()
}

pub struct ProxyHub;

impl ProxyHub {
	/// Init code of the base account; its artifact id with no arguments.
	fn base_init_code(host: &dyn Host) -> Bytes {
		Bytes::copy_from_slice(host.sload(base_slot()).as_slice())
	}

	fn create_proxy_account(
		host: &mut dyn Host,
		owner: Address,
	) -> Result<Address, ForwarderError> {
		if owner.is_zero() {
			return Err(ForwarderError::Validation(
				"owner is the zero address".to_string(),
			));
		}
		if !load_address(&*host, account_slot(owner)).is_zero() {
			return Err(ForwarderError::DuplicateAccount(owner));
		}

		let init_code = Self::base_init_code(&*host);
		let account = host
			.create2(U256::ZERO, account_salt(owner), init_code)
			.map_err(|e| match e {
				CreateError::AddressCollision => ForwarderError::DuplicateAccount(owner),
				other => ForwarderError::deployment(other.failure(), other.to_string()),
			})?;

		host.call(
			account,
			U256::ZERO,
			IProxyAccount::initializeCall { owner }.abi_encode().into(),
		)
		.map_err(|revert| ForwarderError::from_revert_data(&revert.0))?;

		store_address(host, account_slot(owner), account);
		host.emit(IProxyHub::ProxyAccountCreated { owner, account }.encode_log_data());
		tracing::debug!(owner = %owner, account = %account, "Created proxy account");
		Ok(account)
	}
}

impl Contract for ProxyHub {
	fn construct(&self, host: &mut dyn Host, msg: &Message) -> Result<(), Revert> {
		if msg.data.len() != 32 {
			return Err(ForwarderError::Validation(
				"hub expects the base account artifact id".to_string(),
			)
			.into());
		}
		host.sstore(base_slot(), B256::from_slice(&msg.data));
		Ok(())
	}

	fn call(&self, host: &mut dyn Host, msg: &Message) -> Result<Bytes, Revert> {
		let call = IProxyHubCalls::abi_decode(&msg.data).map_err(|_| {
			Revert::from(ForwarderError::Validation("unknown hub function".to_string()))
		})?;

		let output = match call {
			IProxyHubCalls::createProxyAccount(c) => {
				Self::create_proxy_account(host, c.owner)?.abi_encode()
			},
			IProxyHubCalls::accounts(c) => load_address(&*host, account_slot(c.owner)).abi_encode(),
			IProxyHubCalls::baseAccount(_) => keccak256(Self::base_init_code(&*host)).abi_encode(),
		};
		Ok(output.into())
	}
}
