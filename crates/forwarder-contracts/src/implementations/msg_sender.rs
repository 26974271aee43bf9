//! Example target that logs its immediate caller.
//!
//! Its constructor requires the hub address, so init code without arguments
//! is a deployment whose constructor reverts.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{SolEvent, SolInterface, SolValue};
use forwarder_types::abi::IMsgSenderExample::{self, IMsgSenderExampleCalls};
use forwarder_types::ForwarderError;

use crate::runtime::{load_address, store_address, Contract, Host, Message, Revert};

fn hub_slot() -> B256 {
	keccak256("forwarder.example.hub")
}

pub fn constructor_args(hub: Address) -> Bytes {
	hub.abi_encode().into()
}

pub struct MsgSenderExample;

impl Contract for MsgSenderExample {
	fn construct(&self, host: &mut dyn Host, msg: &Message) -> Result<(), Revert> {
		if msg.data.len() != 32 {
			return Err(ForwarderError::Validation("constructor expects the hub address".to_string()).into());
		}
		store_address(host, hub_slot(), Address::from_word(B256::from_slice(&msg.data)));
		Ok(())
	}

	fn call(&self, host: &mut dyn Host, msg: &Message) -> Result<Bytes, Revert> {
		let call = IMsgSenderExampleCalls::abi_decode(&msg.data).map_err(|_| Revert::empty())?;
		match call {
			IMsgSenderExampleCalls::test(_) => {
				host.emit(IMsgSenderExample::WhoIsSender { sender: msg.caller }.encode_log_data());
				Ok(Bytes::new())
			},
			IMsgSenderExampleCalls::hub(_) => Ok(load_address(&*host, hub_slot()).abi_encode().into()),
		}
	}
}
