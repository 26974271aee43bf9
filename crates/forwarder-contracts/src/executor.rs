//! Executes calls and creations against a [`WorldState`].
//!
//! Every call frame and every creation takes a journal checkpoint first and
//! reverts to it on failure, so a failing nested call leaves no partial
//! effects and a failing top-level call leaves the state untouched.

use alloy_primitives::{keccak256, Address, Bytes, Log, LogData, B256, U256};
use forwarder_types::build_create2_address;

use crate::runtime::{ArtifactRegistry, CreateError, Host, Message, Revert};
use crate::state::WorldState;

/// Maximum nesting of calls and creations.
pub const MAX_CALL_DEPTH: usize = 1024;

pub struct Executor<'a> {
	state: &'a mut WorldState,
	registry: &'a ArtifactRegistry,
	chain_id: U256,
	frames: Vec<Address>,
	logs: Vec<Log>,
}

impl<'a> Executor<'a> {
	pub fn new(state: &'a mut WorldState, registry: &'a ArtifactRegistry, chain_id: u64) -> Self {
		Self {
			state,
			registry,
			chain_id: U256::from(chain_id),
			frames: Vec::new(),
			logs: Vec::new(),
		}
	}

	/// Logs emitted by successful frames, in emission order.
	pub fn into_logs(self) -> Vec<Log> {
		self.logs
	}

	fn current(&self) -> Address {
		self.frames.last().copied().unwrap_or_default()
	}

	/// Calls `target` on behalf of `caller`.
	pub fn call_from(
		&mut self,
		caller: Address,
		target: Address,
		value: U256,
		data: Bytes,
	) -> Result<Bytes, Revert> {
		if self.frames.len() >= MAX_CALL_DEPTH {
			return Err(Revert::empty());
		}
		let checkpoint = self.state.checkpoint();
		let log_mark = self.logs.len();

		let result = self.execute_call(caller, target, value, data);
		if result.is_err() {
			self.state.revert_to(checkpoint);
			self.logs.truncate(log_mark);
		}
		result
	}

	fn execute_call(
		&mut self,
		caller: Address,
		target: Address,
		value: U256,
		data: Bytes,
	) -> Result<Bytes, Revert> {
		if !self.state.transfer(caller, target, value) {
			return Err(Revert::empty());
		}

		let code = self.state.code(&target);
		if code.is_empty() {
			return Ok(Bytes::new());
		}
		let contract = self
			.registry
			.resolve_runtime(&code)
			.ok_or_else(Revert::empty)?;

		let msg = Message {
			caller,
			address: target,
			value,
			data,
		};
		self.frames.push(target);
		let result = contract.call(self, &msg);
		self.frames.pop();
		result
	}

	/// Deploys `init_code` from `deployer` at `address`.
	pub fn create_at(
		&mut self,
		deployer: Address,
		address: Address,
		value: U256,
		init_code: Bytes,
	) -> Result<Address, CreateError> {
		if self.frames.len() >= MAX_CALL_DEPTH {
			return Err(CreateError::DepthExceeded);
		}
		let checkpoint = self.state.checkpoint();
		let log_mark = self.logs.len();

		let result = self.execute_create(deployer, address, value, init_code);
		if result.is_err() {
			self.state.revert_to(checkpoint);
			self.logs.truncate(log_mark);
		}
		result
	}

	fn execute_create(
		&mut self,
		deployer: Address,
		address: Address,
		value: U256,
		init_code: Bytes,
	) -> Result<Address, CreateError> {
		if self
			.state
			.account(&address)
			.is_some_and(|a| a.is_occupied())
		{
			return Err(CreateError::AddressCollision);
		}
		let (artifact, args) = self.registry.resolve_init_code(&init_code)?;
		if !self.state.transfer(deployer, address, value) {
			return Err(CreateError::InsufficientBalance);
		}
		self.state.set_nonce(address, 1);

		let msg = Message {
			caller: deployer,
			address,
			value,
			data: args,
		};
		self.frames.push(address);
		let constructed = artifact.contract().construct(self, &msg);
		self.frames.pop();
		constructed.map_err(|revert| CreateError::ConstructorReverted(revert.0))?;

		self.state.set_code(address, artifact.runtime_code());
		tracing::trace!(artifact = artifact.name(), address = %address, "Deployed contract");
		Ok(address)
	}
}

impl Host for Executor<'_> {
	fn chain_id(&self) -> U256 {
		self.chain_id
	}

	fn sload(&self, slot: B256) -> B256 {
		self.state.storage(&self.current(), &slot)
	}

	fn sstore(&mut self, slot: B256, value: B256) {
		let address = self.current();
		self.state.set_storage(address, slot, value);
	}

	fn call(&mut self, target: Address, value: U256, data: Bytes) -> Result<Bytes, Revert> {
		let caller = self.current();
		self.call_from(caller, target, value, data)
	}

	fn create2(
		&mut self,
		value: U256,
		salt: B256,
		init_code: Bytes,
	) -> Result<Address, CreateError> {
		let deployer = self.current();
		let address = build_create2_address(deployer, salt, keccak256(&init_code));
		self.create_at(deployer, address, value, init_code)
	}

	fn code(&self, address: Address) -> Bytes {
		self.state.code(&address)
	}

	fn balance(&self, address: Address) -> U256 {
		self.state.balance(&address)
	}

	fn emit(&mut self, data: LogData) {
		let address = self.current();
		self.logs.push(Log { address, data });
	}
}
