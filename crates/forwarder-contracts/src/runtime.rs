//! Native contract runtime.
//!
//! Contracts are Rust types executed against a [`Host`] that owns world state.
//! Deployable code is identified by an [`Artifact`]: init code is the
//! artifact id followed by ABI-encoded constructor arguments, and the code
//! stored at a deployed address is the artifact id alone. Addresses are
//! derived from the hash of the init code exactly as CREATE2 does.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bytes, LogData, B256, U256};
use forwarder_types::{DeploymentFailure, ForwarderError};
use thiserror::Error;

/// Length of an artifact id prefix in init code.
pub const ARTIFACT_ID_LENGTH: usize = 32;

/// The call currently executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	/// Account that made the call (or ran the deployment).
	pub caller: Address,
	/// Address of the executing contract.
	pub address: Address,
	pub value: U256,
	/// Call data, or constructor arguments during construction.
	pub data: Bytes,
}

/// Revert data of a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert(pub Bytes);

impl Revert {
	pub fn empty() -> Self {
		Self(Bytes::new())
	}
}

impl From<ForwarderError> for Revert {
	fn from(err: ForwarderError) -> Self {
		Self(err.to_revert_data())
	}
}

/// Why a contract creation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateError {
	#[error("init code does not reference a known artifact")]
	InvalidInitCode,
	#[error("constructor reverted")]
	ConstructorReverted(Bytes),
	#[error("code already exists at the derived address")]
	AddressCollision,
	#[error("insufficient balance for endowment")]
	InsufficientBalance,
	#[error("call depth exceeded")]
	DepthExceeded,
}

impl CreateError {
	/// Classification reported to signers.
	pub fn failure(&self) -> DeploymentFailure {
		match self {
			CreateError::InvalidInitCode => DeploymentFailure::MalformedBytecode,
			CreateError::AddressCollision => DeploymentFailure::AddressCollision,
			CreateError::ConstructorReverted(_)
			| CreateError::InsufficientBalance
			| CreateError::DepthExceeded => DeploymentFailure::ConstructorReverted,
		}
	}
}

/// Execution environment seen by a running contract.
///
/// Storage, calls, creations and logs all act on behalf of the contract that
/// is currently executing.
pub trait Host {
	fn chain_id(&self) -> U256;

	fn sload(&self, slot: B256) -> B256;

	fn sstore(&mut self, slot: B256, value: B256);

	/// Calls `target`. State changes made by a failed call are discarded.
	fn call(&mut self, target: Address, value: U256, data: Bytes) -> Result<Bytes, Revert>;

	/// Deploys `init_code` at its CREATE2 address. A failed creation leaves
	/// no trace.
	fn create2(&mut self, value: U256, salt: B256, init_code: Bytes)
		-> Result<Address, CreateError>;

	/// Code stored at `address`, empty for plain accounts.
	fn code(&self, address: Address) -> Bytes;

	fn balance(&self, address: Address) -> U256;

	fn emit(&mut self, data: LogData);
}

/// A native contract.
pub trait Contract: Send + Sync {
	/// Runs once at deployment; `msg.data` holds the constructor arguments.
	fn construct(&self, host: &mut dyn Host, msg: &Message) -> Result<(), Revert> {
		let _ = (host, msg);
		Ok(())
	}

	fn call(&self, host: &mut dyn Host, msg: &Message) -> Result<Bytes, Revert>;
}

/// A named, versioned deployable contract.
#[derive(Clone)]
pub struct Artifact {
	name: &'static str,
	version: &'static str,
	contract: Arc<dyn Contract>,
}

impl fmt::Debug for Artifact {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Artifact")
			.field("name", &self.name)
			.field("version", &self.version)
			.finish()
	}
}

impl Artifact {
	pub fn new(
		name: &'static str,
		version: &'static str,
		contract: impl Contract + 'static,
	) -> Self {
		Self {
			name,
			version,
			contract: Arc::new(contract),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn version(&self) -> &'static str {
		self.version
	}

	/// `keccak256("name@version")`.
	pub fn id(&self) -> B256 {
		keccak256(format!("{}@{}", self.name, self.version))
	}

	/// Init code deploying this artifact with ABI-encoded `args`.
	pub fn init_code(&self, args: &[u8]) -> Bytes {
		let mut code = Vec::with_capacity(ARTIFACT_ID_LENGTH + args.len());
		code.extend_from_slice(self.id().as_slice());
		code.extend_from_slice(args);
		code.into()
	}

	/// Hash of the argument-less init code; what CREATE2 derivation uses.
	pub fn code_hash(&self) -> B256 {
		keccak256(self.init_code(&[]))
	}

	pub fn runtime_code(&self) -> Bytes {
		Bytes::copy_from_slice(self.id().as_slice())
	}

	pub fn contract(&self) -> Arc<dyn Contract> {
		Arc::clone(&self.contract)
	}
}

/// Artifacts a ledger knows how to execute.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
	artifacts: HashMap<B256, Artifact>,
}

impl ArtifactRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, artifact: Artifact) {
		tracing::trace!(name = artifact.name, version = artifact.version, id = %artifact.id(), "Registered artifact");
		self.artifacts.insert(artifact.id(), artifact);
	}

	pub fn get(&self, id: &B256) -> Option<&Artifact> {
		self.artifacts.get(id)
	}

	/// Splits init code into its artifact and constructor arguments.
	pub fn resolve_init_code(&self, init_code: &[u8]) -> Result<(Artifact, Bytes), CreateError> {
		if init_code.len() < ARTIFACT_ID_LENGTH {
			return Err(CreateError::InvalidInitCode);
		}
		let id = B256::from_slice(&init_code[..ARTIFACT_ID_LENGTH]);
		let artifact = self.get(&id).ok_or(CreateError::InvalidInitCode)?;
		Ok((
			artifact.clone(),
			Bytes::copy_from_slice(&init_code[ARTIFACT_ID_LENGTH..]),
		))
	}

	/// Contract behind deployed runtime code.
	pub fn resolve_runtime(&self, code: &[u8]) -> Option<Arc<dyn Contract>> {
		if code.len() != ARTIFACT_ID_LENGTH {
			return None;
		}
		self.get(&B256::from_slice(code)).map(Artifact::contract)
	}
}

pub(crate) fn load_u256(host: &dyn Host, slot: B256) -> U256 {
	U256::from_be_bytes(host.sload(slot).0)
}

pub(crate) fn store_u256(host: &mut dyn Host, slot: B256, value: U256) {
	host.sstore(slot, B256::from(value));
}

pub(crate) fn load_address(host: &dyn Host, slot: B256) -> Address {
	Address::from_word(host.sload(slot))
}

pub(crate) fn store_address(host: &mut dyn Host, slot: B256, value: Address) {
	host.sstore(slot, value.into_word());
}
