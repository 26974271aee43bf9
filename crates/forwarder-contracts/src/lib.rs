//! On-ledger state machines of the forwarder, as native contracts.
//!
//! The [`runtime`] module defines how contracts see the ledger, the
//! [`executor`] runs them against a [`state::WorldState`] with all-or-nothing
//! semantics, and [`implementations`] holds the authorities, the proxy hub,
//! the proxy account and an example target.

pub mod executor;
pub mod implementations;
pub mod runtime;
pub mod state;

pub use executor::Executor;
pub use runtime::{Artifact, ArtifactRegistry, Contract, CreateError, Host, Message, Revert};
pub use state::{AccountState, Checkpoint, WorldState};

/// Versioned artifacts of the built-in contracts.
pub mod artifacts {
	use forwarder_types::ReplayProtectionKind;

	use crate::implementations::{
		AuthorityContract, BitFlip, MsgSenderExample, Multinonce, ProxyAccount, ProxyHub,
	};
	use crate::runtime::{Artifact, ArtifactRegistry};

	pub const VERSION: &str = "1.0.0";

	pub fn bitflip_authority() -> Artifact {
		Artifact::new("BitFlipAuthority", VERSION, AuthorityContract(BitFlip))
	}

	pub fn multinonce_authority() -> Artifact {
		Artifact::new("MultinonceAuthority", VERSION, AuthorityContract(Multinonce))
	}

	pub fn authority(kind: ReplayProtectionKind) -> Artifact {
		match kind {
			ReplayProtectionKind::BitFlip => bitflip_authority(),
			ReplayProtectionKind::Multinonce => multinonce_authority(),
		}
	}

	pub fn proxy_hub() -> Artifact {
		Artifact::new("ProxyHub", VERSION, ProxyHub)
	}

	/// The base account template every hub deploys.
	pub fn proxy_account() -> Artifact {
		Artifact::new("ProxyAccount", VERSION, ProxyAccount)
	}

	pub fn msg_sender_example() -> Artifact {
		Artifact::new("MsgSenderExample", VERSION, MsgSenderExample)
	}

	/// Registry holding every built-in artifact.
	pub fn standard_registry() -> ArtifactRegistry {
		let mut registry = ArtifactRegistry::new();
		for artifact in [
			bitflip_authority(),
			multinonce_authority(),
			proxy_hub(),
			proxy_account(),
			msg_sender_example(),
		] {
			registry.register(artifact);
		}
		registry
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, keccak256, Address, Bytes, Log, B256, U256};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use alloy_sol_types::{SolCall, SolEvent, SolValue};
	use forwarder_types::abi::{IMsgSenderExample, IProxyAccount, IProxyHub, IReplayProtection};
	use forwarder_types::{
		account_salt, build_create2_address, deployment_salt, forward_digest, BitFlipToken,
		DeploymentFailure, ForwarderError, MultinonceToken, SequencePolicy,
	};
	use implementations::{lane_slot, multinonce, proxy_hub};

	const CHAIN_ID: u64 = 31337;
	const ADMIN: Address = address!("0x00000000000000000000000000000000000000ad");
	const RELAYER: Address = address!("0x00000000000000000000000000000000000000e1");
	const HUB: Address = address!("0x0000000000000000000000000000000000000a01");
	const BITFLIP: Address = address!("0x0000000000000000000000000000000000000a02");
	const MULTINONCE: Address = address!("0x0000000000000000000000000000000000000a03");
	const TARGET: Address = address!("0x0000000000000000000000000000000000000a04");
	const INCREASING: Address = address!("0x0000000000000000000000000000000000000a05");

	struct Fixture {
		state: WorldState,
		registry: ArtifactRegistry,
		owner: PrivateKeySigner,
	}

	impl Fixture {
		fn new() -> Self {
			let registry = artifacts::standard_registry();
			let mut state = WorldState::new();
			let deployments = [
				(
					HUB,
					artifacts::proxy_hub()
						.init_code(&proxy_hub::constructor_args(artifacts::proxy_account().id())),
				),
				(BITFLIP, artifacts::bitflip_authority().init_code(&[])),
				(
					MULTINONCE,
					artifacts::multinonce_authority()
						.init_code(&multinonce::constructor_args(2, SequencePolicy::ExactNext)),
				),
				(
					INCREASING,
					artifacts::multinonce_authority()
						.init_code(&multinonce::constructor_args(1, SequencePolicy::Increasing)),
				),
				(
					TARGET,
					artifacts::msg_sender_example()
						.init_code(&implementations::msg_sender::constructor_args(HUB)),
				),
			];
			{
				let mut exec = Executor::new(&mut state, &registry, CHAIN_ID);
				for (at, init_code) in deployments {
					exec.create_at(ADMIN, at, U256::ZERO, init_code).unwrap();
				}
			}
			let owner = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x11)).unwrap();
			Self {
				state,
				registry,
				owner,
			}
		}

		/// One top-level transaction.
		fn transact(
			&mut self,
			from: Address,
			to: Address,
			data: Vec<u8>,
		) -> Result<(Bytes, Vec<Log>), ForwarderError> {
			let mut exec = Executor::new(&mut self.state, &self.registry, CHAIN_ID);
			let output = exec
				.call_from(from, to, U256::ZERO, data.into())
				.map_err(|revert| ForwarderError::from_revert_data(&revert.0))?;
			Ok((output, exec.into_logs()))
		}

		fn view(&mut self, to: Address, data: Vec<u8>) -> Bytes {
			let checkpoint = self.state.checkpoint();
			let output = Executor::new(&mut self.state, &self.registry, CHAIN_ID)
				.call_from(RELAYER, to, U256::ZERO, data.into())
				.unwrap();
			self.state.revert_to(checkpoint);
			output
		}

		fn create_account(&mut self) -> Address {
			let owner = self.owner.address();
			let (output, _) = self
				.transact(
					RELAYER,
					HUB,
					IProxyHub::createProxyAccountCall { owner }.abi_encode(),
				)
				.unwrap();
			Address::abi_decode(&output).unwrap()
		}

		fn sign(
			&self,
			target: Address,
			value: U256,
			data: &[u8],
			token: &[u8],
			authority: Address,
		) -> Bytes {
			let digest = forward_digest(HUB, target, value, data, token, authority, U256::from(CHAIN_ID));
			let signature = self.owner.sign_hash_sync(&digest).unwrap();
			Bytes::copy_from_slice(&signature.as_bytes())
		}

		fn forward_call(&self, token: Bytes, authority: Address) -> IProxyAccount::forwardCall {
			let data = Bytes::from(IMsgSenderExample::testCall {}.abi_encode());
			IProxyAccount::forwardCall {
				target: TARGET,
				value: U256::ZERO,
				signature: self.sign(TARGET, U256::ZERO, &data, &token, authority),
				data,
				replayProtection: token,
				replayProtectionAuthority: authority,
			}
		}

		/// Address the hub derives for the fixture owner.
		fn account(&self) -> Address {
			build_create2_address(
				HUB,
				account_salt(self.owner.address()),
				artifacts::proxy_account().code_hash(),
			)
		}

		fn validate(&mut self, authority: Address, token: &Bytes) -> bool {
			let consumer = self.account();
			let owner = self.owner.address();
			let output = self.view(
				authority,
				IReplayProtection::validateCall {
					consumer,
					owner,
					replayProtection: token.clone(),
				}
				.abi_encode(),
			);
			bool::abi_decode(&output).unwrap()
		}

		fn next_token(&mut self, authority: Address, queue: u64) -> Bytes {
			let consumer = self.account();
			let owner = self.owner.address();
			let output = self.view(
				authority,
				IReplayProtection::nextTokenCall {
					consumer,
					owner,
					queue: U256::from(queue),
				}
				.abi_encode(),
			);
			Bytes::abi_decode(&output).unwrap()
		}
	}

	#[test]
	fn test_account_address_is_derivable_offline() {
		let mut fx = Fixture::new();
		let account = fx.create_account();

		let base = B256::abi_decode(&fx.view(HUB, IProxyHub::baseAccountCall {}.abi_encode())).unwrap();
		assert_eq!(base, artifacts::proxy_account().code_hash());
		assert_eq!(
			account,
			build_create2_address(HUB, account_salt(fx.owner.address()), base)
		);

		let owner = fx.owner.address();
		let registered = Address::abi_decode(&fx.view(HUB, IProxyHub::accountsCall { owner }.abi_encode())).unwrap();
		assert_eq!(registered, account);
		let bound = Address::abi_decode(&fx.view(account, IProxyAccount::ownerCall {}.abi_encode())).unwrap();
		assert_eq!(bound, owner);
		let hub = Address::abi_decode(&fx.view(account, IProxyAccount::hubCall {}.abi_encode())).unwrap();
		assert_eq!(hub, HUB);
	}

	#[test]
	fn test_second_account_creation_fails() {
		let mut fx = Fixture::new();
		let owner = fx.owner.address();
		let (_, logs) = fx
			.transact(RELAYER, HUB, IProxyHub::createProxyAccountCall { owner }.abi_encode())
			.unwrap();
		let created = IProxyHub::ProxyAccountCreated::decode_log_data(&logs[0].data).unwrap();
		assert_eq!(created.owner, owner);

		let err = fx
			.transact(RELAYER, HUB, IProxyHub::createProxyAccountCall { owner }.abi_encode())
			.unwrap_err();
		assert_eq!(err, ForwarderError::DuplicateAccount(owner));
	}

	#[test]
	fn test_unknown_owner_has_no_account() {
		let mut fx = Fixture::new();
		let owner = address!("0x0000000000000000000000000000000000000bbb");
		let output = fx.view(HUB, IProxyHub::accountsCall { owner }.abi_encode());
		assert_eq!(Address::abi_decode(&output).unwrap(), Address::ZERO);
	}

	#[test]
	fn test_only_hub_initializes_once() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		let err = fx
			.transact(
				RELAYER,
				account,
				IProxyAccount::initializeCall { owner: RELAYER }.abi_encode(),
			)
			.unwrap_err();
		assert!(matches!(err, ForwarderError::Validation(_)));
	}

	#[test]
	fn test_forward_executes_once() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		let token = fx.next_token(MULTINONCE, 0);
		let call = fx.forward_call(token.clone(), MULTINONCE);

		let (_, logs) = fx.transact(RELAYER, account, call.abi_encode()).unwrap();
		let who = logs
			.iter()
			.find(|log| log.address == TARGET)
			.map(|log| IMsgSenderExample::WhoIsSender::decode_log_data(&log.data).unwrap())
			.unwrap();
		assert_eq!(who.sender, account);
		assert!(!fx.validate(MULTINONCE, &token));

		let before = fx.state.clone();
		let err = fx.transact(RELAYER, account, call.abi_encode()).unwrap_err();
		assert!(matches!(err, ForwarderError::ReplayProtectionViolation(_)));
		assert_eq!(fx.state, before);
	}

	#[test]
	fn test_outside_caller_cannot_consume_owner_token() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		assert_eq!(account, fx.account());

		for authority in [MULTINONCE, BITFLIP] {
			let token = fx.next_token(authority, 0);
			let steal = IReplayProtection::updateForCall {
				owner: fx.owner.address(),
				replayProtection: token.clone(),
			};
			// Lands on the caller's own lanes.
			fx.transact(RELAYER, authority, steal.abi_encode()).unwrap();
			assert!(fx.validate(authority, &token));
			assert_eq!(fx.next_token(authority, 0), token);

			let call = fx.forward_call(token.clone(), authority);
			fx.transact(RELAYER, account, call.abi_encode()).unwrap();
			assert!(!fx.validate(authority, &token));
		}
	}

	#[test]
	fn test_any_mutated_field_is_unauthorized() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		let token = fx.next_token(MULTINONCE, 0);
		let signed = fx.forward_call(token.clone(), MULTINONCE);

		let mut mutations = Vec::new();
		let mut c = signed.clone();
		c.target = RELAYER;
		mutations.push(c);
		let mut c = signed.clone();
		c.value = U256::from(1u8);
		mutations.push(c);
		let mut c = signed.clone();
		c.data = Bytes::from(vec![0u8; 4]);
		mutations.push(c);
		let mut c = signed.clone();
		c.replayProtection = MultinonceToken::new(U256::from(1u8), U256::ZERO).encode();
		mutations.push(c);
		let mut c = signed.clone();
		c.replayProtectionAuthority = BITFLIP;
		mutations.push(c);

		for call in mutations {
			let err = fx.transact(RELAYER, account, call.abi_encode()).unwrap_err();
			assert!(
				matches!(err, ForwarderError::UnauthorizedSigner { expected, .. } if expected == fx.owner.address()),
				"{:?}",
				err
			);
		}

		// Signed for another chain.
		let data = signed.data.clone();
		let digest = forward_digest(HUB, TARGET, U256::ZERO, &data, &token, MULTINONCE, U256::from(1u8));
		let mut c = signed.clone();
		c.signature = Bytes::copy_from_slice(&fx.owner.sign_hash_sync(&digest).unwrap().as_bytes());
		let err = fx.transact(RELAYER, account, c.abi_encode()).unwrap_err();
		assert!(matches!(err, ForwarderError::UnauthorizedSigner { .. }));

		assert!(fx.validate(MULTINONCE, &token));
		fx.transact(RELAYER, account, signed.abi_encode()).unwrap();
	}

	#[test]
	fn test_failed_target_keeps_token_unconsumed() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		let token = fx.next_token(BITFLIP, 0);
		// The example target rejects unknown selectors.
		let data = Bytes::from(vec![0xff, 0xff, 0xff, 0xff]);
		let call = IProxyAccount::forwardCall {
			target: TARGET,
			value: U256::ZERO,
			signature: fx.sign(TARGET, U256::ZERO, &data, &token, BITFLIP),
			data,
			replayProtection: token.clone(),
			replayProtectionAuthority: BITFLIP,
		};

		let err = fx.transact(RELAYER, account, call.abi_encode()).unwrap_err();
		assert!(matches!(err, ForwarderError::ForwardedCallFailed { target, .. } if target == TARGET));
		assert!(fx.validate(BITFLIP, &token));
	}

	#[test]
	fn test_authority_without_code_is_rejected() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		let token = MultinonceToken::new(U256::ZERO, U256::ZERO).encode();
		let call = fx.forward_call(token, RELAYER);
		let err = fx.transact(RELAYER, account, call.abi_encode()).unwrap_err();
		assert!(matches!(err, ForwarderError::ReplayProtectionViolation(_)));
	}

	#[test]
	fn test_forward_moves_account_funds() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		fx.state.mint(account, U256::from(100u8));

		let token = fx.next_token(MULTINONCE, 0);
		let value = U256::from(40u8);
		let call = IProxyAccount::forwardCall {
			target: RELAYER,
			value,
			signature: fx.sign(RELAYER, value, &[], &token, MULTINONCE),
			data: Bytes::new(),
			replayProtection: token,
			replayProtectionAuthority: MULTINONCE,
		};
		fx.transact(RELAYER, account, call.abi_encode()).unwrap();
		assert_eq!(fx.state.balance(&account), U256::from(60u8));
		assert_eq!(fx.state.balance(&RELAYER), value);
	}

	fn deploy_call(
		fx: &mut Fixture,
		init_code: Bytes,
	) -> (IProxyAccount::deployContractCall, Bytes) {
		let token = fx.next_token(MULTINONCE, 1);
		let call = IProxyAccount::deployContractCall {
			signature: fx.sign(Address::ZERO, U256::ZERO, &init_code, &token, MULTINONCE),
			initCode: init_code,
			replayProtection: token.clone(),
			replayProtectionAuthority: MULTINONCE,
		};
		(call, token)
	}

	#[test]
	fn test_deploy_contract_at_computed_address() {
		let mut fx = Fixture::new();
		let account = fx.create_account();
		let init_code = artifacts::msg_sender_example()
			.init_code(&implementations::msg_sender::constructor_args(HUB));
		let (call, token) = deploy_call(&mut fx, init_code.clone());

		let (output, _) = fx.transact(RELAYER, account, call.abi_encode()).unwrap();
		let deployed = Address::abi_decode(&output).unwrap();

		let salt = deployment_salt(fx.owner.address(), &token);
		let computed = Address::abi_decode(&fx.view(
			account,
			IProxyAccount::computeAddressCall {
				salt,
				codeHash: keccak256(&init_code),
			}
			.abi_encode(),
		))
		.unwrap();
		assert_eq!(deployed, computed);
		assert_eq!(
			computed,
			build_create2_address(account, salt, keccak256(&init_code))
		);

		let (_, logs) = fx
			.transact(RELAYER, deployed, IMsgSenderExample::testCall {}.abi_encode())
			.unwrap();
		let who = IMsgSenderExample::WhoIsSender::decode_log_data(&logs[0].data).unwrap();
		assert_eq!(who.sender, RELAYER);
	}

	#[test]
	fn test_deploy_failures_are_classified() {
		let mut fx = Fixture::new();
		let account = fx.create_account();

		// Constructor needs the hub argument.
		let missing_args = artifacts::msg_sender_example().init_code(&[]);
		let (call, token) = deploy_call(&mut fx, missing_args.clone());
		let err = fx.transact(RELAYER, account, call.abi_encode()).unwrap_err();
		assert!(matches!(
			err,
			ForwarderError::DeploymentFailed { kind: DeploymentFailure::ConstructorReverted, .. }
		));
		let address = build_create2_address(
			account,
			deployment_salt(fx.owner.address(), &token),
			keccak256(&missing_args),
		);
		assert!(fx.state.code(&address).is_empty());
		assert!(fx.validate(MULTINONCE, &token));

		let (call, _) = deploy_call(&mut fx, Bytes::from(vec![0x60, 0x80, 0x60, 0x40]));
		let err = fx.transact(RELAYER, account, call.abi_encode()).unwrap_err();
		assert!(matches!(
			err,
			ForwarderError::DeploymentFailed { kind: DeploymentFailure::MalformedBytecode, .. }
		));
	}

	#[test]
	fn test_multinonce_exact_next_and_queues() {
		let mut fx = Fixture::new();
		let account = fx.create_account();

		let skipped = MultinonceToken::new(U256::ZERO, U256::from(1u8)).encode();
		assert!(!fx.validate(MULTINONCE, &skipped));
		let err = fx
			.transact(RELAYER, account, fx.forward_call(skipped, MULTINONCE).abi_encode())
			.unwrap_err();
		assert!(matches!(err, ForwarderError::ReplayProtectionViolation(_)));

		// Queues advance independently.
		for queue in [0u64, 1, 1, 0] {
			let token = fx.next_token(MULTINONCE, queue);
			fx.transact(RELAYER, account, fx.forward_call(token, MULTINONCE).abi_encode())
				.unwrap();
		}
		assert_eq!(
			fx.next_token(MULTINONCE, 0),
			MultinonceToken::new(U256::ZERO, U256::from(2u8)).encode()
		);
		assert_eq!(
			fx.next_token(MULTINONCE, 1),
			MultinonceToken::new(U256::from(1u8), U256::from(2u8)).encode()
		);

		let out_of_range = MultinonceToken::new(U256::from(2u8), U256::ZERO).encode();
		assert!(!fx.validate(MULTINONCE, &out_of_range));
	}

	#[test]
	fn test_multinonce_increasing_allows_gaps() {
		let mut fx = Fixture::new();
		let account = fx.create_account();

		let ahead = MultinonceToken::new(U256::ZERO, U256::from(5u8)).encode();
		fx.transact(RELAYER, account, fx.forward_call(ahead.clone(), INCREASING).abi_encode())
			.unwrap();
		assert_eq!(
			fx.next_token(INCREASING, 0),
			MultinonceToken::new(U256::ZERO, U256::from(6u8)).encode()
		);

		let behind = MultinonceToken::new(U256::ZERO, U256::from(3u8)).encode();
		assert!(!fx.validate(INCREASING, &behind));
		assert!(!fx.validate(INCREASING, &ahead));
	}

	#[test]
	fn test_bitflip_tokens_in_any_order() {
		let mut fx = Fixture::new();
		let account = fx.create_account();

		let high = BitFlipToken::new(U256::from(3u8), 200).unwrap().encode();
		let low = BitFlipToken::new(U256::from(3u8), 0).unwrap().encode();
		for token in [high.clone(), low.clone()] {
			fx.transact(RELAYER, account, fx.forward_call(token, BITFLIP).abi_encode())
				.unwrap();
		}
		assert!(!fx.validate(BITFLIP, &high));
		assert_eq!(
			fx.next_token(BITFLIP, 3),
			BitFlipToken::new(U256::from(3u8), 1).unwrap().encode()
		);

		// Wrong shape for this authority.
		assert!(!fx.validate(BITFLIP, &Bytes::from(vec![0u8; 32])));
	}

	#[test]
	fn test_bitflip_exhausted_word() {
		let mut fx = Fixture::new();
		let owner = fx.owner.address();
		let consumer = fx.account();
		fx.state.set_storage(
			BITFLIP,
			lane_slot(consumer, owner, U256::ZERO),
			B256::from(U256::MAX),
		);

		let err = Executor::new(&mut fx.state, &fx.registry, CHAIN_ID)
			.call_from(
				RELAYER,
				BITFLIP,
				U256::ZERO,
				IReplayProtection::nextTokenCall {
					consumer,
					owner,
					queue: U256::ZERO,
				}
				.abi_encode()
				.into(),
			)
			.unwrap_err();
		assert_eq!(
			ForwarderError::from_revert_data(&err.0),
			ForwarderError::ReplayProtectionViolation("bitmap exhausted".to_string())
		);
		assert_eq!(
			fx.next_token(BITFLIP, 1),
			BitFlipToken::new(U256::from(1u8), 0).unwrap().encode()
		);
	}

	#[test]
	fn test_multinonce_constructor_validation() {
		let registry = artifacts::standard_registry();
		let mut state = WorldState::new();
		let mut exec = Executor::new(&mut state, &registry, CHAIN_ID);
		let at = address!("0x0000000000000000000000000000000000000c01");
		let zero_queues = artifacts::multinonce_authority()
			.init_code(&multinonce::constructor_args(0, SequencePolicy::ExactNext));
		assert!(matches!(
			exec.create_at(ADMIN, at, U256::ZERO, zero_queues),
			Err(CreateError::ConstructorReverted(_))
		));
	}
}
