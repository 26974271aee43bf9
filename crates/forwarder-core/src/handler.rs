//! Meta-transaction handler.
//!
//! Builds and signs forward and deployment parameters for an owner. Signing
//! is offline; the only ledger access is asking the hub for the account
//! template and the authority for a fresh replay-protection token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use forwarder_account::AccountService;
use forwarder_ledger::LedgerService;
use forwarder_types::{
	account_salt, deployment_salt, forward_digest, truncate_id, DeployParams, ForwardParams,
	ForwarderError, ReplayProtectionKind,
};

use crate::clients::{AuthorityClient, HubClient};

pub struct MetaTxHandler {
	chain_id: u64,
	hub: HubClient,
	authority: AuthorityClient,
	lanes: Vec<u64>,
	/// Next Multinonce lane to draw from.
	cursor: AtomicUsize,
}

impl MetaTxHandler {
	fn new(
		kind: ReplayProtectionKind,
		chain_id: u64,
		hub: Address,
		authority: Address,
		lanes: Vec<u64>,
		ledger: Arc<LedgerService>,
	) -> Result<Self, ForwarderError> {
		if lanes.is_empty() {
			return Err(ForwarderError::Validation(
				"at least one replay protection lane is required".to_string(),
			));
		}
		if hub.is_zero() || authority.is_zero() {
			return Err(ForwarderError::Validation(
				"hub and authority must be non-zero addresses".to_string(),
			));
		}
		Ok(Self {
			chain_id,
			hub: HubClient::new(hub, chain_id, ledger.clone()),
			authority: AuthorityClient::new(authority, kind, chain_id, ledger),
			lanes,
			cursor: AtomicUsize::new(0),
		})
	}

	/// Handler drawing BitFlip tokens from the given bitmap words, in order.
	pub fn bitflip(
		chain_id: u64,
		hub: Address,
		authority: Address,
		words: Vec<u64>,
		ledger: Arc<LedgerService>,
	) -> Result<Self, ForwarderError> {
		Self::new(ReplayProtectionKind::BitFlip, chain_id, hub, authority, words, ledger)
	}

	/// Handler drawing Multinonce tokens round-robin from the given queues.
	pub fn multinonce(
		chain_id: u64,
		hub: Address,
		authority: Address,
		queues: Vec<u64>,
		ledger: Arc<LedgerService>,
	) -> Result<Self, ForwarderError> {
		Self::new(ReplayProtectionKind::Multinonce, chain_id, hub, authority, queues, ledger)
	}

	pub fn hub(&self) -> Address {
		self.hub.address()
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	pub fn authority(&self) -> &AuthorityClient {
		&self.authority
	}

	/// Proxy account of `owner`, derived from the hub's account template.
	/// The account need not exist yet.
	pub async fn proxy_account(&self, owner: Address) -> Result<Address, ForwarderError> {
		let base = self.hub.base_account().await?;
		Ok(Self::proxy_account_address(self.hub.address(), owner, base))
	}

	/// Fresh token for `owner`, as spent by the owner's proxy account.
	///
	/// Two concurrent calls on the same lane can return the same token; only
	/// one of the resulting signatures will ever execute.
	pub async fn next_token(&self, owner: Address) -> Result<Bytes, ForwarderError> {
		let account = self.proxy_account(owner).await?;
		match self.authority.kind() {
			ReplayProtectionKind::Multinonce => {
				let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.lanes.len();
				self.authority.next_token(account, owner, self.lanes[slot]).await
			},
			ReplayProtectionKind::BitFlip => {
				for word in &self.lanes {
					match self.authority.next_token(account, owner, *word).await {
						Ok(token) => return Ok(token),
						Err(ForwarderError::ReplayProtectionViolation(reason)) => {
							tracing::debug!(
								owner = %owner,
								word = word,
								reason = %reason,
								"Bitmap word unavailable"
							);
						},
						Err(e) => return Err(e),
					}
				}
				Err(ForwarderError::ReplayProtectionViolation(
					"all configured bitmap words are exhausted".to_string(),
				))
			},
		}
	}

	async fn sign_digest(owner: &AccountService, digest: &B256) -> Result<Bytes, ForwarderError> {
		let signature = owner
			.sign_hash(digest)
			.await
			.map_err(|e| ForwarderError::Validation(format!("signing failed: {}", e)))?;
		Ok(Bytes::copy_from_slice(&signature.as_bytes()))
	}

	/// Signs a request for `owner`'s proxy account to call `target`.
	pub async fn sign_meta_transaction(
		&self,
		owner: &AccountService,
		target: Address,
		value: U256,
		data: Bytes,
	) -> Result<ForwardParams, ForwarderError> {
		let token = self.next_token(owner.address()).await?;
		let chain_id = U256::from(self.chain_id);
		let digest = forward_digest(
			self.hub.address(),
			target,
			value,
			&data,
			&token,
			self.authority.address(),
			chain_id,
		);
		let signature = Self::sign_digest(owner, &digest).await?;

		tracing::info!(
			owner = %owner.address(),
			target = %target,
			digest = %truncate_id(&digest.to_string()),
			"Signed meta-transaction"
		);
		Ok(ForwardParams {
			hub: self.hub.address(),
			target,
			value,
			data,
			replay_protection: token,
			replay_protection_authority: self.authority.address(),
			chain_id,
			signature,
		})
	}

	/// Signs a request for `owner`'s proxy account to deploy `init_code`.
	pub async fn sign_meta_deployment(
		&self,
		owner: &AccountService,
		init_code: Bytes,
	) -> Result<DeployParams, ForwarderError> {
		if init_code.is_empty() {
			return Err(ForwarderError::Validation("init code is empty".to_string()));
		}
		let token = self.next_token(owner.address()).await?;
		let chain_id = U256::from(self.chain_id);
		let digest = forward_digest(
			self.hub.address(),
			Address::ZERO,
			U256::ZERO,
			&init_code,
			&token,
			self.authority.address(),
			chain_id,
		);
		let signature = Self::sign_digest(owner, &digest).await?;

		tracing::info!(
			owner = %owner.address(),
			digest = %truncate_id(&digest.to_string()),
			"Signed meta-deployment"
		);
		Ok(DeployParams {
			hub: self.hub.address(),
			data: init_code,
			replay_protection: token,
			replay_protection_authority: self.authority.address(),
			chain_id,
			signature,
		})
	}

	/// `last20(keccak256(0xff ‖ deployer ‖ salt ‖ code_hash))`.
	pub fn build_create2_address(deployer: Address, salt: B256, code_hash: B256) -> Address {
		forwarder_types::build_create2_address(deployer, salt, code_hash)
	}

	/// Address the hub will give `owner`'s proxy account.
	pub fn proxy_account_address(hub: Address, owner: Address, base_code_hash: B256) -> Address {
		Self::build_create2_address(hub, account_salt(owner), base_code_hash)
	}

	/// Address a signed deployment will land at.
	pub fn deployment_address(
		account: Address,
		owner: Address,
		token: &[u8],
		init_code: &[u8],
	) -> Address {
		Self::build_create2_address(account, deployment_salt(owner, token), keccak256(init_code))
	}
}
