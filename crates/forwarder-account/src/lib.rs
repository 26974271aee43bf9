//! Signing identities for the forwarder.
//!
//! Owners sign intent digests; relayers sign the ledger transactions that
//! carry those intents. Both go through [`AccountInterface`], so key custody
//! stays behind one seam.

use alloy_primitives::{Address, Signature, B256};
use async_trait::async_trait;
use forwarder_types::{ConfigSchema, ImplementationRegistry, SecretString, Transaction};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Key custody backend.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	fn address(&self) -> Address;

	/// Raw secp256k1 signature over `hash`, no message prefix applied.
	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError>;

	/// Signature over [`Transaction::signing_hash`].
	async fn sign_transaction(&self, tx: &Transaction) -> Result<Signature, AccountError> {
		self.sign_hash(&tx.signing_hash()).await
	}

	/// `0x`-prefixed key handed to ledger backends that sign on their own.
	fn private_key(&self) -> SecretString;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	vec![(
		implementations::local::Registry::NAME,
		implementations::local::Registry::factory(),
	)]
}

/// A signing identity: an owner who authorizes intents, or the relayer that
/// pays for carrying them.
pub struct AccountService {
	inner: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(inner: Box<dyn AccountInterface>) -> Self {
		Self { inner }
	}

	pub fn address(&self) -> Address {
		self.inner.address()
	}

	/// Signs an intent digest.
	pub async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
		let signature = self.inner.sign_hash(hash).await?;
		tracing::trace!(signer = %self.address(), hash = %hash, "Signed digest");
		Ok(signature)
	}

	/// Signs a ledger transaction sent from this identity.
	pub async fn sign(&self, tx: &Transaction) -> Result<Signature, AccountError> {
		if tx.from.is_some_and(|from| from != self.address()) {
			return Err(AccountError::SigningFailed(format!(
				"transaction is from {:?}, identity is {}",
				tx.from,
				self.address()
			)));
		}
		self.inner.sign_transaction(tx).await
	}

	pub fn private_key(&self) -> SecretString {
		self.inner.private_key()
	}
}
