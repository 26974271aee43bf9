//! Private-key identity held in process memory.

use std::str::FromStr;

use alloy_primitives::{Address, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use forwarder_types::{
	without_0x_prefix, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString,
	ValidationError,
};

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};

/// Identity backed by a secp256k1 key.
pub struct LocalWallet {
	signer: PrivateKeySigner,
	private_key: SecretString,
}

impl LocalWallet {
	/// Builds a wallet from a hex private key, with or without 0x prefix.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let signer = PrivateKeySigner::from_str(without_0x_prefix(private_key_hex))
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		Ok(Self {
			signer,
			private_key: SecretString::new(format!("0x{}", without_0x_prefix(private_key_hex))),
		})
	}

	/// Builds a wallet from a raw 32-byte key.
	pub fn from_bytes(key: &B256) -> Result<Self, AccountError> {
		let signer =
			PrivateKeySigner::from_bytes(key).map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		Ok(Self {
			signer,
			private_key: SecretString::new(format!("0x{}", hex::encode(key))),
		})
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![Field::new("private_key", FieldType::HexBytes(32))], vec![]);
		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
		self.signer
			.sign_hash_sync(hash)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}

	fn private_key(&self) -> SecretString {
		self.private_key.clone()
	}
}

/// Factory function to create a local wallet from configuration.
///
/// Configuration parameters:
/// - `private_key`: 32-byte hex key
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(format!("Invalid configuration: {}", e)))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;

	let wallet = LocalWallet::new(private_key)?;
	tracing::debug!(address = %wallet.address(), "Loaded local wallet");
	Ok(Box::new(wallet))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}
