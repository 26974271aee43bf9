//! Builder pattern for constructing a forwarder.
//!
//! Composes a [`Forwarder`] from the configured storage, account and ledger
//! implementations using factory functions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use forwarder_account::{AccountError, AccountInterface, AccountService};
use forwarder_config::Config;
use forwarder_ledger::{LedgerError, LedgerInterface, LedgerService};
use forwarder_storage::{StorageError, StorageInterface, StorageService};
use forwarder_types::{ForwarderError, ReplayProtectionKind, SecretString};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::handler::MetaTxHandler;
use crate::journal::SubmissionJournal;
use crate::relayer::RelayerApi;

/// Errors that can occur while building a forwarder.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct ForwarderFactories<SF, AF, LF> {
	pub storage_factories: HashMap<String, SF>,
	pub account_factories: HashMap<String, AF>,
	pub ledger_factories: HashMap<String, LF>,
}

/// Builder for a [`Forwarder`] with pluggable implementations.
pub struct ForwarderBuilder {
	config: Config,
}

impl ForwarderBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub async fn build<SF, AF, LF>(
		self,
		factories: ForwarderFactories<SF, AF, LF>,
	) -> Result<Forwarder, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
		LF: Fn(&toml::Value, &SecretString) -> Result<Box<dyn LedgerInterface>, LedgerError>,
	{
		let storage_config = &self.config.storage;
		let storage_factory = factories
			.storage_factories
			.get(&storage_config.primary)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!(
					"no storage implementation named '{}'",
					storage_config.primary
				))
			})?;
		let storage_backend = load(
			"storage",
			&storage_config.primary,
			&storage_config.implementations,
			|config| storage_factory(config),
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let account_config = &self.config.account;
		let account_factory = factories
			.account_factories
			.get(&account_config.primary)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!(
					"no account implementation named '{}'",
					account_config.primary
				))
			})?;
		let account = Arc::new(AccountService::new(load(
			"account",
			&account_config.primary,
			&account_config.implementations,
			|config| account_factory(config),
		)?));
		tracing::info!(component = "account", address = %account.address(), "Relayer identity");

		let ledger_config = &self.config.ledger;
		let ledger_factory = factories
			.ledger_factories
			.get(&ledger_config.primary)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!(
					"no ledger implementation named '{}'",
					ledger_config.primary
				))
			})?;
		let relayer_key = account.private_key();
		let ledger = Arc::new(LedgerService::new(
			load(
				"ledger",
				&ledger_config.primary,
				&ledger_config.implementations,
				|config| ledger_factory(config, &relayer_key),
			)?,
			ledger_config.min_confirmations,
		));

		let chain_id = ledger
			.chain_id()
			.await
			.map_err(|e| BuilderError::Config(format!("Failed to query ledger chain id: {}", e)))?;
		if chain_id != self.config.forwarder.chain_id {
			return Err(BuilderError::Config(format!(
				"ledger reports chain {}, forwarder is configured for chain {}",
				chain_id, self.config.forwarder.chain_id
			)));
		}

		let journal = Arc::new(SubmissionJournal::new(storage.clone()));
		Ok(Forwarder {
			config: self.config,
			account,
			ledger,
			storage,
			journal,
		})
	}
}

/// Builds the primary implementation of one component.
fn load<T, E: std::fmt::Display>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factory: impl Fn(&toml::Value) -> Result<T, E>,
) -> Result<T, BuilderError> {
	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!("{} '{}' has no configuration table", component, primary))
	})?;
	match factory(config) {
		Ok(implementation) => {
			tracing::info!(component = component, implementation = %primary, enabled = true, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component = component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}

/// A built forwarder: the relayer identity, the ledger and the journal.
pub struct Forwarder {
	config: Config,
	account: Arc<AccountService>,
	ledger: Arc<LedgerService>,
	storage: Arc<StorageService>,
	journal: Arc<SubmissionJournal>,
}

impl Forwarder {
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Identity that signs and pays for relayed transactions.
	pub fn account(&self) -> &Arc<AccountService> {
		&self.account
	}

	pub fn ledger(&self) -> &Arc<LedgerService> {
		&self.ledger
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Points the forwarder at a freshly deployed hub and authority.
	pub fn with_deployment(mut self, hub: Address, authority: Address) -> Self {
		self.config.forwarder.hub = Some(hub);
		self.config.replay_protection.authority = Some(authority);
		self
	}

	fn hub(&self) -> Result<Address, ForwarderError> {
		self.config
			.forwarder
			.hub
			.ok_or_else(|| ForwarderError::Validation("no proxy hub configured".to_string()))
	}

	pub fn relayer(&self) -> Result<RelayerApi, ForwarderError> {
		Ok(RelayerApi::new(
			self.hub()?,
			self.config.forwarder.chain_id,
			self.ledger.clone(),
			self.journal.clone(),
		))
	}

	pub fn handler(&self) -> Result<MetaTxHandler, ForwarderError> {
		let replay = &self.config.replay_protection;
		let authority = replay.authority.ok_or_else(|| {
			ForwarderError::Validation("no replay protection authority configured".to_string())
		})?;
		let hub = self.hub()?;
		let chain_id = self.config.forwarder.chain_id;
		match replay.strategy {
			ReplayProtectionKind::BitFlip => MetaTxHandler::bitflip(
				chain_id,
				hub,
				authority,
				replay.lanes.clone(),
				self.ledger.clone(),
			),
			ReplayProtectionKind::Multinonce => MetaTxHandler::multinonce(
				chain_id,
				hub,
				authority,
				replay.lanes.clone(),
				self.ledger.clone(),
			),
		}
	}

	/// Starts the periodic removal of expired journal entries.
	pub fn spawn_storage_cleanup(&self) -> JoinHandle<()> {
		let storage = self.storage.clone();
		let period = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!(removed = count, "Storage cleanup");
					},
					Err(e) => {
						tracing::warn!(error = %e, "Storage cleanup failed");
					},
					_ => {},
				}
			}
		})
	}
}
