//! Builder for development and test configurations.
//!
//! Produces a configuration for the in-process ledger, memory storage and a
//! local key, with no hub or authority deployed yet.

use std::collections::HashMap;

use alloy_primitives::Address;
use forwarder_types::{ReplayProtectionKind, SequencePolicy};

use crate::{
	AccountConfig, Config, ForwarderConfig, LedgerConfig, ReplayProtectionConfig, StorageConfig,
};

/// Well-known development key; never holds real funds.
pub const DEV_PRIVATE_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	id: String,
	chain_id: u64,
	hub: Option<Address>,
	private_key: String,
	min_confirmations: u64,
	strategy: ReplayProtectionKind,
	authority: Option<Address>,
	lanes: Vec<u64>,
	queues: u64,
	policy: SequencePolicy,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			id: "forwarder-dev".to_string(),
			chain_id: 31337,
			hub: None,
			private_key: DEV_PRIVATE_KEY.to_string(),
			min_confirmations: 1,
			strategy: ReplayProtectionKind::Multinonce,
			authority: None,
			lanes: vec![0],
			queues: 1,
			policy: SequencePolicy::ExactNext,
		}
	}

	pub fn id(mut self, id: impl Into<String>) -> Self {
		self.id = id.into();
		self
	}

	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn hub(mut self, hub: Address) -> Self {
		self.hub = Some(hub);
		self
	}

	pub fn private_key(mut self, key: impl Into<String>) -> Self {
		self.private_key = key.into();
		self
	}

	pub fn min_confirmations(mut self, confirmations: u64) -> Self {
		self.min_confirmations = confirmations;
		self
	}

	/// Bitflip with the given word indices as lanes.
	pub fn bitflip(mut self, lanes: Vec<u64>) -> Self {
		self.strategy = ReplayProtectionKind::BitFlip;
		self.lanes = lanes;
		self
	}

	/// Multinonce with `queues` queues, all used as lanes.
	pub fn multinonce(mut self, queues: u64, policy: SequencePolicy) -> Self {
		self.strategy = ReplayProtectionKind::Multinonce;
		self.queues = queues;
		self.lanes = (0..queues).collect();
		self.policy = policy;
		self
	}

	pub fn authority(mut self, authority: Address) -> Self {
		self.authority = Some(authority);
		self
	}

	pub fn build(self) -> Config {
		let mut ledger_table = toml::Table::new();
		ledger_table.insert("chain_id".into(), toml::Value::Integer(self.chain_id as i64));
		let mut key_table = toml::Table::new();
		key_table.insert("private_key".into(), toml::Value::String(self.private_key));

		Config {
			forwarder: ForwarderConfig {
				id: self.id,
				chain_id: self.chain_id,
				hub: self.hub,
			},
			ledger: LedgerConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([(
					"memory".to_string(),
					toml::Value::Table(ledger_table),
				)]),
				min_confirmations: self.min_confirmations,
			},
			account: AccountConfig {
				primary: "local".to_string(),
				implementations: HashMap::from([(
					"local".to_string(),
					toml::Value::Table(key_table),
				)]),
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([(
					"memory".to_string(),
					toml::Value::Table(toml::Table::new()),
				)]),
				cleanup_interval_seconds: 3600,
			},
			replay_protection: ReplayProtectionConfig {
				strategy: self.strategy,
				authority: self.authority,
				lanes: self.lanes,
				queues: self.queues,
				policy: self.policy,
			},
		}
	}
}
